//! mcpfix setup: bring up an ephemeral openMCP platform and tear it down again.
//!
//! [`Orchestrator`] is the generic part: ordered setup stages, a best-effort
//! teardown list, and a body in between. [`Bootstrap`] fills it with the
//! platform stages (kind cluster, namespace, operator, cluster providers,
//! service-provider images, service providers, environment check) and hands
//! test bodies a [`Fixture`].

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod fixture;
pub mod orchestrator;
pub mod providers;

pub use bootstrap::{Bootstrap, Platform};
pub use config::{BootstrapConfig, OperatorConfig, ProviderConfig};
pub use fixture::Fixture;
pub use orchestrator::{Orchestrator, StageError, TeardownReport};

/// `<prefix>-<random hex>`, cut to `len` characters. A prefix of `len` or more is returned as is.
pub fn random_name(prefix: &str, len: usize) -> String {
    if prefix.len() >= len {
        return prefix.to_string();
    }
    let mut name = format!("{}-", prefix);
    while name.len() < len {
        name.push_str(&uuid::Uuid::new_v4().simple().to_string());
    }
    name.truncate(len);
    name
}
