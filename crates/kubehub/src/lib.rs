//! mcpfix kubehub: the narrow seams to the outside world.
//!
//! - [`ObjectClient`]: get/create/delete of arbitrary objects by identity
//! - [`ClusterLifecycle`] / [`ImageLoader`]: create, list, destroy clusters and side-load images
//! - [`ClusterResolver`]: find a provisioned cluster by name prefix and bind a client to it

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mcpfix_core::{ClientError, ManagedObject, ObjectRef};

pub mod kube_client;
pub mod lifecycle;
pub mod memory;
pub mod resolve;

pub use kube_client::{KubeConnector, KubeObjectClient};
pub use lifecycle::{ClusterLifecycle, ImageLoader, KindCli};
pub use resolve::{resolve_cluster_name, ClusterResolver, Connector, MCP_PREFIX, ONBOARDING_PREFIX};

/// Structured-object client bound to one cluster.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn get(&self, obj: &ObjectRef) -> Result<ManagedObject, ClientError>;
    /// Create `obj` and return it with server-assigned fields populated.
    async fn create(&self, obj: &ManagedObject) -> Result<ManagedObject, ClientError>;
    async fn delete(&self, obj: &ObjectRef) -> Result<(), ClientError>;
}

/// A client bound to a cluster plus the namespace applies are rewritten into.
#[derive(Clone)]
pub struct ClusterConfig {
    client: Arc<dyn ObjectClient>,
    namespace: String,
    cluster: Option<String>,
}

impl ClusterConfig {
    pub fn new(client: Arc<dyn ObjectClient>, namespace: &str) -> Self {
        Self { client, namespace: namespace.to_string(), cluster: None }
    }

    pub fn with_cluster_name(mut self, name: &str) -> Self {
        self.cluster = Some(name.to_string());
        self
    }

    /// Same cluster, different target namespace.
    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self { client: self.client.clone(), namespace: namespace.to_string(), cluster: self.cluster.clone() }
    }

    pub fn client(&self) -> &dyn ObjectClient { self.client.as_ref() }
    pub fn namespace(&self) -> &str { &self.namespace }
    pub fn cluster_name(&self) -> Option<&str> { self.cluster.as_deref() }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("cluster", &self.cluster)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
