//! Bootstrap configuration, loaded from YAML (camelCase keys).

use std::path::Path;

use mcpfix_core::{Condition, Error, ManifestError, Result, WaitOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// Namespace on the platform cluster for the operator and the onboarding `Cluster`.
    pub namespace: String,
    pub operator: OperatorConfig,
    #[serde(default)]
    pub cluster_providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub service_providers: Vec<ProviderConfig>,
    /// Environment check deadline (default when unset) and onboarding `Cluster`
    /// cleanup wait (none when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_opts: Option<WaitOptions>,
    /// Predicate that marks a managed control plane ready.
    #[serde(default = "default_mcp_readiness")]
    pub mcp_readiness: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    pub name: String,
    pub image: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_platform_name")]
    pub platform_name: String,
    #[serde(default)]
    pub wait_opts: WaitOptions,
}

/// A cluster or service provider: object name plus controller image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    pub image: String,
    /// Readiness deadline on install (default when unset); deletes on teardown
    /// only wait for the object to disappear when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_opts: Option<WaitOptions>,
}

impl ProviderConfig {
    pub fn ready_wait(&self) -> WaitOptions { self.wait_opts.unwrap_or_default() }
}

fn default_mcp_readiness() -> Condition { Condition::phase("Ready") }
fn default_environment() -> String { "debug".into() }
fn default_platform_name() -> String { "platform".into() }

impl BootstrapConfig {
    pub fn ready_wait(&self) -> WaitOptions { self.wait_opts.unwrap_or_default() }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Manifest(ManifestError::Parse(e.to_string())))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&text)
    }
}
