//! The handle test bodies receive once the platform is up.

use std::path::Path;

use mcpfix_core::{Condition, ManagedObject, Result, WaitOptions, NAMESPACE_DEFAULT};
use mcpfix_kubehub::{ClusterConfig, ClusterResolver};
use tracing::info;

use crate::providers::{mcp_ref, McpData, MCP_TEMPLATE};

/// Read-only view of a provisioned platform plus test-body conveniences.
#[derive(Clone)]
pub struct Fixture {
    platform_cluster: String,
    platform: ClusterConfig,
    resolver: ClusterResolver,
    mcp_readiness: Condition,
}

impl Fixture {
    pub fn new(platform_cluster: &str, platform: ClusterConfig, resolver: ClusterResolver, mcp_readiness: Condition) -> Self {
        Self { platform_cluster: platform_cluster.to_string(), platform, resolver, mcp_readiness }
    }

    pub fn platform_cluster(&self) -> &str { &self.platform_cluster }
    pub fn namespace(&self) -> &str { self.platform.namespace() }
    /// Platform cluster client, bound to the fixture namespace.
    pub fn platform(&self) -> &ClusterConfig { &self.platform }

    pub async fn onboarding_config(&self) -> Result<ClusterConfig> { self.resolver.onboarding_config().await }
    pub async fn mcp_config(&self) -> Result<ClusterConfig> { self.resolver.mcp_config().await }

    pub async fn config_by_prefix(&self, prefix: &str, namespace: &str) -> Result<ClusterConfig> {
        self.resolver.config_by_prefix(prefix, namespace).await
    }

    /// Create a `ManagedControlPlaneV2` on the onboarding cluster and wait until it is ready.
    pub async fn create_mcp(&self, name: &str, opts: &WaitOptions) -> Result<ManagedObject> {
        info!(mcp = %name, "create MCP");
        let onboarding = self.onboarding_config().await?;
        let obj = mcpfix_apply::create_from_template(&onboarding, MCP_TEMPLATE, &McpData { name }).await?;
        mcpfix_conditions::wait_for(&onboarding, &obj.object_ref(), &self.mcp_readiness, opts).await?;
        Ok(obj)
    }

    /// Delete a managed control plane; with `opts`, wait until it is gone.
    pub async fn delete_mcp(&self, name: &str, opts: Option<&WaitOptions>) -> Result<()> {
        info!(mcp = %name, "delete MCP");
        let onboarding = self.onboarding_config().await?;
        mcpfix_apply::delete(&onboarding, &mcp_ref(name, NAMESPACE_DEFAULT), opts).await
    }

    /// Apply every manifest in `dir` to the onboarding cluster.
    pub async fn import_service_provider_apis(&self, dir: impl AsRef<Path>, opts: Option<&WaitOptions>) -> Result<Vec<ManagedObject>> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "apply service provider resources to onboarding cluster");
        let onboarding = self.onboarding_config().await?;
        mcpfix_apply::create_all_and_wait(&onboarding, dir, opts).await
    }

    /// Apply every manifest in `dir` to the MCP cluster.
    pub async fn import_domain_apis(&self, dir: impl AsRef<Path>, opts: Option<&WaitOptions>) -> Result<Vec<ManagedObject>> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "apply domain resources to MCP cluster");
        let mcp = self.mcp_config().await?;
        mcpfix_apply::create_all_and_wait(&mcp, dir, opts).await
    }
}
