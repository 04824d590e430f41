//! Cluster lookup by name prefix: resolve the name first, then build a client for it.

use std::sync::Arc;

use async_trait::async_trait;
use mcpfix_core::{Error, Result, NAMESPACE_DEFAULT};
use tracing::info;

use crate::{ClusterConfig, ClusterLifecycle, ObjectClient};

pub const ONBOARDING_PREFIX: &str = "onboarding";
pub const MCP_PREFIX: &str = "mcp";

/// Turns a kubeconfig document into an object client.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cluster: &str, kubeconfig: &str) -> Result<Arc<dyn ObjectClient>>;
}

/// First cluster whose name starts with `prefix`.
pub fn resolve_cluster_name(names: &[String], prefix: &str) -> Result<String> {
    names
        .iter()
        .find(|n| n.starts_with(prefix))
        .cloned()
        .ok_or_else(|| Error::Resolution { prefix: prefix.to_string(), known: names.to_vec() })
}

#[derive(Clone)]
pub struct ClusterResolver {
    lifecycle: Arc<dyn ClusterLifecycle>,
    connector: Arc<dyn Connector>,
}

impl ClusterResolver {
    pub fn new(lifecycle: Arc<dyn ClusterLifecycle>, connector: Arc<dyn Connector>) -> Self {
        Self { lifecycle, connector }
    }

    /// Client config for a cluster known by exact name.
    pub async fn config_for(&self, cluster: &str, namespace: &str) -> Result<ClusterConfig> {
        let kubeconfig = self.lifecycle.kubeconfig(cluster).await?;
        let client = self.connector.connect(cluster, &kubeconfig).await?;
        Ok(ClusterConfig::new(client, namespace).with_cluster_name(cluster))
    }

    /// Client config for the first cluster whose name starts with `prefix`.
    pub async fn config_by_prefix(&self, prefix: &str, namespace: &str) -> Result<ClusterConfig> {
        let names = self.lifecycle.list().await?;
        let cluster = resolve_cluster_name(&names, prefix)?;
        info!(prefix = %prefix, cluster = %cluster, namespace = %namespace, "resolved cluster");
        self.config_for(&cluster, namespace).await
    }

    /// The onboarding cluster, default namespace. Use [`Self::config_by_prefix`] when several exist.
    pub async fn onboarding_config(&self) -> Result<ClusterConfig> {
        self.config_by_prefix(ONBOARDING_PREFIX, NAMESPACE_DEFAULT).await
    }

    /// The MCP cluster, default namespace. Use [`Self::config_by_prefix`] when several exist.
    pub async fn mcp_config(&self) -> Result<ClusterConfig> {
        self.config_by_prefix(MCP_PREFIX, NAMESPACE_DEFAULT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryClusters, MemoryConnector};

    #[test]
    fn picks_first_prefix_match() {
        let names = vec!["platform-abc".to_string(), "onboarding.1".to_string(), "onboarding.2".to_string()];
        assert_eq!(resolve_cluster_name(&names, "onboarding").unwrap(), "onboarding.1");
        assert_eq!(resolve_cluster_name(&names, "platform").unwrap(), "platform-abc");
        let err = resolve_cluster_name(&names, "mcp").unwrap_err();
        assert!(matches!(err, Error::Resolution { ref prefix, .. } if prefix == "mcp"));
    }

    #[tokio::test]
    async fn builds_config_bound_to_cluster_and_namespace() {
        let clusters = Arc::new(MemoryClusters::new());
        clusters.add("platform-abc");
        clusters.add("mcp-xyz");
        let resolver = ClusterResolver::new(clusters.clone(), Arc::new(MemoryConnector::new()));

        let cfg = resolver.mcp_config().await.unwrap();
        assert_eq!(cfg.cluster_name(), Some("mcp-xyz"));
        assert_eq!(cfg.namespace(), "default");

        let cfg = resolver.config_by_prefix("platform", "openmcp-system").await.unwrap();
        assert_eq!(cfg.namespace(), "openmcp-system");

        assert!(matches!(resolver.onboarding_config().await, Err(Error::Resolution { .. })));
    }
}
