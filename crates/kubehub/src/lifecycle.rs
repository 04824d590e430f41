//! Cluster lifecycle and image loading, with a `kind` CLI backend.

use std::process::Stdio;

use async_trait::async_trait;
use mcpfix_core::{Error, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Creates, lists and destroys Kubernetes-compatible clusters.
#[async_trait]
pub trait ClusterLifecycle: Send + Sync {
    /// Create cluster `name` from a provider-specific config document.
    async fn create(&self, name: &str, config: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<String>>;
    /// Kubeconfig document for reaching `name` from the host.
    async fn kubeconfig(&self, name: &str) -> Result<String>;
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Side-loads container images into a cluster's nodes.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, cluster: &str, image: &str) -> Result<()>;
}

/// Shells out to the `kind` binary (`MCPFIX_KIND_BIN` overrides the path).
#[derive(Debug, Clone)]
pub struct KindCli {
    bin: String,
}

impl Default for KindCli {
    fn default() -> Self {
        Self { bin: std::env::var("MCPFIX_KIND_BIN").unwrap_or_else(|_| "kind".to_string()) }
    }
}

impl KindCli {
    pub fn with_binary(bin: &str) -> Self { Self { bin: bin.to_string() } }

    async fn run(&self, op: &'static str, cluster: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let fail = |message: String| Error::Lifecycle { op, cluster: cluster.to_string(), message };
        debug!(bin = %self.bin, ?args, "running kind");
        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fail(format!("spawning {}: {}", self.bin, e)))?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await.map_err(|e| fail(e.to_string()))?;
            // Close stdin so kind sees EOF.
            drop(pipe);
        }
        let output = child.wait_with_output().await.map_err(|e| fail(e.to_string()))?;
        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ClusterLifecycle for KindCli {
    async fn create(&self, name: &str, config: &str) -> Result<()> {
        info!(cluster = %name, "creating kind cluster");
        self.run("create cluster", name, &["create", "cluster", "--name", name, "--config", "-"], Some(config))
            .await
            .map(|_| ())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let out = self.run("list clusters", "", &["get", "clusters"], None).await?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    async fn kubeconfig(&self, name: &str) -> Result<String> {
        self.run("get kubeconfig", name, &["get", "kubeconfig", "--name", name], None).await
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        info!(cluster = %name, "deleting kind cluster");
        self.run("delete cluster", name, &["delete", "cluster", "--name", name], None).await.map(|_| ())
    }
}

#[async_trait]
impl ImageLoader for KindCli {
    async fn load(&self, cluster: &str, image: &str) -> Result<()> {
        info!(cluster = %cluster, image = %image, "loading image into kind cluster");
        self.run("load image", cluster, &["load", "docker-image", image, "--name", cluster], None).await.map(|_| ())
    }
}
