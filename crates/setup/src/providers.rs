//! Platform object kinds, their manifest templates, and template data.

use mcpfix_core::{Gvk, ObjectRef};
use serde::Serialize;

pub const KIND_CONFIG: &str = include_str!("../config/kind-config.yaml");
pub const OPERATOR_TEMPLATE: &str = include_str!("../config/operator.yaml.tmpl");

/// Name of the onboarding `Cluster` object the operator creates.
pub const ONBOARDING_CLUSTER: &str = "onboarding";

pub const CLUSTER_PROVIDER_TEMPLATE: &str = r#"
apiVersion: openmcp.cloud/v1alpha1
kind: ClusterProvider
metadata:
  name: {{.Name}}
spec:
  image: {{.Image}}
  extraVolumeMounts:
    - mountPath: /var/run/docker.sock
      name: docker
  extraVolumes:
    - name: docker
      hostPath:
        path: /var/run/host-docker.sock
        type: Socket
"#;

pub const SERVICE_PROVIDER_TEMPLATE: &str = r#"
apiVersion: openmcp.cloud/v1alpha1
kind: ServiceProvider
metadata:
  name: {{.Name}}
spec:
  image: {{.Image}}
"#;

pub const MCP_TEMPLATE: &str = r#"
apiVersion: core.openmcp.cloud/v2alpha1
kind: ManagedControlPlaneV2
metadata:
  name: {{.Name}}
spec:
  iam: {}
"#;

pub fn cluster_provider_gvk() -> Gvk { Gvk::new("openmcp.cloud", "v1alpha1", "ClusterProvider") }
pub fn service_provider_gvk() -> Gvk { Gvk::new("openmcp.cloud", "v1alpha1", "ServiceProvider") }
pub fn cluster_gvk() -> Gvk { Gvk::new("clusters.openmcp.cloud", "v1alpha1", "Cluster") }
pub fn mcp_gvk() -> Gvk { Gvk::new("core.openmcp.cloud", "v2alpha1", "ManagedControlPlaneV2") }
pub fn deployment_gvk() -> Gvk { Gvk::new("apps", "v1", "Deployment") }

pub fn cluster_provider_ref(name: &str) -> ObjectRef { ObjectRef::cluster_scoped(cluster_provider_gvk(), name) }
pub fn service_provider_ref(name: &str) -> ObjectRef { ObjectRef::cluster_scoped(service_provider_gvk(), name) }
pub fn onboarding_cluster_ref(namespace: &str) -> ObjectRef { ObjectRef::namespaced(cluster_gvk(), ONBOARDING_CLUSTER, namespace) }
pub fn mcp_ref(name: &str, namespace: &str) -> ObjectRef { ObjectRef::namespaced(mcp_gvk(), name, namespace) }

/// Kinds the platform treats as cluster-scoped.
pub const CLUSTER_SCOPED_KINDS: &[&str] = &["Namespace", "ClusterRoleBinding", "ClusterProvider", "ServiceProvider"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderData<'a> {
    pub name: &'a str,
    pub image: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperatorData<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub image: &'a str,
    pub environment: &'a str,
    pub platform_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct McpData<'a> {
    pub name: &'a str,
}
