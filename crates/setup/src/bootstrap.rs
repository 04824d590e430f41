//! Platform bootstrap: kind cluster, operator, providers, environment check.

use std::sync::Arc;

use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use mcpfix_core::{Condition, Error, ManagedObject, ManifestError, ObjectRef, Result, WaitOptions};
use mcpfix_kubehub::{ClusterConfig, ClusterLifecycle, ClusterResolver, Connector, ImageLoader, KindCli, KubeConnector};
use tracing::{info, warn};

use crate::config::{BootstrapConfig, ProviderConfig};
use crate::fixture::Fixture;
use crate::orchestrator::{Orchestrator, StageError, TeardownReport};
use crate::providers::*;
use crate::random_name;

/// Mutable state threaded through the bootstrap stages.
pub struct Platform {
    pub config: BootstrapConfig,
    /// kind cluster name; fixed before setup so teardown can always target it.
    pub cluster: String,
    /// Client for the platform cluster, bound to the fixture namespace. Set once connected.
    pub client: Option<ClusterConfig>,
}

impl Platform {
    fn connected(&self) -> Result<&ClusterConfig> {
        self.client.as_ref().ok_or_else(|| Error::Lifecycle {
            op: "connect",
            cluster: self.cluster.clone(),
            message: "platform cluster is not connected".into(),
        })
    }

    /// Fixture handle for test bodies. Fails before the platform is connected.
    pub fn fixture(&self, resolver: ClusterResolver) -> Result<Fixture> {
        let platform = self.connected()?.clone();
        Ok(Fixture::new(&self.cluster, platform, resolver, self.config.mcp_readiness.clone()))
    }
}

/// Builds and runs the platform stage lists against pluggable collaborators.
#[derive(Clone)]
pub struct Bootstrap {
    config: BootstrapConfig,
    lifecycle: Arc<dyn ClusterLifecycle>,
    images: Arc<dyn ImageLoader>,
    connector: Arc<dyn Connector>,
    cluster_name: Option<String>,
}

impl Bootstrap {
    pub fn new(config: BootstrapConfig, lifecycle: Arc<dyn ClusterLifecycle>, images: Arc<dyn ImageLoader>, connector: Arc<dyn Connector>) -> Self {
        Self { config, lifecycle, images, connector, cluster_name: None }
    }

    /// kind for clusters and images, kubeconfig-based kube clients.
    pub fn with_kind(config: BootstrapConfig) -> Self {
        let kind = Arc::new(KindCli::default());
        Self::new(config, kind.clone(), kind, Arc::new(KubeConnector))
    }

    /// Use a fixed platform cluster name instead of a random `platform-<hex>`.
    pub fn cluster_name(mut self, name: &str) -> Self {
        self.cluster_name = Some(name.to_string());
        self
    }

    pub fn config(&self) -> &BootstrapConfig { &self.config }

    pub fn resolver(&self) -> ClusterResolver { ClusterResolver::new(self.lifecycle.clone(), self.connector.clone()) }

    /// Fresh stage context with the platform cluster name decided.
    pub fn platform(&self) -> Platform {
        let cluster = self.cluster_name.clone().unwrap_or_else(|| random_name("platform", 16));
        Platform { config: self.config.clone(), cluster, client: None }
    }

    /// Context for an already running platform cluster (used to tear it down later).
    pub async fn attach(&self, cluster: &str) -> Platform {
        let client = match self.resolver().config_for(cluster, &self.config.namespace).await {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "cannot connect to platform cluster; only the cluster itself will be removed");
                None
            }
        };
        Platform { config: self.config.clone(), cluster: cluster.to_string(), client }
    }

    pub fn orchestrator(&self) -> Orchestrator<Platform> {
        let mut orch: Orchestrator<Platform> = Orchestrator::new();

        let (lifecycle, resolver) = (self.lifecycle.clone(), self.resolver());
        orch = orch.setup("create platform cluster", move |p| {
            let (lifecycle, resolver) = (lifecycle.clone(), resolver.clone());
            Box::pin(async move {
                info!(cluster = %p.cluster, "create platform cluster...");
                lifecycle.create(&p.cluster, KIND_CONFIG).await?;
                p.client = Some(resolver.config_for(&p.cluster, &p.config.namespace).await?);
                Ok(())
            })
        });
        orch = orch.setup("create namespace", |p| Box::pin(create_namespace(p)));
        orch = orch.setup("install openmcp operator", |p| Box::pin(install_operator(p)));
        for cp in &self.config.cluster_providers {
            let cp = cp.clone();
            orch = orch.setup(format!("install cluster provider {}", cp.name), move |p| {
                install_provider(p, cp.clone(), CLUSTER_PROVIDER_TEMPLATE, cluster_provider_ref(&cp.name))
            });
        }
        let images = self.images.clone();
        orch = orch.setup("load service provider images", move |p| {
            let images = images.clone();
            Box::pin(async move {
                for sp in &p.config.service_providers {
                    images.load(&p.cluster, &sp.image).await?;
                }
                Ok(())
            })
        });
        for sp in &self.config.service_providers {
            let sp = sp.clone();
            orch = orch.setup(format!("install service provider {}", sp.name), move |p| {
                install_provider(p, sp.clone(), SERVICE_PROVIDER_TEMPLATE, service_provider_ref(&sp.name))
            });
        }
        orch = orch.setup("verify environment", |p| {
            Box::pin(async move {
                info!("verify environment...");
                let cfg = p.connected()?;
                let cluster = onboarding_cluster_ref(cfg.namespace());
                mcpfix_conditions::wait_for(cfg, &cluster, &Condition::ready(), &p.config.ready_wait()).await?;
                info!(cluster = %cluster, "cluster ready");
                Ok(())
            })
        });

        // Teardown executes bottom-up: service providers, onboarding cluster, cluster providers, platform.
        // Provider loops register in reverse so each group is deleted in declaration order.
        let lifecycle = self.lifecycle.clone();
        orch = orch.finish("destroy platform cluster", move |p| {
            let lifecycle = lifecycle.clone();
            Box::pin(async move { lifecycle.destroy(&p.cluster).await })
        });
        for cp in self.config.cluster_providers.iter().rev() {
            let (obj, opts) = (cluster_provider_ref(&cp.name), cp.wait_opts);
            orch = orch.finish(format!("delete cluster provider {}", cp.name), move |p| remove(p, obj.clone(), opts));
        }
        let opts = self.config.wait_opts;
        orch = orch.finish("delete onboarding cluster", move |p| {
            let obj = onboarding_cluster_ref(&p.config.namespace);
            remove(p, obj, opts)
        });
        for sp in self.config.service_providers.iter().rev() {
            let (obj, opts) = (service_provider_ref(&sp.name), sp.wait_opts);
            orch = orch.finish(format!("delete service provider {}", sp.name), move |p| remove(p, obj.clone(), opts));
        }
        orch
    }

    /// Run setup. On failure the teardown list runs before the error is returned.
    pub async fn up(&self) -> std::result::Result<Platform, StageError> {
        let orch = self.orchestrator();
        let mut platform = self.platform();
        if let Err(e) = orch.run_setup(&mut platform).await {
            let report = orch.run_teardown(&mut platform).await;
            info!(%report, "rolled back failed setup");
            return Err(e);
        }
        Ok(platform)
    }

    pub async fn down(&self, platform: &mut Platform) -> TeardownReport { self.orchestrator().run_teardown(platform).await }

    /// Setup, `body` with the fixture, teardown.
    pub async fn run<T, F>(&self, body: F) -> std::result::Result<T, StageError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a Fixture) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let orch = self.orchestrator();
        let mut platform = self.platform();
        let resolver = self.resolver();
        orch.run(&mut platform, move |p| {
            Box::pin(async move {
                let fixture = p.fixture(resolver)?;
                body(&fixture).await
            })
        })
        .await
    }
}

async fn create_namespace(p: &mut Platform) -> Result<()> {
    let cfg = p.connected()?;
    let ns = Namespace {
        metadata: ObjectMeta { name: Some(p.config.namespace.clone()), ..ObjectMeta::default() },
        ..Namespace::default()
    };
    let raw = serde_json::to_value(&ns).map_err(|e| ManifestError::Parse(e.to_string()))?;
    mcpfix_apply::create(cfg, &ManagedObject::from_json(raw)?).await?;
    Ok(())
}

async fn install_operator(p: &mut Platform) -> Result<()> {
    let cfg = p.connected()?;
    let op = &p.config.operator;
    let data = OperatorData {
        name: &op.name,
        namespace: cfg.namespace(),
        image: &op.image,
        environment: &op.environment,
        platform_name: &op.platform_name,
    };
    let manifest = mcpfix_template::render(OPERATOR_TEMPLATE, &data)?;
    mcpfix_apply::create_all_from_manifest(cfg, &manifest).await.into_result()?;
    let deployment = ObjectRef::namespaced(deployment_gvk(), &op.name, cfg.namespace());
    mcpfix_conditions::wait_for(cfg, &deployment, &Condition::available(), &op.wait_opts).await?;
    info!(operator = %op.name, "openmcp operator ready");
    Ok(())
}

fn install_provider<'a>(p: &'a mut Platform, provider: ProviderConfig, template: &'static str, obj: ObjectRef) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let cfg = p.connected()?;
        info!(provider = %obj, image = %provider.image, "create provider");
        let data = ProviderData { name: &provider.name, image: &provider.image };
        mcpfix_apply::create_from_template(cfg, template, &data).await?;
        mcpfix_conditions::wait_for(cfg, &obj, &Condition::ready(), &provider.ready_wait()).await
    })
}

fn remove(p: &mut Platform, obj: ObjectRef, opts: Option<WaitOptions>) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        match &p.client {
            Some(cfg) => mcpfix_apply::delete(cfg, &obj, opts.as_ref()).await,
            None => {
                info!(object = %obj, "platform not connected; nothing to delete");
                Ok(())
            }
        }
    })
}
