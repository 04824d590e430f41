//! Full bootstrap against the in-memory backends, with a task standing in for
//! the operator and providers (it flips statuses and registers derived clusters).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mcpfix_core::{Error, Gvk, ManagedObject, ObjectRef, WaitOptions};
use mcpfix_kubehub::memory::{MemoryClient, MemoryClusters, MemoryConnector};
use mcpfix_kubehub::ObjectClient;
use mcpfix_setup::providers::{
    cluster_provider_ref, deployment_gvk, mcp_ref, onboarding_cluster_ref, service_provider_ref, CLUSTER_SCOPED_KINDS,
};
use mcpfix_setup::{Bootstrap, BootstrapConfig, Fixture, Orchestrator, ProviderConfig};
use serde_json::json;
use tokio::task::JoinHandle;

const PLATFORM: &str = "platform-test";
const ONBOARDING: &str = "onboarding.k7x2q";
const MCP: &str = "mcp.test-mcp";

fn config() -> BootstrapConfig {
    BootstrapConfig::from_yaml(
        r#"
namespace: openmcp-system
operator:
  name: openmcp-operator
  image: ghcr.io/openmcp-project/images/openmcp-operator:v0.13.0
clusterProviders:
  - name: kind
    image: ghcr.io/openmcp-project/images/cluster-provider-kind:v0.0.15
    waitOpts: {timeoutSecs: 60}
serviceProviders:
  - name: crossplane
    image: ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4
    waitOpts: {timeoutSecs: 60}
"#,
    )
    .unwrap()
}

struct World {
    clusters: Arc<MemoryClusters>,
    connector: Arc<MemoryConnector>,
    platform: Arc<MemoryClient>,
}

impl World {
    fn new() -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let platform = Arc::new(MemoryClient::with_cluster_scoped(CLUSTER_SCOPED_KINDS));
        connector.register(PLATFORM, platform.clone());
        Self { clusters: Arc::new(MemoryClusters::new()), connector, platform }
    }

    fn bootstrap(&self) -> Bootstrap {
        Bootstrap::new(config(), self.clusters.clone(), self.clusters.clone(), self.connector.clone()).cluster_name(PLATFORM)
    }

    /// Plays operator and providers: whatever gets created becomes ready shortly after.
    fn simulate(&self) -> JoinHandle<()> {
        let (clusters, connector, platform) = (self.clusters.clone(), self.connector.clone(), self.platform.clone());
        tokio::spawn(async move {
            let ready = json!({"conditions": [{"type": "Ready", "status": "True", "message": "simulated"}]});
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                platform.set_status(
                    &ObjectRef::namespaced(deployment_gvk(), "openmcp-operator", "openmcp-system"),
                    json!({"conditions": [{"type": "Available", "status": "True"}]}),
                );
                platform.set_status(&service_provider_ref("crossplane"), ready.clone());
                if platform.set_status(&cluster_provider_ref("kind"), ready.clone()) {
                    let onboarding = onboarding_cluster_ref("openmcp-system");
                    if !platform.contains(&onboarding) {
                        platform.insert(
                            ManagedObject::from_json(json!({
                                "apiVersion": "clusters.openmcp.cloud/v1alpha1", "kind": "Cluster",
                                "metadata": {"name": "onboarding", "namespace": "openmcp-system"},
                                "status": ready,
                            }))
                            .unwrap(),
                        );
                        clusters.add(ONBOARDING);
                    }
                }
                if connector.client(ONBOARDING).set_status(&mcp_ref("test-mcp", "default"), json!({"phase": "Ready"})) {
                    clusters.add(MCP);
                }
            }
        })
    }
}

fn provider(kind: &str, name: &str, finalizers: &[&str]) -> ManagedObject {
    ManagedObject::from_json(json!({
        "apiVersion": "openmcp.cloud/v1alpha1", "kind": kind,
        "metadata": {"name": name, "finalizers": finalizers},
    }))
    .unwrap()
}

fn api_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mcpfix-setup-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("configmap.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: dummy\ndata:\n  foo: bar\n").unwrap();
    dir
}

async fn assert_dummy(fx: &Fixture, cfg: mcpfix_kubehub::ClusterConfig) -> mcpfix_core::Result<()> {
    let cm = ObjectRef::namespaced(Gvk::new("", "v1", "ConfigMap"), "dummy", "default");
    let live = cfg.client().get(&cm).await.map_err(|e| Error::client(&cm, e))?;
    assert_eq!(live.field(&["data", "foo"]).and_then(|v| v.as_str()), Some("bar"));
    assert_eq!(fx.namespace(), "openmcp-system");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn bootstrap_runs_body_and_cleans_up() {
    let world = World::new();
    let sim = world.simulate();
    let dir = api_dir();

    let body_dir = dir.clone();
    let mcp = world
        .bootstrap()
        .run(move |fx| {
            Box::pin(async move {
                let opts = WaitOptions::with_timeout(Duration::from_secs(60));
                let mcp = fx.create_mcp("test-mcp", &opts).await?;
                fx.import_service_provider_apis(&body_dir, Some(&opts)).await?;
                fx.import_domain_apis(&body_dir, Some(&opts)).await?;
                assert_dummy(fx, fx.onboarding_config().await?).await?;
                assert_dummy(fx, fx.mcp_config().await?).await?;
                fx.delete_mcp("test-mcp", Some(&opts)).await?;
                Ok(mcp)
            })
        })
        .await
        .unwrap();
    sim.abort();

    assert_eq!(mcp.name(), "test-mcp");
    assert_eq!(mcp.namespace(), Some("default"));
    assert!(!world.clusters.names().contains(&PLATFORM.to_string()));
    assert_eq!(
        world.clusters.loaded_images(),
        vec![(PLATFORM.to_string(), "ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4".to_string())]
    );
    let deletes: Vec<_> = world.platform.ops().into_iter().filter(|op| op.starts_with("delete")).collect();
    assert_eq!(
        deletes,
        vec![
            "delete (openmcp.cloud/v1alpha1/ServiceProvider) crossplane",
            "delete (clusters.openmcp.cloud/v1alpha1/Cluster) openmcp-system/onboarding",
            "delete (openmcp.cloud/v1alpha1/ClusterProvider) kind",
        ]
    );
    assert!(!world.platform.contains(&cluster_provider_ref("kind")));
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test(start_paused = true)]
async fn failed_image_load_rolls_back() {
    let world = World::new();
    world.clusters.fail_image("ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4");
    let sim = world.simulate();

    let err = world.bootstrap().up().await.err().expect("setup must fail");
    sim.abort();

    assert_eq!(err.stage, "load service provider images");
    assert!(matches!(err.source, Error::Lifecycle { op: "load image", .. }));
    assert!(world.clusters.names().iter().all(|c| c != PLATFORM));
    assert!(!world.platform.contains(&cluster_provider_ref("kind")));
    assert!(!world.platform.ops().iter().any(|op| op.contains("ServiceProvider) crossplane") && op.starts_with("create")));
}

#[tokio::test(start_paused = true)]
async fn provider_that_never_gets_ready_times_out() {
    let world = World::new();
    // No simulator: the operator deployment never reports Available.
    let mut cfg = config();
    cfg.operator.wait_opts = WaitOptions::with_timeout(Duration::from_secs(30));
    let bootstrap = Bootstrap::new(cfg, world.clusters.clone(), world.clusters.clone(), world.connector.clone()).cluster_name(PLATFORM);

    let err = bootstrap.up().await.err().expect("setup must fail");
    assert_eq!(err.stage, "install openmcp operator");
    assert!(err.source.is_timeout(), "{}", err.source);
    assert!(world.clusters.names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn features_are_orchestrators_over_the_fixture() {
    let world = World::new();
    let sim = world.simulate();
    let bootstrap = world.bootstrap();
    let mut platform = bootstrap.up().await.unwrap();
    let fixture = platform.fixture(bootstrap.resolver()).unwrap();

    let feature = Orchestrator::<&Fixture>::new()
        .setup("create mcp", |fx| {
            Box::pin(async move { fx.create_mcp("test-mcp", &WaitOptions::with_timeout(Duration::from_secs(60))).await.map(|_| ()) })
        })
        .finish("delete mcp", |fx| Box::pin(async move { fx.delete_mcp("test-mcp", None).await }));
    let mut ctx = &fixture;
    let seen = feature
        .run(&mut ctx, |fx| {
            Box::pin(async move {
                let onboarding = fx.onboarding_config().await?;
                let live = onboarding
                    .client()
                    .get(&mcp_ref("test-mcp", "default"))
                    .await
                    .map_err(|e| Error::client("test-mcp", e))?;
                Ok(live.field(&["status", "phase"]).cloned())
            })
        })
        .await
        .unwrap();
    assert_eq!(seen, Some(json!("Ready")));
    assert!(!world.connector.client(ONBOARDING).contains(&mcp_ref("test-mcp", "default")));

    let report = bootstrap.down(&mut platform).await;
    sim.abort();
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.ran.last().map(String::as_str), Some("destroy platform cluster"));
}

#[tokio::test(start_paused = true)]
async fn teardown_deletes_only_wait_when_configured() {
    let world = World::new();
    world.clusters.add(PLATFORM);
    world.platform.insert(provider("ServiceProvider", "crossplane", &["openmcp.cloud/cleanup"]));

    let mut cfg = config();
    for p in cfg.cluster_providers.iter_mut().chain(cfg.service_providers.iter_mut()) {
        p.wait_opts = None;
    }
    let bootstrap = Bootstrap::new(cfg, world.clusters.clone(), world.clusters.clone(), world.connector.clone()).cluster_name(PLATFORM);
    let mut platform = bootstrap.attach(PLATFORM).await;
    let started = tokio::time::Instant::now();
    let report = bootstrap.down(&mut platform).await;
    assert!(report.is_clean(), "{report}");
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert!(world.platform.contains(&service_provider_ref("crossplane")), "finalizer keeps the provider around");

    // The default config waits 60s on provider deletes, so the held provider now times out.
    world.clusters.add(PLATFORM);
    let bootstrap = world.bootstrap();
    let mut platform = bootstrap.attach(PLATFORM).await;
    let started = tokio::time::Instant::now();
    let report = bootstrap.down(&mut platform).await;
    assert!(started.elapsed() >= Duration::from_secs(60), "took {:?}", started.elapsed());
    assert_eq!(report.errors.len(), 1, "{report}");
    assert_eq!(report.errors[0].stage, "delete service provider crossplane");
    assert!(report.errors[0].source.is_timeout());
    assert_eq!(report.ran.last().map(String::as_str), Some("destroy platform cluster"));
}

#[tokio::test(start_paused = true)]
async fn providers_are_deleted_in_declaration_order() {
    let world = World::new();
    world.clusters.add(PLATFORM);
    let mut cfg = config();
    cfg.cluster_providers.push(ProviderConfig { name: "gardener".into(), image: "cp-gardener:v1".into(), wait_opts: None });
    cfg.service_providers.push(ProviderConfig { name: "landscaper".into(), image: "sp-landscaper:v1".into(), wait_opts: None });
    for (kind, name) in [("ClusterProvider", "kind"), ("ClusterProvider", "gardener"), ("ServiceProvider", "crossplane"), ("ServiceProvider", "landscaper")] {
        world.platform.insert(provider(kind, name, &[]));
    }
    let bootstrap = Bootstrap::new(cfg, world.clusters.clone(), world.clusters.clone(), world.connector.clone()).cluster_name(PLATFORM);
    let mut platform = bootstrap.attach(PLATFORM).await;
    let report = bootstrap.down(&mut platform).await;
    assert!(report.is_clean(), "{report}");
    assert_eq!(
        report.ran,
        vec![
            "delete service provider crossplane",
            "delete service provider landscaper",
            "delete onboarding cluster",
            "delete cluster provider kind",
            "delete cluster provider gardener",
            "destroy platform cluster",
        ]
    );
    let deletes: Vec<_> = world.platform.ops().into_iter().filter(|op| op.starts_with("delete")).collect();
    assert_eq!(
        deletes,
        vec![
            "delete (openmcp.cloud/v1alpha1/ServiceProvider) crossplane",
            "delete (openmcp.cloud/v1alpha1/ServiceProvider) landscaper",
            "delete (openmcp.cloud/v1alpha1/ClusterProvider) kind",
            "delete (openmcp.cloud/v1alpha1/ClusterProvider) gardener",
        ]
    );
}
