//! mcpfix apply: create objects from templates and manifests, delete them, and
//! optionally wait for the result to be observable.
//!
//! Creates are plain creates (no patching). "Already exists" is treated as
//! success, and deletes of missing objects are no-ops, so every operation here
//! can be re-run against a partially provisioned cluster.

#![forbid(unsafe_code)]

use std::path::Path;
use std::time::Instant;

use mcpfix_core::{ignore_not_found, Error, ManagedObject, ObjectRef, Result, WaitOptions};
use mcpfix_kubehub::ClusterConfig;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Objects constructed by a bulk create, paired with the first failure.
///
/// `objects` holds the decoded objects (namespace already rewritten) that a
/// create was attempted for, in manifest order. When `error` is set the last
/// entry is the rejected object; the ones before it were created and are left
/// in place, and later documents were never sent.
#[derive(Debug, Default)]
pub struct AppliedSet {
    pub objects: Vec<ManagedObject>,
    pub error: Option<Error>,
}

impl AppliedSet {
    fn failed(error: Error) -> Self { Self { objects: Vec::new(), error: Some(error) } }

    pub fn is_ok(&self) -> bool { self.error.is_none() }

    pub fn refs(&self) -> Vec<ObjectRef> { self.objects.iter().map(ManagedObject::object_ref).collect() }

    pub fn into_result(self) -> Result<Vec<ManagedObject>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.objects),
        }
    }
}

fn retarget(obj: &mut ManagedObject, cfg: &ClusterConfig) {
    if obj.namespace() != Some(cfg.namespace()) {
        debug!(object = %obj, namespace = %cfg.namespace(), "rewriting namespace");
        obj.set_namespace(cfg.namespace());
    }
}

/// Create `obj` as given. On "already exists" the live object is returned instead.
pub async fn create(cfg: &ClusterConfig, obj: &ManagedObject) -> Result<ManagedObject> {
    let t0 = Instant::now();
    counter!("apply_create_total", 1u64);
    match cfg.client().create(obj).await {
        Ok(live) => {
            histogram!("apply_create_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
            info!(object = %obj, cluster = ?cfg.cluster_name(), "created");
            Ok(live)
        }
        Err(e) if e.is_already_exists() => {
            info!(object = %obj, "already exists");
            cfg.client().get(&obj.object_ref()).await.map_err(|e| Error::client(obj, e))
        }
        Err(e) => {
            counter!("apply_create_err", 1u64);
            warn!(object = %obj, error = %e, "create rejected");
            Err(Error::Apply { object: obj.to_string(), source: e })
        }
    }
}

/// Render `template` with `data`, decode exactly one object, move it into
/// `cfg`'s namespace and create it.
pub async fn create_from_template<T: Serialize + ?Sized>(cfg: &ClusterConfig, template: &str, data: &T) -> Result<ManagedObject> {
    let rendered = mcpfix_template::render(template, data)?;
    let mut obj = mcpfix_template::decode_one(&rendered)?;
    retarget(&mut obj, cfg);
    create(cfg, &obj).await
}

async fn create_each(cfg: &ClusterConfig, mut objects: Vec<ManagedObject>) -> AppliedSet {
    for obj in objects.iter_mut() {
        retarget(obj, cfg);
    }
    let mut set = AppliedSet { objects, error: None };
    for (i, obj) in set.objects.iter().enumerate() {
        if let Err(e) = create(cfg, obj).await {
            set.error = Some(e);
            set.objects.truncate(i + 1);
            break;
        }
    }
    info!(count = set.objects.len(), failed = !set.is_ok(), "bulk create done");
    set
}

/// Create every document of a multi-document manifest.
pub async fn create_all_from_manifest(cfg: &ClusterConfig, manifest: &str) -> AppliedSet {
    match mcpfix_template::decode_all(manifest) {
        Ok(objects) => create_each(cfg, objects).await,
        Err(e) => AppliedSet::failed(e.into()),
    }
}

/// Create every document of every regular file in `dir`, files in name order.
pub async fn create_all_from_dir(cfg: &ClusterConfig, dir: impl AsRef<Path>) -> AppliedSet {
    match mcpfix_template::decode_dir(dir) {
        Ok(objects) => create_each(cfg, objects).await,
        Err(e) => AppliedSet::failed(e),
    }
}

/// Render a template file, then create every document it yields.
pub async fn create_all_from_template_file<T: Serialize + ?Sized>(cfg: &ClusterConfig, path: impl AsRef<Path>, data: &T) -> AppliedSet {
    match mcpfix_template::render_file(path, data) {
        Ok(rendered) => create_all_from_manifest(cfg, &rendered).await,
        Err(e) => AppliedSet::failed(e),
    }
}

/// [`create_all_from_dir`], then (with `opts`) wait until every object is present.
pub async fn create_all_and_wait(cfg: &ClusterConfig, dir: impl AsRef<Path>, opts: Option<&WaitOptions>) -> Result<Vec<ManagedObject>> {
    let set = create_all_from_dir(cfg, dir).await;
    let refs = set.refs();
    let objects = set.into_result()?;
    if let Some(opts) = opts {
        mcpfix_conditions::wait_present(cfg, &refs, opts).await?;
    }
    Ok(objects)
}

/// Delete `obj` if it exists; with `opts`, wait until it is gone.
pub async fn delete(cfg: &ClusterConfig, obj: &ObjectRef, opts: Option<&WaitOptions>) -> Result<()> {
    counter!("apply_delete_total", 1u64);
    match cfg.client().get(obj).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            info!(object = %obj, "already gone");
            return Ok(());
        }
        Err(e) => return Err(Error::client(obj, e)),
    }
    ignore_not_found(cfg.client().delete(obj).await).map_err(|e| Error::client(obj, e))?;
    info!(object = %obj, cluster = ?cfg.cluster_name(), "deleted");
    match opts {
        Some(opts) => mcpfix_conditions::wait_absent(cfg, obj, opts).await,
        None => Ok(()),
    }
}
