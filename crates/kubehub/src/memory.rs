//! In-process backends: an object store, a cluster registry and a connector.
//!
//! They behave like a very small API server (uids, resource versions,
//! finalizers, cluster-scoped kinds) and are used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use mcpfix_core::{ClientError, Error, Gvk, ManagedObject, ObjectRef, Result};
use serde_json::Value as Json;

use crate::{ClusterLifecycle, Connector, ImageLoader, ObjectClient};

type Key = (Gvk, String, String);

#[derive(Default)]
struct Store {
    objects: BTreeMap<Key, Json>,
    cluster_scoped: HashSet<String>,
    create_failures: HashMap<String, (u16, String)>,
    get_failures: HashMap<String, String>,
    next_rv: u64,
    ops: Vec<String>,
}

impl Store {
    fn key(&self, gvk: &Gvk, namespace: Option<&str>, name: &str) -> Key {
        let ns = if self.cluster_scoped.contains(&gvk.kind) { "" } else { namespace.unwrap_or("") };
        (gvk.clone(), ns.to_string(), name.to_string())
    }
}

/// In-memory [`ObjectClient`].
#[derive(Default)]
pub struct MemoryClient {
    store: Mutex<Store>,
}

impl MemoryClient {
    pub fn new() -> Self { Self::default() }

    /// Treat these kinds as cluster-scoped: their namespace is dropped on create.
    pub fn with_cluster_scoped(kinds: &[&str]) -> Self {
        let me = Self::default();
        me.lock().cluster_scoped.extend(kinds.iter().map(|k| k.to_string()));
        me
    }

    fn lock(&self) -> MutexGuard<'_, Store> { self.store.lock().unwrap_or_else(|e| e.into_inner()) }

    /// Store `obj` as-is, bypassing create semantics.
    pub fn insert(&self, obj: ManagedObject) {
        let mut s = self.lock();
        let key = s.key(&obj.gvk(), obj.namespace(), obj.name());
        s.objects.insert(key, obj.into_raw());
    }

    /// Replace the `status` of a stored object. Returns false when it does not exist.
    pub fn set_status(&self, obj: &ObjectRef, status: Json) -> bool {
        let mut s = self.lock();
        let key = s.key(&obj.gvk, obj.namespace.as_deref(), &obj.name);
        match s.objects.get_mut(&key).and_then(|o| o.as_object_mut()) {
            Some(o) => {
                o.insert("status".into(), status);
                true
            }
            None => false,
        }
    }

    /// Drop an object regardless of finalizers, as a controller finishing deletion would.
    pub fn remove(&self, obj: &ObjectRef) -> bool {
        let mut s = self.lock();
        let key = s.key(&obj.gvk, obj.namespace.as_deref(), &obj.name);
        s.objects.remove(&key).is_some()
    }

    pub fn contains(&self, obj: &ObjectRef) -> bool {
        let s = self.lock();
        let key = s.key(&obj.gvk, obj.namespace.as_deref(), &obj.name);
        s.objects.contains_key(&key)
    }

    pub fn objects(&self) -> Vec<ManagedObject> {
        self.lock().objects.values().filter_map(|v| ManagedObject::from_json(v.clone()).ok()).collect()
    }

    /// Reject creates of objects named `name` with an API error.
    pub fn fail_creates(&self, name: &str, code: u16, message: &str) {
        self.lock().create_failures.insert(name.to_string(), (code, message.to_string()));
    }

    /// Fail reads of objects named `name` with a transport error.
    pub fn fail_gets(&self, name: &str, message: &str) {
        self.lock().get_failures.insert(name.to_string(), message.to_string());
    }

    /// Mutating calls seen so far, e.g. `create (v1/ConfigMap) default/dummy`.
    pub fn ops(&self) -> Vec<String> { self.lock().ops.clone() }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn get(&self, obj: &ObjectRef) -> Result<ManagedObject, ClientError> {
        let s = self.lock();
        if let Some(msg) = s.get_failures.get(&obj.name) {
            return Err(ClientError::Transport(msg.clone().into()));
        }
        let key = s.key(&obj.gvk, obj.namespace.as_deref(), &obj.name);
        match s.objects.get(&key) {
            Some(raw) => ManagedObject::from_json(raw.clone()).map_err(|e| ClientError::Transport(Box::new(e))),
            None => Err(ClientError::NotFound(obj.to_string())),
        }
    }

    async fn create(&self, obj: &ManagedObject) -> Result<ManagedObject, ClientError> {
        let mut s = self.lock();
        let gvk = obj.gvk();
        let key = s.key(&gvk, obj.namespace(), obj.name());
        s.ops.push(format!("create {}", obj));
        if let Some((code, message)) = s.create_failures.get(obj.name()) {
            return Err(ClientError::Api { code: *code, message: message.clone() });
        }
        if s.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(obj.to_string()));
        }
        s.next_rv += 1;
        let mut raw = obj.raw().clone();
        if let Some(meta) = raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.insert("uid".into(), Json::String(uuid::Uuid::new_v4().to_string()));
            meta.insert("resourceVersion".into(), Json::String(s.next_rv.to_string()));
            meta.insert("creationTimestamp".into(), Json::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)));
            if key.1.is_empty() {
                meta.remove("namespace");
            }
        }
        s.objects.insert(key, raw.clone());
        ManagedObject::from_json(raw).map_err(|e| ClientError::Transport(Box::new(e)))
    }

    async fn delete(&self, obj: &ObjectRef) -> Result<(), ClientError> {
        let mut s = self.lock();
        s.ops.push(format!("delete {}", obj));
        let key = s.key(&obj.gvk, obj.namespace.as_deref(), &obj.name);
        let Some(raw) = s.objects.get_mut(&key) else {
            return Err(ClientError::NotFound(obj.to_string()));
        };
        let has_finalizers = raw
            .pointer("/metadata/finalizers")
            .and_then(|f| f.as_array())
            .map_or(false, |f| !f.is_empty());
        if has_finalizers {
            if let Some(meta) = raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
                meta.entry("deletionTimestamp")
                    .or_insert_with(|| Json::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)));
            }
        } else {
            s.objects.remove(&key);
        }
        Ok(())
    }
}

#[derive(Default)]
struct ClusterState {
    clusters: BTreeSet<String>,
    images: Vec<(String, String)>,
    fail_destroy: HashSet<String>,
    fail_images: HashSet<String>,
}

/// In-memory [`ClusterLifecycle`] and [`ImageLoader`]. Kubeconfigs are `memory://<name>`.
#[derive(Default)]
pub struct MemoryClusters {
    state: Mutex<ClusterState>,
}

impl MemoryClusters {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, ClusterState> { self.state.lock().unwrap_or_else(|e| e.into_inner()) }

    /// Register a cluster created outside the lifecycle, e.g. by a cluster provider.
    pub fn add(&self, name: &str) { self.lock().clusters.insert(name.to_string()); }

    pub fn names(&self) -> Vec<String> { self.lock().clusters.iter().cloned().collect() }

    /// `(cluster, image)` pairs loaded so far.
    pub fn loaded_images(&self) -> Vec<(String, String)> { self.lock().images.clone() }

    pub fn fail_destroy(&self, name: &str) { self.lock().fail_destroy.insert(name.to_string()); }

    pub fn fail_image(&self, image: &str) { self.lock().fail_images.insert(image.to_string()); }
}

#[async_trait]
impl ClusterLifecycle for MemoryClusters {
    async fn create(&self, name: &str, _config: &str) -> Result<()> {
        if !self.lock().clusters.insert(name.to_string()) {
            return Err(Error::Lifecycle { op: "create cluster", cluster: name.to_string(), message: "already exists".into() });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> { Ok(self.names()) }

    async fn kubeconfig(&self, name: &str) -> Result<String> {
        if self.lock().clusters.contains(name) {
            Ok(format!("memory://{}", name))
        } else {
            Err(Error::Lifecycle { op: "get kubeconfig", cluster: name.to_string(), message: "unknown cluster".into() })
        }
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut s = self.lock();
        if s.fail_destroy.contains(name) {
            return Err(Error::Lifecycle { op: "delete cluster", cluster: name.to_string(), message: "injected failure".into() });
        }
        s.clusters.remove(name);
        Ok(())
    }
}

#[async_trait]
impl ImageLoader for MemoryClusters {
    async fn load(&self, cluster: &str, image: &str) -> Result<()> {
        let mut s = self.lock();
        if s.fail_images.contains(image) || !s.clusters.contains(cluster) {
            return Err(Error::Lifecycle { op: "load image", cluster: cluster.to_string(), message: format!("cannot load {}", image) });
        }
        s.images.push((cluster.to_string(), image.to_string()));
        Ok(())
    }
}

/// Hands out pre-registered [`MemoryClient`]s by cluster name.
#[derive(Default)]
pub struct MemoryConnector {
    clients: Mutex<HashMap<String, Arc<MemoryClient>>>,
}

impl MemoryConnector {
    pub fn new() -> Self { Self::default() }

    pub fn register(&self, cluster: &str, client: Arc<MemoryClient>) {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).insert(cluster.to_string(), client);
    }

    /// Client for `cluster`, created empty on first use.
    pub fn client(&self, cluster: &str) -> Arc<MemoryClient> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(MemoryClient::new()))
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, cluster: &str, kubeconfig: &str) -> Result<Arc<dyn ObjectClient>> {
        if kubeconfig.strip_prefix("memory://") != Some(cluster) {
            return Err(Error::Lifecycle { op: "connect", cluster: cluster.to_string(), message: "kubeconfig does not match cluster".into() });
        }
        Ok(self.client(cluster))
    }
}
