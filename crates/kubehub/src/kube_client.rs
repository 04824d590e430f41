//! kube-rs backed [`ObjectClient`] over the dynamic API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{pinned_kind, Scope},
    Client,
};
use mcpfix_core::{ClientError, Error, Gvk, ManagedObject, ObjectRef};
use serde_json::Value as Json;
use tracing::debug;

use crate::{Connector, ObjectClient};

/// Dynamic-object client. Resolved API resources are cached per GVK.
pub struct KubeObjectClient {
    client: Client,
    resources: Mutex<HashMap<Gvk, (ApiResource, bool)>>,
}

impl KubeObjectClient {
    pub fn new(client: Client) -> Self {
        Self { client, resources: Mutex::new(HashMap::new()) }
    }

    /// Client for the current kubeconfig context.
    pub async fn try_default() -> Result<Self, ClientError> {
        let client = Client::try_default().await.map_err(|e| map_kube_err("default client", e))?;
        Ok(Self::new(client))
    }

    async fn find_api_resource(&self, gvk: &Gvk) -> Result<(ApiResource, bool), ClientError> {
        if let Some(hit) = self.resources.lock().unwrap_or_else(|e| e.into_inner()).get(gvk) {
            return Ok(hit.clone());
        }
        let key = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        let (ar, caps) = pinned_kind(&self.client, &key).await.map_err(|e| map_kube_err(&gvk.to_string(), e))?;
        let namespaced = matches!(caps.scope, Scope::Namespaced);
        debug!(gvk = %gvk, plural = %ar.plural, namespaced, "resolved api resource");
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(gvk.clone(), (ar.clone(), namespaced));
        Ok((ar, namespaced))
    }

    async fn api_for(&self, gvk: &Gvk, namespace: Option<&str>) -> Result<(Api<DynamicObject>, bool), ClientError> {
        let (ar, namespaced) = self.find_api_resource(gvk).await?;
        let api = if namespaced {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::default_namespaced_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok((api, namespaced))
    }
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn get(&self, obj: &ObjectRef) -> Result<ManagedObject, ClientError> {
        let (api, _) = self.api_for(&obj.gvk, obj.namespace.as_deref()).await?;
        let live = api.get(&obj.name).await.map_err(|e| map_kube_err(&obj.to_string(), e))?;
        to_managed(live, &obj.gvk)
    }

    async fn create(&self, obj: &ManagedObject) -> Result<ManagedObject, ClientError> {
        let gvk = obj.gvk();
        let (api, namespaced) = self.api_for(&gvk, obj.namespace()).await?;
        let mut obj = obj.clone();
        if !namespaced {
            // Cluster-scoped kinds reject a namespace.
            obj.clear_namespace();
        }
        let dynobj: DynamicObject = serde_json::from_value(obj.raw().clone()).map_err(|e| ClientError::Transport(Box::new(e)))?;
        let created = api
            .create(&PostParams::default(), &dynobj)
            .await
            .map_err(|e| map_kube_err(&obj.to_string(), e))?;
        to_managed(created, &gvk)
    }

    async fn delete(&self, obj: &ObjectRef) -> Result<(), ClientError> {
        let (api, _) = self.api_for(&obj.gvk, obj.namespace.as_deref()).await?;
        api.delete(&obj.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_err(&obj.to_string(), e))
    }
}

fn to_managed(obj: DynamicObject, gvk: &Gvk) -> Result<ManagedObject, ClientError> {
    let mut raw = serde_json::to_value(&obj).map_err(|e| ClientError::Transport(Box::new(e)))?;
    // Some responses omit TypeMeta; fill it from the request identity.
    if let Some(map) = raw.as_object_mut() {
        map.entry("apiVersion").or_insert_with(|| Json::String(gvk.api_version()));
        map.entry("kind").or_insert_with(|| Json::String(gvk.kind.clone()));
        if let Some(meta) = map.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.remove("managedFields");
        }
    }
    ManagedObject::from_json(raw).map_err(|e| ClientError::Transport(Box::new(e)))
}

fn map_kube_err(what: &str, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound(what.to_string()),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => ClientError::AlreadyExists(what.to_string()),
        kube::Error::Api(ae) => ClientError::Api { code: ae.code, message: ae.message },
        // Kind not (yet) served: its CRD has not been installed.
        kube::Error::Discovery(e) => ClientError::NotFound(format!("{}: {}", what, e)),
        other => ClientError::Transport(Box::new(other)),
    }
}

/// Builds [`KubeObjectClient`]s from kubeconfig documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConnector;

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self, cluster: &str, kubeconfig: &str) -> Result<Arc<dyn ObjectClient>, Error> {
        let fail = |message: String| Error::Lifecycle { op: "connect", cluster: cluster.to_string(), message };
        let kc = Kubeconfig::from_yaml(kubeconfig).map_err(|e| fail(e.to_string()))?;
        let config = kube::Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
            .await
            .map_err(|e| fail(e.to_string()))?;
        let client = Client::try_from(config).map_err(|e| fail(e.to_string()))?;
        Ok(Arc::new(KubeObjectClient::new(client)))
    }
}
