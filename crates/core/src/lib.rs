//! mcpfix core types: object identity, live object snapshots, wait options and readiness predicates.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub mod condition;
pub mod error;

pub use condition::{Condition, Observation};
pub use error::{ignore_not_found, ClientError, Error, ManifestError, Result, TemplateError};

pub mod prelude {
    pub use super::{Condition, Error, Gvk, ManagedObject, ObjectRef, Result, WaitOptions};
}

/// Namespace used by the well-known onboarding/MCP conveniences.
pub const NAMESPACE_DEFAULT: &str = "default";

/// Group/Version/Kind of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), kind: kind.to_string() }
    }

    /// Split an `apiVersion` ("v1" or "group/v1") into group and version.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        Self::new(group, version, kind)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Identity of a remote object: (gvk, name, namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub gvk: Gvk,
    pub name: String,
    /// `None` for cluster-scoped kinds.
    pub namespace: Option<String>,
}

impl ObjectRef {
    pub fn cluster_scoped(gvk: Gvk, name: &str) -> Self {
        Self { gvk, name: name.to_string(), namespace: None }
    }

    pub fn namespaced(gvk: Gvk, name: &str, namespace: &str) -> Self {
        Self { gvk, name: name.to_string(), namespace: Some(namespace.to_string()) }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => write!(f, "({}) {}/{}", self.gvk, ns, self.name),
            _ => write!(f, "({}) {}", self.gvk, self.name),
        }
    }
}

/// Snapshot of a remote declarative resource.
///
/// The payload is kept as raw JSON so arbitrary kinds (including CRDs that are
/// not known at compile time) flow through unchanged. Construction validates
/// that the identity fields are present, so the accessors never fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ManagedObject {
    raw: Json,
}

impl ManagedObject {
    pub fn from_json(raw: Json) -> Result<Self, ManifestError> {
        let obj = raw.as_object().ok_or(ManifestError::NotAnObject)?;
        if obj.get("apiVersion").and_then(|v| v.as_str()).map_or(true, str::is_empty) {
            return Err(ManifestError::Missing("apiVersion"));
        }
        if obj.get("kind").and_then(|v| v.as_str()).map_or(true, str::is_empty) {
            return Err(ManifestError::Missing("kind"));
        }
        let name = obj.get("metadata").and_then(|m| m.get("name")).and_then(|v| v.as_str());
        if name.map_or(true, str::is_empty) {
            return Err(ManifestError::Missing("metadata.name"));
        }
        Ok(Self { raw })
    }

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.field(path).and_then(|v| v.as_str())
    }

    pub fn api_version(&self) -> &str { self.str_at(&["apiVersion"]).unwrap_or_default() }
    pub fn kind(&self) -> &str { self.str_at(&["kind"]).unwrap_or_default() }
    pub fn name(&self) -> &str { self.str_at(&["metadata", "name"]).unwrap_or_default() }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at(&["metadata", "namespace"]).filter(|ns| !ns.is_empty())
    }

    pub fn gvk(&self) -> Gvk { Gvk::from_api_version(self.api_version(), self.kind()) }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef { gvk: self.gvk(), name: self.name().to_string(), namespace: self.namespace().map(str::to_string) }
    }

    /// Overwrite `metadata.namespace`, whatever the source manifest declared.
    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(meta) = self.raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.insert("namespace".into(), Json::String(namespace.to_string()));
        }
    }

    pub fn clear_namespace(&mut self) {
        if let Some(meta) = self.raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.remove("namespace");
        }
    }

    pub fn status(&self) -> Option<&Json> { self.raw.get("status").filter(|s| !s.is_null()) }

    /// Walk nested maps, e.g. `["data", "foo"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Json> {
        path.iter().try_fold(&self.raw, |cur, key| cur.get(*key))
    }

    pub fn raw(&self) -> &Json { &self.raw }
    pub fn into_raw(self) -> Json { self.raw }
}

impl TryFrom<Json> for ManagedObject {
    type Error = ManifestError;
    fn try_from(raw: Json) -> Result<Self, Self::Error> { Self::from_json(raw) }
}

impl fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.object_ref().fmt(f) }
}

/// Poll deadline and interval. `Option<WaitOptions>::None` at call sites means "do not wait".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    #[serde(rename = "timeoutSecs", with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(rename = "intervalSecs", with = "duration_secs", default = "default_interval")]
    pub interval: Duration,
}

fn default_timeout() -> Duration { Duration::from_secs(300) }
fn default_interval() -> Duration { Duration::from_secs(5) }

impl Default for WaitOptions {
    fn default() -> Self { Self { timeout: default_timeout(), interval: default_interval() } }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self { Self { timeout, ..Default::default() } }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("duration must be a non-negative number of seconds: {e}")))
    }
}
