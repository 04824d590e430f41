//! Readiness predicates evaluated against an object's `status` payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{Error, ManagedObject};

/// What a caller waits for on a live object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Condition {
    /// Entry of `status.conditions[]` with matching `type` whose `status` equals `status`.
    #[serde(rename_all = "camelCase")]
    NamedCondition {
        #[serde(rename = "type")]
        condition_type: String,
        status: String,
    },
    /// Scalar at `status.<key>` equal to `value`.
    StatusKey { key: String, value: Json },
}

/// Result of evaluating a [`Condition`] once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub satisfied: bool,
    /// Human-readable rendering of what was seen, for logs and timeout errors.
    pub observed: String,
}

impl Observation {
    fn pending(observed: impl Into<String>) -> Self { Self { satisfied: false, observed: observed.into() } }
}

impl Condition {
    pub fn named(condition_type: &str, status: &str) -> Self {
        Condition::NamedCondition { condition_type: condition_type.to_string(), status: status.to_string() }
    }

    pub fn status_key(key: &str, value: impl Into<Json>) -> Self {
        Condition::StatusKey { key: key.to_string(), value: value.into() }
    }

    /// `Ready=True`
    pub fn ready() -> Self { Self::named("Ready", "True") }

    /// `Available=True`, as reported by Deployments.
    pub fn available() -> Self { Self::named("Available", "True") }

    /// `status.phase == phase`
    pub fn phase(phase: &str) -> Self { Self::status_key("phase", phase) }

    /// Evaluate against a freshly fetched object.
    ///
    /// Missing `status`, missing collections and missing keys are "not yet
    /// satisfied". Only payloads of the wrong shape are errors.
    pub fn evaluate(&self, obj: &ManagedObject) -> Result<Observation, Error> {
        let malformed = |reason: String| Error::Malformed { object: obj.to_string(), reason };
        let status = match obj.status() {
            None => return Ok(Observation::pending("<no status>")),
            Some(s) => s.as_object().ok_or_else(|| malformed("status is not a map".into()))?,
        };
        match self {
            Condition::NamedCondition { condition_type, status: desired } => {
                let conditions = match status.get("conditions") {
                    None | Some(Json::Null) => return Ok(Observation::pending("<no conditions>")),
                    Some(c) => c.as_array().ok_or_else(|| malformed("status.conditions is not a list".into()))?,
                };
                // Last entry wins when the server reports duplicates.
                let mut found: Option<(&str, &str)> = None;
                for (i, entry) in conditions.iter().enumerate() {
                    let entry = entry.as_object().ok_or_else(|| malformed(format!("status.conditions[{}] is not a map", i)))?;
                    if entry.get("type").and_then(|t| t.as_str()) != Some(condition_type.as_str()) {
                        continue;
                    }
                    let current = entry
                        .get("status")
                        .and_then(|s| s.as_str())
                        .ok_or_else(|| malformed(format!("condition {} has no string status", condition_type)))?;
                    let message = entry.get("message").and_then(|m| m.as_str()).unwrap_or("");
                    found = Some((current, message));
                }
                Ok(match found {
                    None => Observation::pending(format!("{}: <absent>", condition_type)),
                    Some((current, message)) => Observation {
                        satisfied: current == desired,
                        observed: if message.is_empty() {
                            format!("{}={}", condition_type, current)
                        } else {
                            format!("{}={} ({})", condition_type, current, message)
                        },
                    },
                })
            }
            Condition::StatusKey { key, value } => Ok(match status.get(key) {
                None => Observation::pending(format!("status.{}: <absent>", key)),
                Some(current) => Observation { satisfied: current == value, observed: format!("status.{}={}", key, current) },
            }),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::NamedCondition { condition_type, status } => write!(f, "condition {}={}", condition_type, status),
            Condition::StatusKey { key, value } => write!(f, "status.{}={}", key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj_with_status(status: Json) -> ManagedObject {
        ManagedObject::from_json(json!({
            "apiVersion": "openmcp.cloud/v1alpha1",
            "kind": "ClusterProvider",
            "metadata": {"name": "kind"},
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn named_condition_matches_status() {
        let obj = obj_with_status(json!({"conditions": [
            {"type": "Installed", "status": "True"},
            {"type": "Ready", "status": "True", "message": "all good"},
        ]}));
        let obs = Condition::ready().evaluate(&obj).unwrap();
        assert!(obs.satisfied);
        assert_eq!(obs.observed, "Ready=True (all good)");
        assert!(!Condition::named("Ready", "False").evaluate(&obj).unwrap().satisfied);
    }

    #[test]
    fn last_duplicate_condition_wins() {
        let obj = obj_with_status(json!({"conditions": [
            {"type": "Ready", "status": "True"},
            {"type": "Ready", "status": "False"},
        ]}));
        let obs = Condition::ready().evaluate(&obj).unwrap();
        assert!(!obs.satisfied);
        assert_eq!(obs.observed, "Ready=False");
    }

    #[test]
    fn missing_fields_are_pending_not_errors() {
        let no_status = ManagedObject::from_json(json!({"apiVersion": "v1", "kind": "X", "metadata": {"name": "a"}})).unwrap();
        for cond in [Condition::ready(), Condition::phase("Ready")] {
            assert!(!cond.evaluate(&no_status).unwrap().satisfied);
            assert!(!cond.evaluate(&obj_with_status(json!({}))).unwrap().satisfied);
        }
        let other = obj_with_status(json!({"conditions": [{"type": "Installed", "status": "True"}]}));
        assert_eq!(Condition::ready().evaluate(&other).unwrap().observed, "Ready: <absent>");
    }

    #[test]
    fn malformed_payloads_are_errors() {
        let bad_status = obj_with_status(json!("Ready"));
        assert!(matches!(Condition::ready().evaluate(&bad_status), Err(Error::Malformed { .. })));
        let bad_list = obj_with_status(json!({"conditions": {"type": "Ready"}}));
        assert!(matches!(Condition::ready().evaluate(&bad_list), Err(Error::Malformed { .. })));
        let bad_entry = obj_with_status(json!({"conditions": [{"type": "Ready", "status": true}]}));
        assert!(matches!(Condition::ready().evaluate(&bad_entry), Err(Error::Malformed { .. })));
        let stray = obj_with_status(json!({"conditions": [{"type": "Ready", "status": "True"}, "Ready"]}));
        match Condition::ready().evaluate(&stray) {
            Err(Error::Malformed { reason, .. }) => assert_eq!(reason, "status.conditions[1] is not a map"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn status_key_compares_values() {
        let obj = obj_with_status(json!({"phase": "Ready", "replicas": 3}));
        assert!(Condition::phase("Ready").evaluate(&obj).unwrap().satisfied);
        assert!(!Condition::phase("Pending").evaluate(&obj).unwrap().satisfied);
        assert!(Condition::status_key("replicas", 3).evaluate(&obj).unwrap().satisfied);
        assert!(!Condition::status_key("replicas", "3").evaluate(&obj).unwrap().satisfied);
    }

    #[test]
    fn deserializes_tagged_config() {
        let c: Condition = serde_json::from_value(json!({"kind": "statusKey", "key": "phase", "value": "Ready"})).unwrap();
        assert_eq!(c, Condition::phase("Ready"));
        let c: Condition = serde_json::from_value(json!({"kind": "namedCondition", "type": "Ready", "status": "True"})).unwrap();
        assert_eq!(c, Condition::ready());
        assert_eq!(c.to_string(), "condition Ready=True");
    }
}
