//! Manifest decoding: multi-document YAML strings and directories of manifest files.

use std::path::{Path, PathBuf};

use mcpfix_core::{Error, ManagedObject, ManifestError};
use serde::Deserialize;
use serde_json::Value as Json;

fn max_manifest_bytes() -> usize {
    std::env::var("MCPFIX_MAX_MANIFEST_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

fn max_manifest_nodes() -> usize {
    std::env::var("MCPFIX_MAX_MANIFEST_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

fn node_budget_exceeded(v: &Json, max: usize) -> bool {
    // Bail out as soon as the running count reaches max
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur >= max { return; }
        *cur += 1;
        match v {
            Json::Object(map) => {
                for vv in map.values() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            Json::Array(arr) => {
                for vv in arr.iter() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

/// Decode every non-empty YAML document of `manifest`.
pub fn decode_all(manifest: &str) -> Result<Vec<ManagedObject>, ManifestError> {
    let limit = max_manifest_bytes();
    if manifest.len() > limit {
        return Err(ManifestError::TooLarge { limit });
    }
    let nodes = max_manifest_nodes();
    let mut out = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(manifest) {
        let val = serde_yaml::Value::deserialize(doc).map_err(|e| ManifestError::Parse(e.to_string()))?;
        if val.is_null() {
            continue;
        }
        let json = serde_json::to_value(val).map_err(|e| ManifestError::Parse(e.to_string()))?;
        if node_budget_exceeded(&json, nodes) {
            return Err(ManifestError::TooComplex { limit: nodes });
        }
        out.push(ManagedObject::from_json(json)?);
    }
    Ok(out)
}

/// Decode a manifest that must hold exactly one object.
pub fn decode_one(manifest: &str) -> Result<ManagedObject, ManifestError> {
    let mut objs = decode_all(manifest)?;
    match objs.len() {
        1 => Ok(objs.remove(0)),
        n => Err(ManifestError::ExpectedOne(n)),
    }
}

/// Regular files directly inside `dir`, sorted by file name. Subdirectories are ignored.
pub fn manifest_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decode every document of every file in `dir` (non-recursive), in file name order.
pub fn decode_dir(dir: impl AsRef<Path>) -> Result<Vec<ManagedObject>, Error> {
    let mut out = Vec::new();
    for path in manifest_files(dir)? {
        let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let objs = decode_all(&text)?;
        tracing::debug!(path = %path.display(), count = objs.len(), "decoded manifest file");
        out.extend(objs);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mcpfix-template-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn decodes_multi_document_manifests() {
        let m = "---\napiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: op\n---\n# only a comment\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: op\n  namespace: x\n";
        let objs = decode_all(m).unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].kind(), "ServiceAccount");
        assert_eq!(objs[1].gvk().group, "apps");
        assert_eq!(objs[1].namespace(), Some("x"));
    }

    #[test]
    fn decode_one_requires_single_object() {
        assert!(decode_one("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n").is_ok());
        assert_eq!(decode_one("").unwrap_err(), ManifestError::ExpectedOne(0));
        let two = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n";
        assert_eq!(decode_one(two).unwrap_err(), ManifestError::ExpectedOne(2));
    }

    #[test]
    fn decode_errors_are_friendly() {
        assert_eq!(decode_all("kind: Foo\nmetadata:\n  name: x\n").unwrap_err(), ManifestError::Missing("apiVersion"));
        assert_eq!(decode_all("- a\n- b\n").unwrap_err(), ManifestError::NotAnObject);
        assert!(matches!(decode_all("a: [unclosed\n"), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn node_budget_counts_nested_values() {
        let v = serde_json::json!({"a": [1, 2, 3], "b": {"c": 1}});
        assert!(!node_budget_exceeded(&v, 100));
        assert!(node_budget_exceeded(&v, 4));
    }

    #[test]
    fn directories_decode_in_name_order_and_skip_subdirs() {
        let dir = scratch_dir();
        std::fs::write(dir.join("b.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: second\n").unwrap();
        std::fs::write(dir.join("a.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: first\n").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("c.yaml"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: hidden\n").unwrap();

        let names: Vec<_> = decode_dir(&dir).unwrap().iter().map(|o| o.name().to_string()).collect();
        assert_eq!(names, vec!["first", "second"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_directory_is_io_error() {
        assert!(matches!(decode_dir("/no/such/dir/mcpfix"), Err(Error::Io { .. })));
    }
}
