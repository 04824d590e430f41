//! Error taxonomy shared by every mcpfix crate.

use std::path::PathBuf;
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures reported by an object client backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool { matches!(self, ClientError::NotFound(_)) }
    pub fn is_already_exists(&self) -> bool { matches!(self, ClientError::AlreadyExists(_)) }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated action starting at byte {offset}")]
    Unterminated { offset: usize },
    #[error("unsupported action {{{{{action}}}}} (only {{{{.Field}}}} is supported)")]
    UnsupportedAction { action: String },
    #[error("empty field path at byte {offset}")]
    EmptyPath { offset: usize },
    #[error("missing field .{field}")]
    MissingField { field: String },
    #[error("template data must serialize to a map")]
    NotAMap,
    #[error("serializing template data: {0}")]
    Data(String),
    #[error("rendering template: {0}")]
    Render(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest payload too large (>{limit} bytes)")]
    TooLarge { limit: usize },
    #[error("manifest document too complex (>{limit} nodes)")]
    TooComplex { limit: usize },
    #[error("parsing manifest: {0}")]
    Parse(String),
    #[error("manifest is not a mapping")]
    NotAnObject,
    #[error("manifest missing {0}")]
    Missing(&'static str),
    #[error("expected exactly one object in manifest, found {0}")]
    ExpectedOne(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("create {object} rejected: {source}")]
    Apply { object: String, #[source] source: ClientError },
    #[error("{object}: {source}")]
    Client { object: String, #[source] source: ClientError },
    #[error("timed out after {timeout:?} waiting for {object} ({predicate}); last observed: {observed}")]
    Timeout { object: String, predicate: String, observed: String, timeout: Duration },
    #[error("{object}: malformed status: {reason}")]
    Malformed { object: String, reason: String },
    #[error("no cluster found with prefix {prefix} (known: {})", .known.join(", "))]
    Resolution { prefix: String, known: Vec<String> },
    #[error("{op} {cluster} failed: {message}")]
    Lifecycle { op: &'static str, cluster: String, message: String },
    #[error("reading {}: {source}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

impl Error {
    pub fn client(object: impl ToString, source: ClientError) -> Self {
        Error::Client { object: object.to_string(), source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    /// True when the underlying client reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Client { source, .. } | Error::Apply { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool { matches!(self, Error::Timeout { .. }) }
}

/// Maps "not found" to success; every other outcome is returned unchanged.
pub fn ignore_not_found<T: Default>(res: Result<T, ClientError>) -> Result<T, ClientError> {
    match res {
        Err(e) if e.is_not_found() => Ok(T::default()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_not_found_only_swallows_not_found() {
        assert!(ignore_not_found::<()>(Err(ClientError::NotFound("x".into()))).is_ok());
        let err = ignore_not_found::<()>(Err(ClientError::Api { code: 500, message: "boom".into() }));
        assert!(matches!(err, Err(ClientError::Api { code: 500, .. })));
    }

    #[test]
    fn messages_carry_identity() {
        let e = Error::Timeout {
            object: "(v1/ConfigMap) default/x".into(),
            predicate: "condition Ready=True".into(),
            observed: "Ready=False".into(),
            timeout: Duration::from_secs(3),
        };
        let s = e.to_string();
        assert!(s.contains("default/x") && s.contains("Ready=True") && s.contains("Ready=False"), "{s}");
        assert!(e.is_timeout());

        let r = Error::Resolution { prefix: "mcp".into(), known: vec!["platform-1".into()] };
        assert_eq!(r.to_string(), "no cluster found with prefix mcp (known: platform-1)");
    }

    #[test]
    fn template_errors_render_braces() {
        let e = TemplateError::UnsupportedAction { action: "if .X".into() };
        assert_eq!(e.to_string(), "unsupported action {{if .X}} (only {{.Field}} is supported)");
    }
}
