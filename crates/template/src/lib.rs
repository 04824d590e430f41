//! mcpfix templates: `{{.Field}}` substitution over a serializable data context,
//! plus decoding of rendered manifests into [`ManagedObject`]s.
//!
//! Field actions are translated into minijinja subscript expressions and rendered
//! with strict undefined handling; any other action is rejected up front.

#![forbid(unsafe_code)]

use std::path::Path;

use mcpfix_core::{Error, TemplateError};
use minijinja::value::ValueKind;
use minijinja::{context, Environment, ErrorKind, Output, State, UndefinedBehavior, Value};
use serde::Serialize;
use serde_json::Value as Json;

mod manifest;

pub use manifest::{decode_all, decode_dir, decode_one, manifest_files};
pub use mcpfix_core::ManagedObject;

/// Render `template` against `data`.
///
/// `data` must serialize to a map; placeholders name its keys, with dots
/// walking into nested maps (`{{.Operator.Image}}`). Nothing is returned
/// unless every placeholder resolves.
pub fn render<T: Serialize + ?Sized>(template: &str, data: &T) -> Result<String, TemplateError> {
    let ctx = serde_json::to_value(data).map_err(|e| TemplateError::Data(e.to_string()))?;
    if !ctx.is_object() {
        return Err(TemplateError::NotAMap);
    }
    let (source, paths) = translate(template)?;
    environment()
        .render_str(&source, context! { fields => Value::from_serialize(&ctx) })
        .map_err(|e| render_error(e, &ctx, &paths))
}

/// Read a template from disk and [`render`] it.
pub fn render_file<T: Serialize + ?Sized>(path: impl AsRef<Path>, data: &T) -> Result<String, Error> {
    let path = path.as_ref();
    let template = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    tracing::debug!(path = %path.display(), "rendering template file");
    Ok(render(&template, data)?)
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_formatter(format_value);
    env
}

/// Rewrite `{{ .A.B }}` into `{{ fields["A"]["B"] }}`, returning the source and
/// the field paths in order of appearance.
fn translate(template: &str) -> Result<(String, Vec<String>), TemplateError> {
    let mut source = String::with_capacity(template.len() + 32);
    let mut paths = Vec::new();
    let mut rest = template;
    let mut offset = 0usize;
    while let Some(start) = rest.find("{{") {
        push_literal(&mut source, &rest[..start]);
        let body = &rest[start + 2..];
        let end = body.find("}}").ok_or(TemplateError::Unterminated { offset: offset + start })?;
        let action = body[..end].trim();
        let path = action
            .strip_prefix('.')
            .ok_or_else(|| TemplateError::UnsupportedAction { action: action.to_string() })?;
        if path.is_empty() {
            return Err(TemplateError::EmptyPath { offset: offset + start });
        }
        source.push_str("{{ fields");
        for seg in path.split('.') {
            if seg.is_empty() || !seg.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                return Err(TemplateError::UnsupportedAction { action: action.to_string() });
            }
            source.push_str("[\"");
            source.push_str(seg);
            source.push_str("\"]");
        }
        source.push_str(" }}");
        paths.push(path.to_string());
        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    push_literal(&mut source, rest);
    Ok((source, paths))
}

// Block and comment openers in plain text are emitted as string expressions.
fn push_literal(source: &mut String, text: &str) {
    source.push_str(&text.replace("{%", "{{ \"{%\" }}").replace("{#", "{{ \"{#\" }}"));
}

fn format_value(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), minijinja::Error> {
    match value.kind() {
        ValueKind::Undefined => Err(ErrorKind::UndefinedError.into()),
        ValueKind::None => Ok(()),
        // Flow-style JSON is valid YAML, so nested values stay usable in manifests.
        ValueKind::Seq | ValueKind::Map => {
            let json = serde_json::to_string(value).map_err(|e| minijinja::Error::new(ErrorKind::BadSerialization, e.to_string()))?;
            out.write_str(&json).map_err(|_| ErrorKind::WriteFailure.into())
        }
        _ => minijinja::escape_formatter(out, state, value),
    }
}

fn render_error(err: minijinja::Error, ctx: &Json, paths: &[String]) -> TemplateError {
    if err.kind() == ErrorKind::UndefinedError {
        if let Some(field) = paths.iter().find(|p| lookup(ctx, p).is_none()) {
            return TemplateError::MissingField { field: field.clone() };
        }
    }
    TemplateError::Render(err.to_string())
}

fn lookup<'a>(ctx: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(ctx, |cur, seg| cur.as_object()?.get(seg))
}
