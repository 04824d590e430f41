//! Ordered setup stages with a best-effort teardown list.
//!
//! Setup runs stages in registration order and stops at the first failure.
//! Teardown runs every stage exactly once in reverse registration order;
//! failures are logged and collected, never propagated.

use std::fmt;

use futures::future::BoxFuture;
use mcpfix_core::Error;
use tracing::{error, info, warn};

type StageFn<C> = Box<dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, mcpfix_core::Result<()>> + Send + Sync>;

/// A failed stage, by name.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {source}")]
pub struct StageError {
    pub stage: String,
    #[source]
    pub source: Error,
}

/// Outcome of a teardown pass.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Stage names in the order they ran.
    pub ran: Vec<String>,
    pub errors: Vec<StageError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool { self.errors.is_empty() }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} teardown stage(s), {} failed", self.ran.len(), self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  {}", e)?;
        }
        Ok(())
    }
}

/// Setup and teardown stage lists over a mutable context `C`.
///
/// Stages are closures returning a boxed future borrowing the context:
///
/// ```ignore
/// Orchestrator::new()
///     .setup("create namespace", |env| Box::pin(async move { env.create_namespace().await }))
///     .finish("destroy cluster", |env| Box::pin(async move { env.destroy().await }))
/// ```
pub struct Orchestrator<C> {
    setup: Vec<(String, StageFn<C>)>,
    teardown: Vec<(String, StageFn<C>)>,
}

impl<C> Default for Orchestrator<C> {
    fn default() -> Self { Self { setup: Vec::new(), teardown: Vec::new() } }
}

impl<C: Send> Orchestrator<C> {
    pub fn new() -> Self { Self::default() }

    /// Append a setup stage.
    pub fn setup<F>(mut self, name: impl Into<String>, stage: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, mcpfix_core::Result<()>> + Send + Sync + 'static,
    {
        self.setup.push((name.into(), Box::new(stage)));
        self
    }

    /// Append a teardown stage. Teardown runs last-registered first.
    pub fn finish<F>(mut self, name: impl Into<String>, stage: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, mcpfix_core::Result<()>> + Send + Sync + 'static,
    {
        self.teardown.push((name.into(), Box::new(stage)));
        self
    }

    pub fn setup_stages(&self) -> Vec<&str> { self.setup.iter().map(|(n, _)| n.as_str()).collect() }

    /// Teardown stage names in execution order.
    pub fn teardown_stages(&self) -> Vec<&str> { self.teardown.iter().rev().map(|(n, _)| n.as_str()).collect() }

    pub async fn run_setup(&self, ctx: &mut C) -> Result<(), StageError> {
        for (i, (name, stage)) in self.setup.iter().enumerate() {
            info!(stage = %name, step = i + 1, of = self.setup.len(), "setup");
            if let Err(source) = stage(ctx).await {
                error!(stage = %name, error = %source, "setup stage failed");
                return Err(StageError { stage: name.clone(), source });
            }
        }
        info!("setup complete");
        Ok(())
    }

    pub async fn run_teardown(&self, ctx: &mut C) -> TeardownReport {
        let mut report = TeardownReport::default();
        for (name, stage) in self.teardown.iter().rev() {
            info!(stage = %name, "teardown");
            report.ran.push(name.clone());
            if let Err(source) = stage(ctx).await {
                error!(stage = %name, error = %source, "teardown stage failed");
                report.errors.push(StageError { stage: name.clone(), source });
            }
        }
        if !report.is_clean() {
            warn!(failed = report.errors.len(), "teardown finished with errors");
        }
        report
    }

    /// Setup, then `body` if setup succeeded, then teardown regardless.
    ///
    /// A setup failure wins over the body's result. A failing body is reported
    /// as stage `body`.
    pub async fn run<T, F>(&self, ctx: &mut C, body: F) -> Result<T, StageError>
    where
        F: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, mcpfix_core::Result<T>>,
    {
        let outcome = match self.run_setup(ctx).await {
            Ok(()) => body(ctx).await.map_err(|source| StageError { stage: "body".into(), source }),
            Err(e) => Err(e),
        };
        self.run_teardown(ctx).await;
        outcome
    }
}
