//! mcpfix conditions: poll a live object until a [`Condition`] holds or the deadline passes.
//!
//! "Not found" while polling means "not yet"; any other read failure aborts the
//! wait. Every iteration logs the object, the predicate and what was observed.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use mcpfix_core::{Condition, Error, ObjectRef, Observation, Result, WaitOptions};
use mcpfix_kubehub::ClusterConfig;
use metrics::{counter, histogram};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Run `check` every `opts.interval` until it reports satisfied.
///
/// Returns [`Error::Timeout`] once `opts.timeout` has elapsed without success:
/// never before the deadline, and at most one interval after it. A check still
/// in flight at the deadline is abandoned.
pub async fn poll<F, Fut>(opts: &WaitOptions, object: &str, predicate: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation>>,
{
    let started = Instant::now();
    let deadline = started.checked_add(opts.timeout).unwrap_or_else(|| far_future(started));
    let interval = opts.interval.max(Duration::from_millis(1));
    let timed_out = |observed: String| {
        counter!("wait_timeout_total", 1u64);
        Error::Timeout { object: object.to_string(), predicate: predicate.to_string(), observed, timeout: opts.timeout }
    };
    let mut last = String::from("<not observed>");
    loop {
        let obs = match timeout_at(deadline, check()).await {
            Ok(obs) => obs?,
            Err(_) => {
                warn!(object = %object, predicate = %predicate, "check still running at deadline");
                return Err(timed_out(last));
            }
        };
        info!(object = %object, predicate = %predicate, observed = %obs.observed, satisfied = obs.satisfied, "waiting");
        if obs.satisfied {
            histogram!("wait_duration_ms", started.elapsed().as_secs_f64() * 1000.0);
            counter!("wait_ok_total", 1u64);
            return Ok(());
        }
        last = obs.observed;
        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(last));
        }
        sleep(interval.min(deadline - now)).await;
    }
}

// Deadlines past what `Instant` can represent are clamped to roughly thirty years out.
fn far_future(from: Instant) -> Instant {
    [86_400 * 365 * 30, 86_400 * 365, 86_400]
        .into_iter()
        .find_map(|secs| from.checked_add(Duration::from_secs(secs)))
        .unwrap_or(from)
}

/// Fetch `obj` once and evaluate `cond` against it. A missing object is "not satisfied".
pub async fn observe(cfg: &ClusterConfig, obj: &ObjectRef, cond: &Condition) -> Result<Observation> {
    match cfg.client().get(obj).await {
        Ok(live) => cond.evaluate(&live),
        Err(e) if e.is_not_found() => Ok(Observation { satisfied: false, observed: "<not found>".into() }),
        Err(e) => Err(Error::client(obj, e)),
    }
}

/// Block until `cond` holds on `obj`.
pub async fn wait_for(cfg: &ClusterConfig, obj: &ObjectRef, cond: &Condition, opts: &WaitOptions) -> Result<()> {
    let object = obj.to_string();
    let predicate = cond.to_string();
    poll(opts, &object, &predicate, || observe(cfg, obj, cond)).await?;
    info!(object = %object, predicate = %predicate, "condition satisfied");
    Ok(())
}

/// Block until every object in `objs` exists (existence only, not readiness).
pub async fn wait_present(cfg: &ClusterConfig, objs: &[ObjectRef], opts: &WaitOptions) -> Result<()> {
    let object = format!("{} object(s)", objs.len());
    poll(opts, &object, "present", || async {
        let mut missing = Vec::new();
        for obj in objs {
            match cfg.client().get(obj).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => missing.push(obj.to_string()),
                Err(e) => return Err(Error::client(obj, e)),
            }
        }
        debug!(missing = missing.len(), "presence check");
        Ok(if missing.is_empty() {
            Observation { satisfied: true, observed: "all present".into() }
        } else {
            Observation { satisfied: false, observed: format!("missing: {}", missing.join(", ")) }
        })
    })
    .await
}

/// Block until `obj` can no longer be fetched.
pub async fn wait_absent(cfg: &ClusterConfig, obj: &ObjectRef, opts: &WaitOptions) -> Result<()> {
    let object = obj.to_string();
    poll(opts, &object, "deleted", || async {
        match cfg.client().get(obj).await {
            Ok(_) => Ok(Observation { satisfied: false, observed: "still present".into() }),
            Err(e) if e.is_not_found() => Ok(Observation { satisfied: true, observed: "<not found>".into() }),
            Err(e) => Err(Error::client(obj, e)),
        }
    })
    .await
}
