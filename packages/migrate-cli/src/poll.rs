//! Environment readiness polling
//!
//! One fixed-interval retry loop with two exhaustion policies. An
//! infrastructure health check that never comes up degrades to a warning and
//! lets the run continue; a content check that never sees data is fatal,
//! because every later phase depends on it. The asymmetry is deliberate and
//! is kept as two explicit policies rather than one generic helper.

use std::future::Future;

use crate::config::RetryPolicy;
use crate::error::MigrateError;

/// What exhaustion of the retry budget means for a given check.
#[derive(Debug, Clone, Copy)]
pub enum OnExhausted {
    /// Health check: log and carry on, returning `false`.
    Degrade,
    /// Content verification: the named data never appeared, abort the run.
    Fail(&'static str),
}

/// Sleep, probe, repeat. Returns `Ok(true)` the moment the probe reports
/// ready; performs exactly `max_attempts + 1` probe invocations before
/// giving up. Probe errors propagate immediately.
pub async fn wait_until_ready<F, Fut>(
    what: &str,
    policy: RetryPolicy,
    on_exhausted: OnExhausted,
    mut probe: F,
) -> Result<bool, MigrateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, MigrateError>>,
{
    let budget = policy.max_attempts + 1;
    tracing::info!(
        what,
        interval_secs = policy.interval.as_secs(),
        attempts = budget,
        "waiting for readiness"
    );

    for attempt in 1..=budget {
        tokio::time::sleep(policy.interval).await;
        match probe().await {
            Ok(true) => {
                tracing::info!(what, attempt, "ready");
                return Ok(true);
            }
            Ok(false) => tracing::info!(what, attempt, of = budget, "not ready yet"),
            Err(err) => return Err(err),
        }
    }

    match on_exhausted {
        OnExhausted::Degrade => {
            tracing::warn!(what, "never became ready, continuing anyway");
            Ok(false)
        }
        OnExhausted::Fail(data) => Err(MigrateError::DataNotPresent(data.to_string())),
    }
}
