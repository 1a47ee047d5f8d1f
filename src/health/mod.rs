//! Health probe outcomes, aggregation and caching.
//!
//! A probe is a named function returning `Ok(())` or a [`HealthError`].
//! Probes run concurrently on coroutines under a shared per-run timeout;
//! outcomes aggregate into a [`HealthSnapshot`] keyed by probe name, so the
//! result is independent of completion order. A probe wrapped in
//! [`CachedCheck`] reuses its last outcome until the TTL elapses, trading
//! freshness for protection of expensive or rate-limited downstream checks.

mod addon;

pub use addon::{HealthAddon, HealthAddonBuilder};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

/// Designated health-check failure. Never propagates past the aggregation
/// engine; it only shapes the probe's entry in the snapshot.
#[derive(Debug, Clone)]
pub struct HealthError {
    reason: Option<String>,
    exception: Option<String>,
}

impl HealthError {
    /// Fail with a human-readable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            exception: None,
        }
    }

    /// Fail because of an underlying error, capturing its text.
    #[must_use]
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            reason: Some("exception".to_string()),
            exception: Some(err.to_string()),
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl std::fmt::Display for HealthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.reason, &self.exception) {
            (Some(reason), Some(exception)) => write!(f, "{reason}: {exception}"),
            (Some(reason), None) => write!(f, "{reason}"),
            (None, Some(exception)) => write!(f, "{exception}"),
            (None, None) => write!(f, "health check failed"),
        }
    }
}

impl std::error::Error for HealthError {}

/// A single named health probe.
pub type ProbeFn = Arc<dyn Fn() -> Result<(), HealthError> + Send + Sync>;

/// Settled state of one probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    Failed {
        reason: Option<String>,
        exception: Option<String>,
    },
    TimedOut,
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Ok)
    }
}

impl From<HealthError> for ProbeOutcome {
    fn from(err: HealthError) -> Self {
        ProbeOutcome::Failed {
            reason: err.reason,
            exception: err.exception,
        }
    }
}

/// Aggregate result of one health-check invocation: a mapping from probe
/// name to its outcome. Overall status is ok iff every probe is ok.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    results: BTreeMap<String, ProbeOutcome>,
}

impl HealthSnapshot {
    pub(crate) fn record(&mut self, name: impl Into<String>, outcome: ProbeOutcome) {
        self.results.insert(name.into(), outcome);
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.results.values().all(ProbeOutcome::is_ok)
    }

    #[must_use]
    pub fn results(&self) -> &BTreeMap<String, ProbeOutcome> {
        &self.results
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&ProbeOutcome> {
        self.results.get(name)
    }

    /// Render the snapshot body:
    /// `{"ok": bool, "ok_as_string": "yes"|"no", "errors": [...]}` with one
    /// entry per non-ok probe.
    #[must_use]
    pub fn as_json(&self) -> Value {
        let errors: Vec<Value> = self
            .results
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                ProbeOutcome::Ok => None,
                ProbeOutcome::Failed { reason, exception } => Some(json!({
                    "source": name,
                    "reason": reason,
                    "exception": exception,
                })),
                ProbeOutcome::TimedOut => Some(json!({
                    "source": name,
                    "reason": "timed out",
                    "exception": Value::Null,
                })),
            })
            .collect();
        json!({
            "ok": self.ok(),
            "ok_as_string": if self.ok() { "yes" } else { "no" },
            "errors": errors,
        })
    }
}

struct CacheSlot {
    at: Instant,
    result: Result<(), HealthError>,
}

/// TTL cache around a single probe.
///
/// The first invocation runs the underlying check and freezes its outcome
/// (success or the specific failure) until the TTL elapses; the next
/// invocation after expiry re-executes the real check. State is per probe,
/// never shared.
pub struct CachedCheck {
    inner: ProbeFn,
    ttl: Duration,
    slot: Mutex<Option<CacheSlot>>,
}

impl CachedCheck {
    /// Wrap a probe with a TTL cache, yielding a new probe.
    #[must_use]
    pub fn wrap(ttl: Duration, inner: ProbeFn) -> ProbeFn {
        let cache = CachedCheck {
            inner,
            ttl,
            slot: Mutex::new(None),
        };
        Arc::new(move || cache.check())
    }

    fn check(&self) -> Result<(), HealthError> {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(cached) = &*slot {
            if cached.at.elapsed() < self.ttl {
                return cached.result.clone();
            }
        }
        let result = (self.inner)();
        *slot = Some(CacheSlot {
            at: Instant::now(),
            result: result.clone(),
        });
        result
    }
}
