//! Health-check endpoint addon.
//!
//! Contributes a `{name}/_health` route to its endpoint. `HEAD` reports only
//! the overall status code (200, or the configured unhealthy status, default
//! 503) with an empty body; `GET` adds the full snapshot JSON, validated
//! against the health response schema. The `check` query parameter is a
//! comma-separated allow-list of probe names.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use http::Method;
use may::sync::mpsc;
use tracing::{error, warn};

use super::{CachedCheck, HealthSnapshot, ProbeFn, ProbeOutcome};
use crate::context::RequestContext;
use crate::endpoint::{Endpoint, EndpointAddon, EndpointHandler, RouteSpec};
use crate::error::ApiError;
use crate::runtime_config::RuntimeConfig;
use crate::validation::schemas;

const DEFAULT_UNHEALTHY_STATUS: u16 = 503;
const DEFAULT_HEALTH_PATH: &str = "{name}/_health";

struct HealthCore {
    endpoint: Weak<Endpoint>,
    checks: Vec<(String, ProbeFn)>,
    timeout: Duration,
    unhealthy_status: u16,
    path: String,
    stack_size: usize,
}

enum Event {
    Settled(usize, ProbeOutcome),
    Deadline,
}

impl HealthCore {
    /// Run the selected probes concurrently and fan their outcomes back in.
    ///
    /// Every selected probe is launched at the same instant under the shared
    /// timeout; a probe that has not settled when the deadline fires is
    /// recorded as timed out. The underlying work of a timed-out probe is
    /// abandoned, not cancelled — probes must be cheap to abandon.
    fn check_health(&self, include: Option<&[String]>) -> Result<HealthSnapshot, ApiError> {
        if self.endpoint.upgrade().is_none() {
            // The owning endpoint is gone; fail cleanly instead of probing
            // on behalf of a detached addon.
            return Err(ApiError::new(500).with_message("endpoint is no longer available"));
        }

        let selected: Vec<(String, ProbeFn)> = self
            .checks
            .iter()
            .filter(|(name, _)| include.map_or(true, |allow| allow.iter().any(|a| a == name)))
            .map(|(name, probe)| (name.clone(), Arc::clone(probe)))
            .collect();

        let mut snapshot = HealthSnapshot::default();
        if selected.is_empty() {
            return Ok(snapshot);
        }

        let (tx, rx) = mpsc::channel::<Event>();
        for (slot, (name, probe)) in selected.iter().enumerate() {
            let tx = tx.clone();
            let probe = Arc::clone(probe);
            let probe_name = name.clone();
            // SAFETY: spawning is unsafe in the may runtime; the probe
            // coroutine owns its captures and reports over the channel.
            let spawned = unsafe {
                may::coroutine::Builder::new()
                    .stack_size(self.stack_size)
                    .spawn(move || {
                        let outcome = match catch_unwind(AssertUnwindSafe(|| probe())) {
                            Ok(Ok(())) => ProbeOutcome::Ok,
                            Ok(Err(err)) => ProbeOutcome::from(err),
                            Err(panic) => {
                                error!(probe = %probe_name, panic_message = ?panic, "Probe panicked");
                                ProbeOutcome::Failed {
                                    reason: Some("panic".to_string()),
                                    exception: Some(format!("{panic:?}")),
                                }
                            }
                        };
                        let _ = tx.send(Event::Settled(slot, outcome));
                    })
            };
            if let Err(err) = spawned {
                error!(probe = %name, error = %err, "Failed to spawn probe coroutine");
            }
        }
        let timeout = self.timeout;
        may::go!(move || {
            may::coroutine::sleep(timeout);
            let _ = tx.send(Event::Deadline);
        });

        let total = selected.len();
        let mut outcomes: Vec<Option<ProbeOutcome>> = vec![None; total];
        let mut settled = 0;
        while settled < total {
            match rx.recv() {
                Ok(Event::Settled(slot, outcome)) => {
                    if outcomes[slot].is_none() {
                        outcomes[slot] = Some(outcome);
                        settled += 1;
                    }
                }
                Ok(Event::Deadline) | Err(_) => break,
            }
        }

        for ((name, _), outcome) in selected.iter().zip(outcomes) {
            if outcome.is_none() {
                warn!(probe = %name, timeout_ms = self.timeout.as_millis() as u64, "Probe timed out");
            }
            snapshot.record(name.clone(), outcome.unwrap_or(ProbeOutcome::TimedOut));
        }
        Ok(snapshot)
    }
}

/// Reusable health-check addon; attach one per endpoint via
/// [`Endpoint::add_addon`].
pub struct HealthAddon {
    core: Arc<HealthCore>,
}

impl HealthAddon {
    pub const KIND: &'static str = "health";

    /// Start building an addon around the owning endpoint's weak handle.
    #[must_use]
    pub fn builder(endpoint: Weak<Endpoint>) -> HealthAddonBuilder {
        HealthAddonBuilder {
            endpoint,
            checks: Vec::new(),
            timeout: RuntimeConfig::from_env().probe_timeout,
            unhealthy_status: DEFAULT_UNHEALTHY_STATUS,
            path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }

    /// Run the named probes (all when `include` is absent).
    pub fn check_health(&self, include: Option<&[String]>) -> Result<HealthSnapshot, ApiError> {
        self.core.check_health(include)
    }

    #[must_use]
    pub fn unhealthy_status(&self) -> u16 {
        self.core.unhealthy_status
    }
}

impl EndpointAddon for HealthAddon {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn routes(&self) -> Vec<RouteSpec> {
        vec![RouteSpec::new(
            self.core.path.clone(),
            "{name}_health",
            HealthHandler {
                core: Arc::clone(&self.core),
            },
        )
        .with_response_schema(schemas::health_validator())]
    }
}

/// Builder for [`HealthAddon`].
pub struct HealthAddonBuilder {
    endpoint: Weak<Endpoint>,
    checks: Vec<(String, ProbeFn)>,
    timeout: Duration,
    unhealthy_status: u16,
    path: String,
}

impl HealthAddonBuilder {
    /// Register a named probe.
    #[must_use]
    pub fn check(mut self, name: impl Into<String>, probe: ProbeFn) -> Self {
        self.checks.push((name.into(), probe));
        self
    }

    /// Register a named probe whose outcome is cached for `ttl`.
    #[must_use]
    pub fn cached_check(self, name: impl Into<String>, ttl: Duration, probe: ProbeFn) -> Self {
        self.check(name, CachedCheck::wrap(ttl, probe))
    }

    /// Per-run probe timeout (default from `TRELLIS_PROBE_TIMEOUT_MS`).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Status code reported when any probe is not ok (default 503).
    #[must_use]
    pub fn unhealthy_status(mut self, status: u16) -> Self {
        self.unhealthy_status = status.clamp(100, 599);
        self
    }

    /// Route path template (default `{name}/_health`).
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn build(self) -> HealthAddon {
        HealthAddon {
            core: Arc::new(HealthCore {
                endpoint: self.endpoint,
                checks: self.checks,
                timeout: self.timeout,
                unhealthy_status: self.unhealthy_status,
                path: self.path,
                stack_size: RuntimeConfig::from_env().stack_size,
            }),
        }
    }
}

struct HealthHandler {
    core: Arc<HealthCore>,
}

impl EndpointHandler for HealthHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let params = ctx.params(&schemas::health_params_validator())?;
        let include: Option<Vec<String>> = params.get("check").and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        });

        let snapshot = self.core.check_health(include.as_deref())?;
        if !snapshot.ok() {
            ctx.set_status(self.core.unhealthy_status);
        }
        if *ctx.method() == Method::GET {
            ctx.write_json(snapshot.as_json());
        } else if *ctx.method() != Method::HEAD {
            return Err(ApiError::new(405));
        }
        Ok(())
    }
}
