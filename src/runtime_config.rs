//! Environment variable based tuning for the coroutine runtime.
//!
//! ## Environment variables
//!
//! - `TRELLIS_STACK_SIZE` — stack size in bytes for handler, probe and
//!   initializer coroutines. Accepts decimal (`32768`) or hex (`0x8000`).
//!   Default: `0x8000` (32 KB).
//! - `TRELLIS_PROBE_TIMEOUT_MS` — default per-run health probe timeout in
//!   milliseconds. Default: 5000.

use std::env;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x8000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

fn parse_size(val: &str) -> Option<usize> {
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

/// Runtime configuration loaded from environment variables.
///
/// Load once at startup with [`RuntimeConfig::from_env`].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for spawned coroutines in bytes.
    pub stack_size: usize,
    /// Default timeout applied to each health probe run.
    pub probe_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let stack_size = env::var("TRELLIS_STACK_SIZE")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let probe_timeout = env::var("TRELLIS_PROBE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS));
        RuntimeConfig {
            stack_size,
            probe_timeout,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }
}
