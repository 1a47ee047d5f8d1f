//! Custom format checkers registered with every compiled schema.

use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(\d+Y)?(\d+M)?(\d+W)?(\d+D)?(?:T(\d+H)?(\d+M)?(\d+(?:\.\d+)?S)?)?$")
        .expect("duration regex")
});

/// Validate an ISO-8601-like duration string such as `P1DT2H30M` or `PT5S`.
///
/// At least one component is required (`P` and `P1DT` are rejected).
pub fn is_duration(value: &str) -> bool {
    if value.ends_with('T') {
        return false;
    }
    match DURATION_RE.captures(value) {
        Some(caps) => caps.iter().skip(1).any(|c| c.is_some()),
        None => false,
    }
}
