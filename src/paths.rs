//! Path joining for route assembly.
//!
//! All route paths in the flattened table are built through [`join_paths`] so
//! that prefixes, attach paths and relative segments compose without double
//! slashes or trailing slashes, regardless of how callers wrote them.

/// Join path segments into a single normalized absolute path.
///
/// Each segment is stripped of leading/trailing slashes; empty segments are
/// skipped. The result always starts with `/` and never ends with one.
/// Joining is idempotent: `join_paths(&["/v1/", "/orders/"])` yields
/// `/v1/orders`.
#[must_use]
pub fn join_paths(segments: &[&str]) -> String {
    let mut out = String::new();
    for segment in segments {
        let trimmed = segment.trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(trimmed);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_strips_redundant_slashes() {
        assert_eq!(join_paths(&["/v1/", "/orders/"]), "/v1/orders");
        assert_eq!(join_paths(&["v1", "orders"]), "/v1/orders");
        assert_eq!(join_paths(&["/v1", "orders/"]), "/v1/orders");
    }

    #[test]
    fn test_join_skips_empty_segments() {
        assert_eq!(join_paths(&["", "/v1", "", "orders"]), "/v1/orders");
        assert_eq!(join_paths(&["/", "//"]), "/");
        assert_eq!(join_paths(&[]), "/");
    }

    #[test]
    fn test_join_keeps_inner_structure() {
        assert_eq!(join_paths(&["/v1", "orders/_health"]), "/v1/orders/_health");
    }
}
