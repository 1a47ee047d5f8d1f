//! Inbound request parsing.

use std::io::Read;
use std::sync::Arc;

use may_minihttp::Request;
use tracing::debug;

use crate::dispatcher::HeaderVec;

/// Parsed HTTP request data used by [`super::AppService`].
#[derive(Debug)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, ...).
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// HTTP headers with lowercase names.
    pub headers: HeaderVec,
    /// Query pairs in wire order; repeated keys are preserved.
    pub query: Vec<(String, String)>,
    /// Raw body text, `None` when empty.
    pub body: Option<String>,
}

impl ParsedRequest {
    /// Header lookup by name (headers are stored lowercase).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse and URL-decode the query string portion of a request path,
/// preserving repeated keys and their order.
#[must_use]
pub fn parse_query(raw_path: &str) -> Vec<(String, String)> {
    match raw_path.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        None => Vec::new(),
    }
}

/// Extract method, path, headers, query pairs and raw body from a
/// `may_minihttp` request.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let raw_path = req.path().to_string();
    let path = raw_path
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                Arc::from(h.name.to_ascii_lowercase().as_str()),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let query = parse_query(&raw_path);

    let body = {
        let mut body_str = String::new();
        match req.body().read_to_string(&mut body_str) {
            Ok(size) if size > 0 => Some(body_str),
            _ => None,
        }
    };

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        query_count = query.len(),
        body_bytes = body.as_ref().map_or(0, String::len),
        "Request parsed"
    );

    ParsedRequest {
        method,
        path,
        headers,
        query,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_preserves_repeats_and_order() {
        let query = parse_query("/p?x=1&y=2&x=3");
        assert_eq!(
            query,
            vec![
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "2".to_string()),
                ("x".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_query_decodes_values() {
        let query = parse_query("/p?check=db%2Ccache");
        assert_eq!(query, vec![("check".to_string(), "db,cache".to_string())]);
    }

    #[test]
    fn test_no_query_string() {
        assert!(parse_query("/p").is_empty());
    }
}
