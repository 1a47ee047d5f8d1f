//! Response writing with the process-wide default headers.

use may_minihttp::Response;
use serde_json::Value;

use crate::dispatcher::HeaderVec;
use crate::error::reason_phrase;
use crate::ids::RequestId;

/// Write a response: status line, default headers, per-request correlation
/// id, handler-set headers and the JSON body (omitted when `None`).
///
/// `default_lines` are the fixed process-wide header lines (`Api`,
/// `Api-Version`, `Server`) leaked once at service construction;
/// `may_minihttp::Response::header` borrows `'static`, so per-request values
/// are leaked here.
pub fn write_response(
    res: &mut Response,
    status: u16,
    default_lines: &[&'static str],
    request_id: RequestId,
    extra_headers: &HeaderVec,
    body: Option<&Value>,
) {
    res.status_code(status as usize, reason_phrase(status));
    for line in default_lines {
        res.header(line);
    }
    res.header(leak_header("Request-Id", &request_id.to_string()));

    let mut content_type_set = false;
    for (name, value) in extra_headers {
        if name.eq_ignore_ascii_case("content-type") {
            content_type_set = true;
        }
        res.header(leak_header(name, value));
    }
    if !content_type_set {
        res.header("Content-Type: application/json");
    }

    if let Some(body) = body {
        res.body_vec(serde_json::to_vec(body).unwrap_or_default());
    }
}

/// Build a `'static` header line for a per-request value.
fn leak_header(name: &str, value: &str) -> &'static str {
    Box::leak(format!("{name}: {value}").into_boxed_str())
}
