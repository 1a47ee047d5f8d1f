//! HTTP server glue: request parsing, response writing and the
//! `may_minihttp` service around the assembled router and dispatcher.

mod http_server;
mod request;
mod response;
mod service;

pub use http_server::{ApiServer, ServerHandle};
pub use request::{parse_query, parse_request, ParsedRequest};
pub use response::write_response;
pub use service::AppService;
