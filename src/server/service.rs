//! The `may_minihttp` service: route lookup, dispatch and error rendering
//! for everything that never reaches a handler (unknown paths, bad methods,
//! dead handler coroutines).

use std::io;
use std::sync::Arc;

use http::Method;
use may_minihttp::{HttpService, Request, Response};

use super::request::parse_request;
use super::response::write_response;
use crate::context::ApiContext;
use crate::dispatcher::Dispatcher;
use crate::error::ApiError;
use crate::ids::RequestId;
use crate::router::Router;

/// HTTP service wrapping the assembled router and dispatcher.
///
/// Cloned per connection by the server; all state is shared through `Arc`.
#[derive(Clone)]
pub struct AppService {
    router: Arc<Router>,
    dispatcher: Arc<Dispatcher>,
    context: Arc<ApiContext>,
    default_headers: Arc<Vec<&'static str>>,
}

impl AppService {
    #[must_use]
    pub fn new(router: Arc<Router>, dispatcher: Arc<Dispatcher>, context: Arc<ApiContext>) -> Self {
        // The process-wide headers never change; leak the lines once.
        let default_headers = vec![
            leak_line("Api", context.name()),
            leak_line("Api-Version", context.version()),
            leak_line("Server", context.server()),
        ];
        Self {
            router,
            dispatcher,
            context,
            default_headers: Arc::new(default_headers),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ApiContext> {
        &self.context
    }

    fn write_error(&self, res: &mut Response, request_id: RequestId, err: &ApiError) {
        write_response(
            res,
            err.status(),
            &self.default_headers,
            request_id,
            &crate::dispatcher::HeaderVec::new(),
            Some(&err.body()),
        );
    }
}

fn leak_line(name: &str, value: &str) -> &'static str {
    Box::leak(format!("{name}: {value}").into_boxed_str())
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = parse_request(req);
        let request_id = RequestId::from_header_or_new(parsed.header("request-id"));

        let method: Method = match parsed.method.parse() {
            Ok(method) => method,
            Err(_) => {
                self.write_error(res, request_id, &ApiError::new(405));
                return Ok(());
            }
        };

        if self.router.route(&parsed.path).is_none() {
            self.write_error(res, request_id, &ApiError::new(404));
            return Ok(());
        }

        let response = self.dispatcher.dispatch(
            &parsed.path,
            request_id,
            method,
            parsed.query,
            parsed.headers,
            parsed.body,
        );

        match response {
            Some(handler_response) => {
                write_response(
                    res,
                    handler_response.status,
                    &self.default_headers,
                    request_id,
                    &handler_response.headers,
                    handler_response.body.as_ref(),
                );
            }
            None => {
                self.write_error(res, request_id, &ApiError::new(500));
            }
        }
        Ok(())
    }
}
