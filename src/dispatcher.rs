//! Coroutine-based request dispatch.
//!
//! Every flattened route gets its own handler coroutine fed through an MPSC
//! channel; dispatching sends the parsed request over the channel and parks
//! the caller on the reply channel. The dispatch boundary is also where the
//! error-translation contract lives: an `ApiError` from the handler renders
//! as the uniform JSON error body, a response-schema violation becomes a
//! logged 500, and a panicking handler becomes a detail-free 500.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use may::sync::mpsc;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, error, info};

use crate::api::Route;
use crate::context::{ApiContext, RequestContext};
use crate::error::ApiError;
use crate::ids::RequestId;

/// Maximum inline headers before heap allocation; most requests carry fewer.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the request hot path.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request data passed to a handler coroutine, including the reply channel
/// the handler's response comes back on.
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    /// Raw query pairs in wire order; multi-valued keys are preserved.
    pub query: Vec<(String, String)>,
    pub headers: HeaderVec,
    /// Raw body text; `None` when the request carried no body.
    pub body: Option<String>,
    pub reply_tx: mpsc::Sender<HandlerResponse>,
}

/// Response data sent back from a handler coroutine.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: HeaderVec,
    /// JSON body; `None` renders as an empty body (HEAD, 204).
    pub body: Option<Value>,
}

impl HandlerResponse {
    /// Render an [`ApiError`] as the uniform error body.
    #[must_use]
    pub fn from_api_error(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            headers: HeaderVec::new(),
            body: Some(err.body()),
        }
    }
}

type HandlerSender = mpsc::Sender<HandlerRequest>;

/// Routes inbound requests to the per-route handler coroutines.
///
/// Registration happens once at assembly; after that the dispatcher is
/// read-only and shared across connections.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, HandlerSender>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Spawn the handler coroutine for a flattened route.
    ///
    /// The coroutine loops over its channel, builds a [`RequestContext`] per
    /// request, invokes the handler with panic recovery and applies the
    /// route's response schema before replying.
    pub fn register_route(&mut self, route: &Route, context: Arc<ApiContext>, stack_size: usize) {
        let (tx, rx) = mpsc::channel::<HandlerRequest>();
        let handler = route.handler.clone();
        let handler_name = route.handler_name.clone();
        let response_schema = route.response_schema.clone();
        let init = route.init.clone();
        let log_name = handler_name.clone();

        // SAFETY: spawning is unsafe in the may runtime; the coroutine owns
        // every captured value and exits when its channel closes.
        let spawned = unsafe {
            may::coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    debug!(handler_name = %handler_name, "Handler coroutine start");
                    for req in rx.iter() {
                        let reply_tx = req.reply_tx.clone();
                        let request_id = req.request_id;
                        let started = Instant::now();

                        let outcome = catch_unwind(AssertUnwindSafe(|| {
                            let mut ctx = RequestContext::new(
                                req.request_id,
                                req.method,
                                req.path,
                                req.query,
                                req.headers,
                                req.body,
                                init.clone(),
                                Arc::clone(&context),
                            );
                            match handler.handle(&mut ctx) {
                                Ok(()) => {
                                    let response = ctx.into_response();
                                    validate_response(
                                        response,
                                        response_schema.as_deref(),
                                        &handler_name,
                                        request_id,
                                    )
                                }
                                Err(err) => {
                                    debug!(
                                        request_id = %request_id,
                                        handler_name = %handler_name,
                                        status = err.status(),
                                        "Handler returned error"
                                    );
                                    HandlerResponse::from_api_error(&err)
                                }
                            }
                        }));

                        let response = match outcome {
                            Ok(response) => response,
                            Err(panic) => {
                                error!(
                                    request_id = %request_id,
                                    handler_name = %handler_name,
                                    panic_message = ?panic,
                                    "Handler panicked"
                                );
                                // Detail stays server-side; the client gets a bare 500.
                                HandlerResponse::from_api_error(&ApiError::new(500))
                            }
                        };

                        info!(
                            request_id = %request_id,
                            handler_name = %handler_name,
                            status = response.status,
                            latency_ms = started.elapsed().as_millis() as u64,
                            "Handler settled"
                        );
                        let _ = reply_tx.send(response);
                    }
                })
        };

        if let Err(err) = spawned {
            error!(handler_name = %log_name, error = %err, "Failed to spawn handler coroutine");
            return;
        }
        self.handlers.insert(route.path.clone(), tx);
    }

    /// Dispatch a parsed request to the handler registered at `path`.
    ///
    /// Returns `None` when no handler is registered; a handler whose channel
    /// has closed yields a 503.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &self,
        path: &str,
        request_id: RequestId,
        method: Method,
        query: Vec<(String, String)>,
        headers: HeaderVec,
        body: Option<String>,
    ) -> Option<HandlerResponse> {
        let tx = self.handlers.get(path)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = HandlerRequest {
            request_id,
            method,
            path: path.to_string(),
            query,
            headers,
            body,
            reply_tx,
        };
        if tx.send(request).is_err() {
            error!(path = %path, "Handler channel closed before send");
            return Some(HandlerResponse::from_api_error(
                &ApiError::new(503).with_message("handler is not responding"),
            ));
        }
        match reply_rx.recv() {
            Ok(response) => Some(response),
            Err(_) => {
                error!(path = %path, "Handler channel closed while waiting for reply");
                Some(HandlerResponse::from_api_error(
                    &ApiError::new(503).with_message("handler is not responding"),
                ))
            }
        }
    }
}

/// Apply the route's declared response schema to the handler's body.
///
/// A violating body is never written to the client; it is logged and the
/// client receives a bare 500, signaling a programming defect without
/// leaking internal state.
fn validate_response(
    response: HandlerResponse,
    schema: Option<&crate::validation::SchemaValidator>,
    handler_name: &str,
    request_id: RequestId,
) -> HandlerResponse {
    let (Some(schema), Some(body)) = (schema, &response.body) else {
        return response;
    };
    match schema.validate(body) {
        Ok(()) => response,
        Err(violation) => {
            error!(
                request_id = %request_id,
                handler_name = %handler_name,
                path = %violation.path,
                message = %violation.message,
                "Response failed its declared schema"
            );
            HandlerResponse::from_api_error(&ApiError::new(500))
        }
    }
}
