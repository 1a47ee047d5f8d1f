//! Startup initializer orchestration.
//!
//! Every node in the composition tree (and every endpoint) may register one
//! initializer. They are all launched concurrently on coroutines and the
//! assembly blocks until every one has settled; any failure aborts startup
//! with a construction error.

use std::sync::Arc;
use std::time::Instant;

use may::sync::mpsc;
use tracing::{error, info};

use crate::api::InitFn;
use crate::context::ApiContext;
use crate::error::ConstructionError;

/// Launch all initializers, wait for all, fail on the first reported error.
pub(crate) fn run_all(
    context: &Arc<ApiContext>,
    initializers: Vec<InitFn>,
) -> Result<(), ConstructionError> {
    if initializers.is_empty() {
        return Ok(());
    }
    let total = initializers.len();
    let start = Instant::now();
    let (tx, rx) = mpsc::channel::<Result<(), String>>();

    for init in initializers {
        let tx = tx.clone();
        let ctx = Arc::clone(context);
        may::go!(move || {
            let result = init(ctx).map_err(|err| err.to_string());
            let _ = tx.send(result);
        });
    }
    drop(tx);

    let mut settled = 0;
    let mut first_failure: Option<String> = None;
    while let Ok(result) = rx.recv() {
        settled += 1;
        if let Err(message) = result {
            error!(error = %message, "Initializer failed");
            first_failure.get_or_insert(message);
        }
    }
    // A missing result means an initializer coroutine died without reporting.
    if settled < total && first_failure.is_none() {
        first_failure = Some("initializer panicked".to_string());
    }

    match first_failure {
        Some(message) => Err(ConstructionError::InitFailed(message)),
        None => {
            info!(
                count = total,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Initialized"
            );
            Ok(())
        }
    }
}
