// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Panic containment for codec calls and task bodies.

use crate::error::{BatchError, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Run `f`, converting a panic into `BatchError::InternalPanic`.
///
/// `context` names the call site in the trace (e.g. `"decode:image"`).
/// The closure's own errors pass through untouched.
pub fn run_with_panic_policy<T, F>(context: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(context, panic = %message, "panic caught");
            Err(BatchError::internal_panic(message))
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
