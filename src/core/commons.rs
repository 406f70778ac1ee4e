// src/core/commons.rs

use crate::{CancellationToken, core::service::ExecutionError};
use std::sync::atomic::Ordering;

/// Wraps a string in quotes, escaping internal quotes.
pub fn wrap_value(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Returns `Err(ExecutionError::Cancelled)` once the token has been tripped.
pub fn check_for_cancellation(cancellation_token: &CancellationToken) -> Result<(), ExecutionError> {
    if cancellation_token.load(Ordering::Relaxed) {
        log::debug!("Cancellation requested, stopping the invocation.");
        return Err(ExecutionError::Cancelled);
    }
    Ok(())
}
