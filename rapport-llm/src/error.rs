//! Oracle error taxonomy and failure-message normalization.
//!
//! The oracle is untrusted: besides failing outright, it can fail with an
//! arbitrarily nested error payload. [`normalize_error_message`] digs a
//! human-readable message out of whatever shape came back, so debug records
//! and logs stay legible.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while calling or interpreting the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// HTTP transport or remote-API failure.
    #[error("Oracle request failed: {0}")]
    Network(String),

    /// Request exceeded its deadline.
    #[error("Oracle request timed out after {0}ms")]
    Timeout(u64),

    /// The call was cancelled by a superseding run or explicit abort.
    /// Clean cancellation, never retried.
    #[error("Oracle call aborted")]
    Aborted,

    /// The oracle returned nothing usable.
    #[error("Oracle returned empty output")]
    EmptyOutput,

    /// Oracle text could not be turned into a usable result.
    #[error("Failed to parse oracle response: {0}")]
    Parse(String),

    /// Every rung of the repair ladder was exhausted.
    #[error("Oracle retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts actually made.
        attempts: u32,
        /// Message from the final failure.
        last_error: String,
    },

    /// Client-side configuration problem.
    #[error("Oracle configuration error: {0}")]
    Config(String),
}

impl OracleError {
    /// Whether this error is a clean cancellation rather than a fault.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, OracleError::Aborted)
    }

    /// Whether the repair ladder should try another rung after this error.
    /// Aborts are final; everything else consumes an attempt and continues.
    #[must_use]
    pub fn is_repairable(&self) -> bool {
        !self.is_abort()
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout(0)
        } else {
            OracleError::Network(err.to_string())
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, OracleError>;

// ---------------------------------------------------------------------------
// Error message normalization
// ---------------------------------------------------------------------------

/// Keys that may carry a human-readable message, in preference order.
const MESSAGE_KEYS: [&str; 6] = [
    "message",
    "error_description",
    "detail",
    "reason",
    "error",
    "code",
];

/// Keys worth descending into when the top level carries no message.
const NEST_KEYS: [&str; 7] = ["error", "data", "body", "response", "meta", "details", "cause"];

/// Extract the first non-empty human-readable message from an arbitrarily
/// nested error payload, walking nested containers up to depth 3.
#[must_use]
pub fn normalize_error_message(payload: &Value) -> Option<String> {
    let mut visited: Vec<*const Value> = Vec::new();
    walk_for_message(payload, 0, &mut visited)
}

fn walk_for_message(
    value: &Value,
    depth: u32,
    visited: &mut Vec<*const Value>,
) -> Option<String> {
    if depth > 3 {
        return None;
    }
    let ptr: *const Value = value;
    if visited.contains(&ptr) {
        return None;
    }
    visited.push(ptr);

    match value {
        Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
        Value::Object(map) => {
            for key in MESSAGE_KEYS {
                match map.get(key) {
                    Some(Value::String(s)) if !s.trim().is_empty() => {
                        return Some(s.trim().to_string());
                    }
                    Some(Value::Number(n)) if key == "code" => {
                        return Some(format!("error code {n}"));
                    }
                    _ => {}
                }
            }
            for key in NEST_KEYS {
                if let Some(nested) = map.get(key) {
                    if let Some(message) = walk_for_message(nested, depth + 1, visited) {
                        return Some(message);
                    }
                }
            }
        }
        _ => {}
    }
    None
}
