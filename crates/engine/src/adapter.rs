//! # Driver seam
//!
//! The engine is driver-agnostic: hosts supply an [`Adapter`] wrapping their
//! actual database client. Compilation and shaping are synchronous; this trait
//! is the pipeline's only suspension point.

use async_trait::async_trait;
use thiserror::Error;

use sqlweave_values::values::{Row, Value};

/// Failure surfaced by a driver. The original driver payload rides along
/// untouched so hosts can inspect vendor error codes.
#[derive(Debug, Error)]
#[error("driver error: {message}")]
pub struct DriverError {
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> DriverError {
        DriverError {
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(message: impl Into<String>, payload: serde_json::Value) -> DriverError {
        DriverError {
            message: message.into(),
            payload: Some(payload),
        }
    }
}

/// Executes one statement and returns the raw rows.
///
/// Implementations bind `params` positionally: the statement's placeholders
/// (`$1..$N` or `?`) correspond one-to-one, in order, to the slice. Timeouts,
/// retries, and cancellation are the adapter's business; the engine performs
/// none of them.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError>;
}
