//! Response envelope and error normalization
//!
//! The one place where errors become data. Every operation outcome,
//! including a panic inside the operation task, comes out as a
//! `ResponseEnvelope`.

use crate::error::{ErrorKind, GatewayError};
use crate::models::{Operation, OperationOutput};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Uniform result of every tool call.
///
/// `success` implies no `error`; a failure always has `data == []` and no
/// `count`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ResponseEnvelope {
    pub fn success(output: OperationOutput) -> Self {
        let count = output.count();
        Self {
            success: true,
            data: output.into_value(),
            count: Some(count),
            error: None,
            status_code: None,
            error_kind: None,
        }
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            success: false,
            data: Value::Array(Vec::new()),
            count: None,
            error: Some(err.to_string()),
            status_code: err.status_code(),
            error_kind: Some(err.kind()),
        }
    }

    pub fn from_result(result: Result<OperationOutput>) -> Self {
        match result {
            Ok(output) => Self::success(output),
            Err(err) => Self::failure(&err),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "success": false,
                "data": [],
                "error": "Unexpected error: envelope serialization failed",
                "errorKind": "UnexpectedError"
            })
        })
    }
}

/// Aborts the wrapped task when dropped, so an abandoned caller also
/// abandons its in-flight upstream call.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run an operation to completion and normalize its outcome.
pub async fn normalize<F>(operation: Operation, work: F) -> ResponseEnvelope
where
    F: Future<Output = Result<OperationOutput>> + Send + 'static,
{
    let started = Instant::now();
    let mut task = AbortOnDrop(tokio::spawn(work));

    let result = match (&mut task.0).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => Err(GatewayError::Unexpected(format!(
            "{} panicked: {}",
            operation,
            panic_message(join_error.into_panic())
        ))),
        Err(join_error) => Err(GatewayError::Unexpected(format!(
            "{} was cancelled: {}",
            operation, join_error
        ))),
    };

    let envelope = ResponseEnvelope::from_result(result);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if envelope.success {
        info!(tool = %operation, count = envelope.count, elapsed_ms, "Tool call succeeded");
    } else {
        warn!(
            tool = %operation,
            error_kind = ?envelope.error_kind,
            status_code = envelope.status_code,
            error = envelope.error.as_deref().unwrap_or_default(),
            elapsed_ms,
            "Tool call failed"
        );
    }

    envelope
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
