//! Error taxonomy for the engine.
//!
//! Failures that end up in persisted records (`WorkflowError`, `StepError`)
//! carry an [`ErrorCode`] that serializes as a stable uppercase token, so an
//! external observer can dispatch on the code without parsing messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::RunStatus;
use crate::persistence::StoreError;

/// Stable error codes surfaced on workflow and step errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "CONCURRENCY_LIMIT")]
    ConcurrencyLimit,
    #[serde(rename = "EXECUTION_FAILED")]
    ExecutionFailed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "PANIC")]
    Panic,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorCode {
    /// The persisted string token for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Panic => "PANIC",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error attached to a workflow run.
///
/// Populated on the `FAILED` terminal transition; names the failing step
/// when the failure originated in one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            step: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the identifier of the step the failure originated in.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.step {
            Some(step) => write!(f, "[{}] {} (step: {})", self.code, self.message, step),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// An error produced while executing a single step.
///
/// Step handlers return this from their error path; the engine also
/// constructs it for timeouts, panics, serialization failures, and
/// cancellation. The `attempt` counter is zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub code: ErrorCode,
    pub message: String,
    pub attempt: u32,
    /// Whether the engine may retry the attempt. Serialization and
    /// not-found failures are final; retrying would repeat them.
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl StepError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            attempt: 0,
            retryable: true,
            timestamp: Utc::now(),
        }
    }

    /// A plain handler failure (`EXECUTION_FAILED`).
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionFailed, message)
    }

    /// Input or output could not be (de)serialized. Not retried: the same
    /// bytes would fail the same way on every attempt.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionFailed, message).non_retryable()
    }

    /// A missing record (step output, state key). Not retried.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message).non_retryable()
    }

    /// The attempt exceeded the step's timeout.
    pub fn timeout(timeout_secs: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("step execution timed out after {timeout_secs} seconds"),
        )
    }

    /// The handler panicked; `payload` is the stringified panic value.
    pub fn panic(payload: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Panic,
            format!("step panicked: {}", payload.into()),
        )
    }

    /// The run was cancelled while the step was pending or in flight.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "step execution cancelled").non_retryable()
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Marks the error as final: the retry loop stops at it instead of
    /// spending the remaining retry budget.
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} (attempt: {})", self.code, self.message, self.attempt)
    }
}

impl std::error::Error for StepError {}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self::execution(message)
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::execution(message)
    }
}

/// Errors returned from the engine's public operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A persistence operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Workflow input could not be serialized.
    #[error("failed to serialize workflow input: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cancel was called on a run already in a terminal state.
    #[error("cannot cancel workflow run {run_id} in {status} state")]
    IllegalState { run_id: String, status: RunStatus },

    /// The run reached the `FAILED` terminal state (synchronous starts only).
    #[error(transparent)]
    RunFailed(#[from] WorkflowError),
}
