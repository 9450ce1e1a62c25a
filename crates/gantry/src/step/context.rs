//! Execution context handed to step handlers.

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::accessor::{StateAccessor, StepOutputAccessor};

/// Context for a single step attempt.
///
/// Carries the run and step identity, the zero-based attempt counter, the
/// run's cancellation token, and the accessors for other steps' outputs and
/// run-scoped state. Handlers performing long operations must consult the
/// cancellation token; the engine only interrupts them at await points.
///
/// Cloning is cheap: accessors and the custom context are shared.
#[derive(Clone)]
pub struct StepContext {
    pub run_id: String,
    pub step_id: String,
    pub attempt: u32,

    /// Outputs of previously completed steps of this run.
    pub outputs: Arc<StepOutputAccessor>,
    /// Run-scoped key/value state.
    pub state: Arc<StateAccessor>,

    cancellation: CancellationToken,
    custom: Option<Arc<dyn Any + Send + Sync>>,
}

impl StepContext {
    pub fn new(
        run_id: impl Into<String>,
        step_id: impl Into<String>,
        outputs: Arc<StepOutputAccessor>,
        state: Arc<StateAccessor>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            attempt: 0,
            outputs,
            state,
            cancellation: CancellationToken::new(),
            custom: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_custom(mut self, value: Arc<dyn Any + Send + Sync>) -> Self {
        self.custom = Some(value);
        self
    }

    /// True once the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the run is cancelled; for `tokio::select!` patterns.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The workflow's custom context, downcast to `T`.
    ///
    /// Returns `None` when no context was attached or the type differs.
    pub fn custom<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.custom.clone().and_then(|any| any.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("run_id", &self.run_id)
            .field("step_id", &self.step_id)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
