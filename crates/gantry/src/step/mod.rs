//! Typed steps and the erased executor the engine drives.
//!
//! User code defines a [`Step<I, O>`] around an async handler with concrete
//! input and output types. The engine only ever sees the [`StepExecutor`]
//! capability set, which works on serialized bytes: deserialize input,
//! invoke the handler, serialize the output.

mod conditional;
mod context;

pub use conditional::{ConditionalStep, ConditionalWrapper};
pub use context::StepContext;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{BackoffStrategy, ExecutionConfig};
use crate::error::StepError;

/// A gating predicate evaluated against the step context.
#[derive(Clone)]
pub struct Condition(
    Arc<dyn Fn(StepContext) -> BoxFuture<'static, Result<bool, StepError>> + Send + Sync>,
);

impl Condition {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, StepError>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    pub async fn evaluate(&self, ctx: StepContext) -> Result<bool, StepError> {
        (self.0)(ctx).await
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Condition")
    }
}

/// The polymorphic capability set the engine works with.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn config(&self) -> &ExecutionConfig;

    /// Deserializes `input`, invokes the handler, serializes the output.
    async fn execute(&self, ctx: StepContext, input: &[u8]) -> Result<Vec<u8>, StepError>;

    /// Checks that `data` deserializes into the declared input type. Used
    /// by tests and tooling; not called on the hot path.
    fn validate_input(&self, data: &[u8]) -> Result<(), StepError>;

    /// Checks that `data` deserializes into the declared output type.
    fn validate_output(&self, data: &[u8]) -> Result<(), StepError>;

    /// The serialized zero value of the declared output type.
    fn default_output(&self) -> Result<Vec<u8>, StepError>;
}

type BoxedHandler<I, O> =
    Box<dyn Fn(StepContext, I) -> BoxFuture<'static, Result<O, StepError>> + Send + Sync>;

/// A type-safe step definition closing over a user handler.
pub struct Step<I, O> {
    id: String,
    name: String,
    description: String,
    config: ExecutionConfig,
    handler: BoxedHandler<I, O>,
}

impl<I, O> Step<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Default + Send + 'static,
{
    pub fn new<F, Fut>(id: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(StepContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            config: ExecutionConfig::default(),
            handler: Box::new(move |ctx, input| Box::pin(handler(ctx, input))),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replaces the whole execution config.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum re-attempts after the first; total attempts = `max + 1`.
    pub fn with_retries(mut self, max: u32) -> Self {
        self.config.max_retries = max;
        self
    }

    pub fn with_retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.config.retry_backoff = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.timeout_seconds = timeout.as_secs();
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.config.continue_on_error = continue_on_error;
        self
    }

    pub fn with_fallback_step(mut self, step_id: impl Into<String>) -> Self {
        self.config.fallback_step_id = Some(step_id.into());
        self
    }

    /// Wraps this step so the handler only runs when `condition` holds;
    /// otherwise `default` (or the output type's zero value) is produced.
    pub fn when(self, condition: Condition, default: Option<O>) -> ConditionalStep<I, O> {
        ConditionalStep::new(self, condition, default)
    }
}

#[async_trait]
impl<I, O> StepExecutor for Step<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Default + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    async fn execute(&self, ctx: StepContext, input: &[u8]) -> Result<Vec<u8>, StepError> {
        let input: I = serde_json::from_slice(input).map_err(|e| {
            StepError::serialization(format!(
                "failed to deserialize input for step {}: {e}",
                self.id
            ))
        })?;

        let output = (self.handler)(ctx, input).await?;

        serde_json::to_vec(&output).map_err(|e| {
            StepError::serialization(format!(
                "failed to serialize output of step {}: {e}",
                self.id
            ))
        })
    }

    fn validate_input(&self, data: &[u8]) -> Result<(), StepError> {
        serde_json::from_slice::<I>(data)
            .map(|_| ())
            .map_err(|e| {
                StepError::serialization(format!("invalid input for step {}: {e}", self.id))
            })
    }

    fn validate_output(&self, data: &[u8]) -> Result<(), StepError> {
        serde_json::from_slice::<O>(data)
            .map(|_| ())
            .map_err(|e| {
                StepError::serialization(format!("invalid output for step {}: {e}", self.id))
            })
    }

    fn default_output(&self) -> Result<Vec<u8>, StepError> {
        serde_json::to_vec(&O::default()).map_err(StepError::from)
    }
}

impl<I, O> std::fmt::Debug for Step<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
