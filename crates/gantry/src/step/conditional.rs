//! Conditional step wrappers.
//!
//! A conditional step evaluates a gating predicate before invoking the
//! wrapped step. When the predicate is false the wrapped handler never
//! runs; the wrapper yields a caller-supplied default value or the zero
//! value of the declared output type, so downstream steps still receive
//! well-formed input.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::ExecutionConfig;
use crate::error::StepError;

use super::{Condition, Step, StepContext, StepExecutor};

/// Type-safe conditional wrapper around a [`Step<I, O>`].
pub struct ConditionalStep<I, O> {
    step: Step<I, O>,
    condition: Condition,
    default: Option<O>,
}

impl<I, O> ConditionalStep<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Default + Send + 'static,
{
    pub fn new(step: Step<I, O>, condition: Condition, default: Option<O>) -> Self {
        Self {
            step,
            condition,
            default,
        }
    }
}

#[async_trait]
impl<I, O> StepExecutor for ConditionalStep<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        self.step.id()
    }

    fn name(&self) -> &str {
        self.step.name()
    }

    fn description(&self) -> &str {
        self.step.description()
    }

    fn config(&self) -> &ExecutionConfig {
        self.step.config()
    }

    async fn execute(&self, ctx: StepContext, input: &[u8]) -> Result<Vec<u8>, StepError> {
        let should_run = self
            .condition
            .evaluate(ctx.clone())
            .await
            .map_err(|e| StepError::execution(format!("condition evaluation failed: {e}")))?;

        if !should_run {
            debug!(step_id = %self.id(), "condition false, yielding default output");
            return match &self.default {
                Some(default) => serde_json::to_vec(default).map_err(StepError::from),
                None => self.step.default_output(),
            };
        }

        self.step.execute(ctx, input).await
    }

    fn validate_input(&self, data: &[u8]) -> Result<(), StepError> {
        self.step.validate_input(data)
    }

    fn validate_output(&self, data: &[u8]) -> Result<(), StepError> {
        self.step.validate_output(data)
    }

    fn default_output(&self) -> Result<Vec<u8>, StepError> {
        self.step.default_output()
    }
}

/// Type-erased conditional wrapper used by the builder's `then_step_if`.
///
/// The default value, when supplied, is an untyped JSON document; absent
/// that, the wrapped step's zero output is used.
pub struct ConditionalWrapper {
    step: Arc<dyn StepExecutor>,
    condition: Condition,
    default: Option<serde_json::Value>,
}

impl ConditionalWrapper {
    pub fn new(
        step: Arc<dyn StepExecutor>,
        condition: Condition,
        default: Option<serde_json::Value>,
    ) -> Self {
        Self {
            step,
            condition,
            default,
        }
    }
}

#[async_trait]
impl StepExecutor for ConditionalWrapper {
    fn id(&self) -> &str {
        self.step.id()
    }

    fn name(&self) -> &str {
        self.step.name()
    }

    fn description(&self) -> &str {
        self.step.description()
    }

    fn config(&self) -> &ExecutionConfig {
        self.step.config()
    }

    async fn execute(&self, ctx: StepContext, input: &[u8]) -> Result<Vec<u8>, StepError> {
        let should_run = self
            .condition
            .evaluate(ctx.clone())
            .await
            .map_err(|e| StepError::execution(format!("condition evaluation failed: {e}")))?;

        if !should_run {
            debug!(step_id = %self.id(), "condition false, yielding default output");
            return match &self.default {
                Some(default) => serde_json::to_vec(default).map_err(StepError::from),
                None => self.step.default_output(),
            };
        }

        self.step.execute(ctx, input).await
    }

    fn validate_input(&self, data: &[u8]) -> Result<(), StepError> {
        self.step.validate_input(data)
    }

    fn validate_output(&self, data: &[u8]) -> Result<(), StepError> {
        self.step.validate_output(data)
    }

    fn default_output(&self) -> Result<Vec<u8>, StepError> {
        self.step.default_output()
    }
}
