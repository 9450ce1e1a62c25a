//! Run and step execution: the scheduler loop, the retry state machine,
//! and the terminal-transition helpers.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accessor::{StateAccessor, StepOutputAccessor};
use crate::engine::backoff_delay;
use crate::error::{EngineError, ErrorCode, StepError, WorkflowError};
use crate::model::{RunStatus, StepExecution, StepStatus, WorkflowRun};
use crate::step::{StepContext, StepExecutor};
use crate::workflow::Workflow;

use super::Engine;

/// Result of a successful step execution.
pub(crate) struct StepOutcome {
    pub output: Vec<u8>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl Engine {
    /// Drives every step of the run in topological order, recording each
    /// transition. Returns `Err` only for `FAILED` terminals and
    /// persistence faults; cancellation is a normal exit.
    pub(crate) async fn execute_run(
        &self,
        workflow: Arc<Workflow>,
        mut run: WorkflowRun,
        token: CancellationToken,
    ) -> Result<(), EngineError> {
        let run_id = run.run_id.clone();
        if token.is_cancelled() {
            warn!(%run_id, "workflow cancelled before execution started");
            return self.cancel_run(&mut run).await;
        }
        info!(%run_id, workflow_id = %run.workflow_id, "workflow execution started");

        let started_at = Utc::now();
        run.status = RunStatus::Running;
        run.started_at = Some(started_at);
        run.updated_at = started_at;
        self.store.update_run(&run).await?;

        let outputs = Arc::new(StepOutputAccessor::new(&run_id, self.store.clone()));
        let state = Arc::new(StateAccessor::new(&run_id, self.store.clone()));

        let order = match workflow.graph().topological_order() {
            Ok(order) => order,
            Err(e) => {
                let error = WorkflowError::new(ErrorCode::Validation, e.to_string());
                return self.fail_run(&mut run, error).await;
            }
        };
        debug!(%run_id, execution_order = ?order, "execution order determined");

        let total = order.len();
        let mut completed = 0usize;
        let mut final_output: Option<Vec<u8>> = None;

        for (index, step_id) in order.iter().enumerate() {
            if token.is_cancelled() {
                warn!(%run_id, "workflow execution cancelled");
                return self.cancel_run(&mut run).await;
            }

            let step = match workflow.step(step_id) {
                Some(step) => step.clone(),
                None => {
                    let error = WorkflowError::new(
                        ErrorCode::NotFound,
                        format!("step {step_id} not found in workflow"),
                    )
                    .with_step(step_id.clone());
                    return self.fail_run(&mut run, error).await;
                }
            };

            info!(
                %run_id,
                %step_id,
                step_name = %step.name(),
                step_num = index + 1,
                total_steps = total,
                "executing step"
            );

            // First step gets the run input; later steps consume the output
            // of their topological predecessor.
            let step_input = if index == 0 {
                run.input.clone()
            } else {
                let prev_step_id = &order[index - 1];
                match self.store.load_step_output(&run_id, prev_step_id).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let prev_continues = workflow
                            .step(prev_step_id)
                            .map(|prev| prev.config().continue_on_error)
                            .unwrap_or(false);
                        if prev_continues {
                            warn!(
                                %run_id,
                                prev_step_id = %prev_step_id,
                                "previous step output missing, passing null input"
                            );
                            b"null".to_vec()
                        } else {
                            let error = WorkflowError::new(
                                ErrorCode::ExecutionFailed,
                                format!("failed to load output of step {prev_step_id}: {e}"),
                            )
                            .with_step(step_id.clone());
                            return self.fail_run(&mut run, error).await;
                        }
                    }
                }
            };

            let outcome = self
                .execute_step(
                    &run,
                    step.clone(),
                    step_input,
                    outputs.clone(),
                    state.clone(),
                    token.clone(),
                    workflow.custom_context().cloned(),
                )
                .await;

            match outcome {
                Ok(outcome) => {
                    debug!(
                        %run_id,
                        %step_id,
                        duration_ms = outcome.duration_ms,
                        attempts = outcome.attempts,
                        "step completed"
                    );
                    final_output = Some(outcome.output);
                }
                Err(err) if err.code == ErrorCode::Cancelled => {
                    warn!(%run_id, %step_id, "step cancelled, stopping workflow");
                    return self.cancel_run(&mut run).await;
                }
                Err(err) => {
                    if step.config().continue_on_error {
                        warn!(
                            %run_id,
                            %step_id,
                            error = %err,
                            "step failed but continuing due to continue_on_error"
                        );
                        final_output = None;
                    } else {
                        error!(%run_id, %step_id, error = %err, "step failed, stopping workflow");
                        let error = WorkflowError::new(err.code, err.message.clone())
                            .with_step(step_id.clone());
                        return self.fail_run(&mut run, error).await;
                    }
                }
            }

            completed += 1;
            run.progress = completed as f64 / total as f64;
            run.updated_at = Utc::now();
            if let Err(e) = self.store.update_run(&run).await {
                error!(%run_id, operation = "update_progress", error = %e, "persistence error");
            }
            debug!(%run_id, progress = run.progress, "progress updated");
        }

        self.complete_run(&mut run, final_output).await
    }

    /// Runs a single step through its retry budget, persisting every status
    /// transition so observers see the `RETRYING` states.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn execute_step(
        &self,
        run: &WorkflowRun,
        step: Arc<dyn StepExecutor>,
        input: Vec<u8>,
        outputs: Arc<StepOutputAccessor>,
        state: Arc<StateAccessor>,
        token: CancellationToken,
        custom_context: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<StepOutcome, StepError> {
        let run_id = run.run_id.clone();
        let step_id = step.id().to_string();
        let config = step.config().clone();

        let timeout_secs = if config.timeout_seconds == 0 {
            self.config.default_timeout.as_secs()
        } else {
            config.timeout_seconds
        };
        let timeout = Duration::from_secs(timeout_secs);

        let mut exec = StepExecution::new(&run_id, &step_id, input.clone());
        self.store
            .create_step_execution(&exec)
            .await
            .map_err(|e| {
                StepError::new(
                    ErrorCode::Internal,
                    format!("failed to create step execution: {e}"),
                )
            })?;

        let mut base_ctx = StepContext::new(&run_id, &step_id, outputs, state)
            .with_cancellation(token.clone());
        if let Some(custom) = custom_context {
            base_ctx = base_ctx.with_custom(custom);
        }

        let mut last_err = StepError::execution("step was never attempted");
        let mut cancelled = false;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                exec.status = StepStatus::Retrying;
                exec.attempt = attempt;
                exec.updated_at = Utc::now();
                if let Err(e) = self.store.update_step_execution(&exec).await {
                    error!(%run_id, %step_id, operation = "update_step_retrying", error = %e, "persistence error");
                }

                let delay = backoff_delay(config.retry_delay_ms, attempt, config.retry_backoff);
                warn!(
                    %run_id,
                    %step_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "step retrying"
                );

                if !delay.is_zero() {
                    let interrupted = tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = token.cancelled() => true,
                    };
                    if interrupted {
                        last_err = StepError::cancelled().with_attempt(attempt);
                        cancelled = true;
                        break;
                    }
                }
            }

            exec.status = StepStatus::Running;
            if exec.started_at.is_none() {
                exec.started_at = Some(Utc::now());
            }
            exec.attempt = attempt;
            exec.updated_at = Utc::now();
            if let Err(e) = self.store.update_step_execution(&exec).await {
                error!(%run_id, %step_id, operation = "update_step_running", error = %e, "persistence error");
            }

            info!(%run_id, %step_id, attempt, "step started");

            // Each attempt runs on its own task: the timeout bounds only
            // this attempt, and a handler panic is contained in the join
            // error instead of tearing down the run.
            let attempt_step = step.clone();
            let attempt_ctx = base_ctx.clone().with_attempt(attempt);
            let attempt_input = input.clone();
            let mut handle = tokio::spawn(async move {
                attempt_step.execute(attempt_ctx, &attempt_input).await
            });

            let started = Instant::now();
            let result: Result<Vec<u8>, StepError> = tokio::select! {
                joined = tokio::time::timeout(timeout, &mut handle) => match joined {
                    Ok(Ok(step_result)) => step_result.map_err(|e| e.with_attempt(attempt)),
                    Ok(Err(join_err)) => {
                        if join_err.is_panic() {
                            Err(StepError::panic(panic_message(join_err)).with_attempt(attempt))
                        } else {
                            Err(StepError::cancelled().with_attempt(attempt))
                        }
                    }
                    Err(_elapsed) => {
                        handle.abort();
                        Err(StepError::timeout(timeout_secs).with_attempt(attempt))
                    }
                },
                _ = token.cancelled() => {
                    handle.abort();
                    Err(StepError::cancelled().with_attempt(attempt))
                }
            };
            exec.duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    let now = Utc::now();
                    exec.status = StepStatus::Completed;
                    exec.output = Some(output.clone());
                    exec.completed_at = Some(now);
                    exec.updated_at = now;
                    if let Err(e) = self.store.update_step_execution(&exec).await {
                        error!(%run_id, %step_id, operation = "update_step_completed", error = %e, "persistence error");
                    }

                    info!(
                        %run_id,
                        %step_id,
                        duration_ms = exec.duration_ms,
                        attempts = attempt + 1,
                        "step completed"
                    );

                    if let Err(e) = self.store.save_step_output(&run_id, &step_id, &output).await {
                        error!(%run_id, %step_id, operation = "save_step_output", error = %e, "persistence error");
                    }

                    return Ok(StepOutcome {
                        output,
                        duration_ms: exec.duration_ms,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => {
                    error!(
                        %run_id,
                        %step_id,
                        attempt,
                        duration_ms = exec.duration_ms,
                        error = %err,
                        "step attempt failed"
                    );
                    let is_cancelled = err.code == ErrorCode::Cancelled;
                    let retryable = err.retryable;
                    last_err = err;
                    if is_cancelled {
                        cancelled = true;
                        break;
                    }
                    if !retryable {
                        // Serialization and similar failures repeat
                        // identically; spending the retry budget on them
                        // only delays the terminal transition.
                        break;
                    }
                }
            }
        }

        // Retry budget exhausted, or cancellation / a non-retryable error
        // broke the loop.
        let now = Utc::now();
        exec.status = StepStatus::Failed;
        exec.completed_at = Some(now);
        exec.updated_at = now;
        exec.error = Some(if cancelled || !last_err.retryable {
            last_err.clone()
        } else {
            last_err.clone().with_attempt(config.max_retries)
        });
        if let Err(e) = self.store.update_step_execution(&exec).await {
            error!(%run_id, %step_id, operation = "update_step_failed", error = %e, "persistence error");
        }

        if !cancelled {
            if last_err.retryable {
                error!(
                    %run_id,
                    %step_id,
                    max_retries = config.max_retries,
                    "step failed after all retries exhausted"
                );
            } else {
                error!(%run_id, %step_id, "step failed with non-retryable error");
            }
        }

        Err(last_err)
    }

    /// Marks the run `COMPLETED` with progress 1.0 and the final output.
    pub(crate) async fn complete_run(
        &self,
        run: &mut WorkflowRun,
        output: Option<Vec<u8>>,
    ) -> Result<(), EngineError> {
        let completed_at = Utc::now();
        run.status = RunStatus::Completed;
        run.progress = 1.0;
        run.output = output;
        run.completed_at = Some(completed_at);
        run.updated_at = completed_at;

        self.store.update_run(run).await?;

        let duration_ms = run
            .started_at
            .map(|s| (completed_at - s).num_milliseconds())
            .unwrap_or(0);
        info!(run_id = %run.run_id, duration_ms, "workflow completed");
        Ok(())
    }

    /// Marks the run `FAILED` carrying `error`, then surfaces it.
    pub(crate) async fn fail_run(
        &self,
        run: &mut WorkflowRun,
        error: WorkflowError,
    ) -> Result<(), EngineError> {
        let completed_at = Utc::now();
        run.status = RunStatus::Failed;
        run.completed_at = Some(completed_at);
        run.updated_at = completed_at;
        run.error = Some(error.clone());

        if let Err(e) = self.store.update_run(run).await {
            error!(run_id = %run.run_id, operation = "update_run_failed", error = %e, "persistence error");
        }

        error!(run_id = %run.run_id, %error, "workflow failed");
        Err(EngineError::RunFailed(error))
    }

    /// Marks the run `CANCELLED`. Cancellation carries no error record.
    pub(crate) async fn cancel_run(&self, run: &mut WorkflowRun) -> Result<(), EngineError> {
        let completed_at = Utc::now();
        run.status = RunStatus::Cancelled;
        run.completed_at = Some(completed_at);
        run.updated_at = completed_at;

        self.store.update_run(run).await?;

        warn!(run_id = %run.run_id, "workflow cancelled");
        Ok(())
    }
}

/// Best-effort extraction of a panic payload's message.
fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
