//! End-to-end engine scenarios against the in-memory store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gantry::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PipelineInput {
    a: i64,
    b: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AddOutput {
    value: i64,
    mult: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MultiplyOutput {
    value: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FormatOutput {
    message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiscoverOutput {
    companies: Vec<String>,
    count: usize,
}

fn test_engine() -> Engine {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    Engine::new(store)
}

async fn wait_for_terminal(engine: &Engine, run_id: &str, timeout: Duration) -> WorkflowRun {
    let deadline = Instant::now() + timeout;
    loop {
        let run = engine.get_run(run_id).await.expect("run should exist");
        if run.status.is_terminal() {
            return run;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for run {run_id} to reach a terminal state"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn step_by_id(executions: &[StepExecution], step_id: &str) -> StepExecution {
    executions
        .iter()
        .find(|e| e.step_id == step_id)
        .unwrap_or_else(|| panic!("no execution recorded for step {step_id}"))
        .clone()
}

#[tokio::test]
async fn test_sequential_pipeline_completes() {
    let engine = test_engine();

    let add = Step::new("add", "Add", |_ctx, input: PipelineInput| async move {
        Ok(AddOutput {
            value: input.a + input.b,
            mult: 2,
        })
    });
    let multiply = Step::new("multiply", "Multiply", |_ctx, input: AddOutput| async move {
        Ok(MultiplyOutput {
            value: input.value * input.mult,
        })
    });
    let format = Step::new("format", "Format", |_ctx, input: MultiplyOutput| async move {
        Ok(FormatOutput {
            message: format!("The final result is {}", input.value),
        })
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("math_pipeline", "Math Pipeline")
            .then_step(add)
            .then_step(multiply)
            .then_step(format)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &PipelineInput { a: 10, b: 5 }, StartOptions::new())
        .await
        .unwrap();

    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress, 1.0);
    assert!(run.started_at.is_some());
    assert!(run.completed_at.is_some());
    assert!(run.error.is_none());

    let output: Value = serde_json::from_slice(run.output.as_deref().unwrap()).unwrap();
    assert_eq!(output, json!({"message": "The final result is 30"}));

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    assert_eq!(executions.len(), 3);
    for step_id in ["add", "multiply", "format"] {
        let exec = step_by_id(&executions, step_id);
        assert_eq!(exec.status, StepStatus::Completed);
        assert!(exec.completed_at.is_some());
        assert_eq!(exec.execution_index, 0);
    }

    // Completed step outputs remain loadable byte-for-byte.
    let stored = engine
        .store()
        .load_step_output(&run_id, "format")
        .await
        .unwrap();
    assert_eq!(stored, run.output.unwrap());
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let engine = test_engine();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let retry_step = Step::new("retry", "Retry Step", move |_ctx, _input: Value| {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(StepError::execution("temporary failure"))
            } else {
                Ok(json!({"ok": true}))
            }
        }
    })
    .with_retries(3)
    .with_retry_delay(Duration::from_millis(100))
    .with_backoff(BackoffStrategy::Linear);

    let workflow = Arc::new(
        WorkflowBuilder::new("retry_test", "Retry Test")
            .then_step(retry_step)
            .build()
            .unwrap(),
    );

    let started = Instant::now();
    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;
    let elapsed = started.elapsed();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // Linear backoff with a 100ms base: ~100ms + ~200ms between attempts.
    assert!(
        elapsed >= Duration::from_millis(280),
        "expected backoff delays, run finished in {elapsed:?}"
    );

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    let exec = step_by_id(&executions, "retry");
    assert_eq!(exec.status, StepStatus::Completed);
    assert_eq!(exec.attempt, 2);
}

#[tokio::test]
async fn test_retries_exhausted_fails_run() {
    let engine = test_engine();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let failing = Step::new("fail", "Always Fail", move |_ctx, _input: Value| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Value, _>(StepError::execution("persistent failure"))
        }
    })
    .with_retries(3)
    .with_backoff(BackoffStrategy::None);

    let workflow = Arc::new(
        WorkflowBuilder::new("exhaust_test", "Exhaust Test")
            .then_step(failing)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    let error = run.error.expect("failed run carries an error");
    assert_eq!(error.code, ErrorCode::ExecutionFailed);
    assert_eq!(error.step.as_deref(), Some("fail"));
    assert!(error.message.contains("persistent failure"));

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    let exec = step_by_id(&executions, "fail");
    assert_eq!(exec.status, StepStatus::Failed);
    let step_error = exec.error.expect("failed step carries an error");
    assert_eq!(step_error.code, ErrorCode::ExecutionFailed);
    assert_eq!(step_error.attempt, 3);
}

#[tokio::test]
async fn test_malformed_input_is_not_retried() {
    let engine = test_engine();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let strict = Step::new("strict", "Strict Step", move |_ctx, input: PipelineInput| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(AddOutput {
                value: input.a + input.b,
                mult: 1,
            })
        }
    })
    .with_retries(3)
    .with_retry_delay(Duration::from_millis(500))
    .with_backoff(BackoffStrategy::Linear);

    let workflow = Arc::new(
        WorkflowBuilder::new("bad_input_test", "Bad Input Test")
            .then_step(strict)
            .build()
            .unwrap(),
    );

    // The run input does not deserialize into the step's input type.
    let started = Instant::now();
    let run_id = engine
        .start(workflow, &json!("not an object"), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(5)).await;
    let elapsed = started.elapsed();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        attempts.load(Ordering::SeqCst),
        0,
        "handler must never run on malformed input"
    );
    // A single retry alone would sleep 500ms; finishing sooner proves the
    // retry budget was not spent.
    assert!(
        elapsed < Duration::from_millis(500),
        "serialization failure must not back off, took {elapsed:?}"
    );

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    let exec = step_by_id(&executions, "strict");
    assert_eq!(exec.status, StepStatus::Failed);
    assert_eq!(exec.attempt, 0);
    let error = exec.error.expect("failed step carries an error");
    assert_eq!(error.code, ErrorCode::ExecutionFailed);
    assert_eq!(error.attempt, 0);
    assert!(!error.retryable);
    assert!(error.message.contains("deserialize input"));
    assert_eq!(run.error.unwrap().step.as_deref(), Some("strict"));
}

#[tokio::test]
async fn test_unserializable_output_is_not_retried() {
    let engine = test_engine();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    // Tuple map keys cannot be represented as JSON object keys, so
    // serializing the handler's output always fails.
    let bad_output = Step::new("bad_output", "Bad Output", move |_ctx, _input: Value| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut map = std::collections::HashMap::new();
            map.insert((1u8, 2u8), "unrepresentable".to_string());
            Ok(map)
        }
    })
    .with_retries(2)
    .with_retry_delay(Duration::from_millis(500));

    let workflow = Arc::new(
        WorkflowBuilder::new("bad_output_test", "Bad Output Test")
            .then_step(bad_output)
            .build()
            .unwrap(),
    );

    let started = Instant::now();
    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(5)).await;
    let elapsed = started.elapsed();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        attempts.load(Ordering::SeqCst),
        1,
        "handler runs once and is not retried"
    );
    assert!(
        elapsed < Duration::from_millis(500),
        "serialization failure must not back off, took {elapsed:?}"
    );

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    let exec = step_by_id(&executions, "bad_output");
    assert_eq!(exec.status, StepStatus::Failed);
    assert_eq!(exec.attempt, 0);
    let error = exec.error.expect("failed step carries an error");
    assert_eq!(error.attempt, 0);
    assert!(!error.retryable);
    assert!(error.message.contains("serialize output"));
}

#[tokio::test]
async fn test_step_timeout() {
    let engine = test_engine();

    let slow = Step::new("slow", "Slow Step", |_ctx, _input: Value| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!({"done": true}))
    })
    .with_timeout(Duration::from_secs(1))
    .with_retries(0);

    let workflow = Arc::new(
        WorkflowBuilder::new("timeout_test", "Timeout Test")
            .then_step(slow)
            .build()
            .unwrap(),
    );

    let started = Instant::now();
    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;
    let elapsed = started.elapsed();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_ref().unwrap().code, ErrorCode::Timeout);
    assert!(
        elapsed < Duration::from_secs(2),
        "timeout should fire promptly, took {elapsed:?}"
    );

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    let exec = step_by_id(&executions, "slow");
    assert_eq!(exec.status, StepStatus::Failed);
    assert_eq!(exec.error.as_ref().unwrap().code, ErrorCode::Timeout);
    // Duration covers the timeout window plus a small grace allowance.
    assert!(exec.duration_ms >= 1000 && exec.duration_ms < 1600);
}

#[tokio::test]
async fn test_conditional_skip_yields_default() {
    let engine = test_engine();

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let discover = Step::new("discover", "Discover", move |_ctx, _input: Value| {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok(DiscoverOutput {
                companies: vec!["Real".into()],
                count: 1,
            })
        }
    });

    let consume = Step::new("consume", "Consume", |_ctx, input: DiscoverOutput| async move {
        Ok(input)
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("conditional_test", "Conditional Test")
            .then_step_if(
                discover,
                Condition::new(|_ctx| async { Ok(false) }),
                Some(json!({"companies": ["Default"], "count": 0})),
            )
            .then_step(consume)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(!invoked.load(Ordering::SeqCst), "wrapped handler must not run");

    // The persisted output of the gated step is exactly the default.
    let stored = engine
        .store()
        .load_step_output(&run_id, "discover")
        .await
        .unwrap();
    let stored: Value = serde_json::from_slice(&stored).unwrap();
    assert_eq!(stored, json!({"companies": ["Default"], "count": 0}));

    // The downstream step received the default as its input.
    let downstream = engine
        .store()
        .load_step_output(&run_id, "consume")
        .await
        .unwrap();
    let downstream: DiscoverOutput = serde_json::from_slice(&downstream).unwrap();
    assert_eq!(downstream.companies, vec!["Default".to_string()]);
    assert_eq!(downstream.count, 0);
}

#[tokio::test]
async fn test_continue_on_error() {
    let engine = test_engine();

    let flaky = Step::new("flaky", "Flaky Step", |_ctx, _input: Value| async move {
        Err::<Value, _>(StepError::execution("ignored failure"))
    })
    .with_retries(0)
    .with_continue_on_error(true);

    // Receives JSON null because the failed predecessor produced no output.
    let resilient = Step::new("resilient", "Resilient", |_ctx, input: Option<Value>| async move {
        Ok(json!({"received_null": input.is_none()}))
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("continue_test", "Continue Test")
            .then_step(flaky)
            .then_step(resilient)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress, 1.0);

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    assert_eq!(step_by_id(&executions, "flaky").status, StepStatus::Failed);
    assert_eq!(
        step_by_id(&executions, "resilient").status,
        StepStatus::Completed
    );

    let output: Value = serde_json::from_slice(run.output.as_deref().unwrap()).unwrap();
    assert_eq!(output, json!({"received_null": true}));
}

#[tokio::test]
async fn test_cancellation_interrupts_run() {
    let engine = test_engine();

    let sleeper = Step::new("sleeper", "Sleeper", |ctx: StepContext, _input: Value| async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(10)) => Ok(json!({"slept": true})),
            _ = ctx.cancelled() => Err(StepError::cancelled()),
        }
    })
    .with_timeout(Duration::from_secs(30));

    let follow_up = Step::new("follow_up", "Follow Up", |_ctx, input: Value| async move {
        Ok(input)
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("cancel_test", "Cancel Test")
            .then_step(sleeper)
            .then_step(follow_up)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.cancel(&run_id).await.unwrap();

    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(2)).await;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.error.is_none(), "cancellation carries no error");

    // The follow-up step never started.
    let executions = engine.list_step_executions(&run_id).await.unwrap();
    assert!(executions.iter().all(|e| e.step_id != "follow_up"));

    // Let the execution task finish its final write, then verify that
    // cancelling a terminal run is rejected without touching persistence.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = engine.get_run(&run_id).await.unwrap();
    let err = engine.cancel(&run_id).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalState { .. }));
    let after = engine.get_run(&run_id).await.unwrap();
    assert_eq!(after.status, RunStatus::Cancelled);
    assert_eq!(after.updated_at, settled.updated_at);
}

#[tokio::test]
async fn test_panicking_handler_fails_with_panic_code() {
    let engine = test_engine();

    let panicky = Step::new("panicky", "Panicky", |_ctx, input: Value| async move {
        if input.is_object() {
            panic!("handler blew up");
        }
        Ok(Value::Null)
    })
    .with_retries(0);

    let workflow = Arc::new(
        WorkflowBuilder::new("panic_test", "Panic Test")
            .then_step(panicky)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_ref().unwrap().code, ErrorCode::Panic);
    assert!(run.error.as_ref().unwrap().message.contains("handler blew up"));

    let executions = engine.list_step_executions(&run_id).await.unwrap();
    let exec = step_by_id(&executions, "panicky");
    assert_eq!(exec.status, StepStatus::Failed);
    assert_eq!(exec.error.as_ref().unwrap().code, ErrorCode::Panic);
}

#[tokio::test]
async fn test_handlers_share_outputs_and_state() {
    let engine = test_engine();

    let discover = Step::new("discover", "Discover", |ctx: StepContext, _input: Value| async move {
        ctx.state.set("query", &"tech companies".to_string()).await?;
        Ok(DiscoverOutput {
            companies: vec!["CompanyA".into(), "CompanyB".into(), "CompanyC".into()],
            count: 3,
        })
    });

    // Reads the discover output explicitly instead of relying on input chaining.
    let enrich = Step::new("enrich", "Enrich", |ctx: StepContext, _input: Value| async move {
        let discovered: DiscoverOutput = ctx.outputs.get("discover").await?;
        let query: String = ctx.state.get("query").await?;
        Ok(json!({
            "query": query,
            "enriched": discovered.companies.len(),
        }))
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("accessor_test", "Accessor Test")
            .then_step(discover)
            .then_step(enrich)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&engine, &run_id, Duration::from_secs(10)).await;

    assert_eq!(run.status, RunStatus::Completed);
    let output: Value = serde_json::from_slice(run.output.as_deref().unwrap()).unwrap();
    assert_eq!(output, json!({"query": "tech companies", "enriched": 3}));

    let state = engine.store().get_all_state(&run_id).await.unwrap();
    assert!(state.contains_key("query"));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let engine = test_engine();

    fn paced_step(id: &str) -> Step<Value, Value> {
        Step::new(id, id, |_ctx, input: Value| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(input)
        })
    }

    let workflow = Arc::new(
        WorkflowBuilder::new("progress_test", "Progress Test")
            .then_step(paced_step("one"))
            .then_step(paced_step("two"))
            .then_step(paced_step("three"))
            .then_step(paced_step("four"))
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new())
        .await
        .unwrap();

    let mut observed = Vec::new();
    loop {
        let run = engine.get_run(&run_id).await.unwrap();
        observed.push(run.progress);
        if run.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for window in observed.windows(2) {
        assert!(
            window[1] >= window[0],
            "progress regressed: {observed:?}"
        );
    }
    assert_eq!(*observed.last().unwrap(), 1.0);
}

#[tokio::test]
async fn test_synchronous_start_blocks_until_terminal() {
    let engine = test_engine();

    let quick = Step::new("quick", "Quick", |_ctx, input: Value| async move { Ok(input) });
    let workflow = Arc::new(
        WorkflowBuilder::new("sync_test", "Sync Test")
            .then_step(quick)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({"n": 1}), StartOptions::new().synchronous())
        .await
        .unwrap();

    // Terminal immediately, no polling needed.
    let run = engine.get_run(&run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_synchronous_start_surfaces_failure() {
    let engine = test_engine();

    let doomed = Step::new("doomed", "Doomed", |_ctx, _input: Value| async move {
        Err::<Value, _>(StepError::execution("nope"))
    })
    .with_retries(0);

    let workflow = Arc::new(
        WorkflowBuilder::new("sync_fail_test", "Sync Fail Test")
            .then_step(doomed)
            .build()
            .unwrap(),
    );

    let err = engine
        .start(workflow, &json!({}), StartOptions::new().synchronous())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RunFailed(_)));
}

#[tokio::test]
async fn test_start_options_are_persisted() {
    let engine = test_engine();

    let quick = Step::new("quick", "Quick", |_ctx, input: Value| async move { Ok(input) });
    let workflow = Arc::new(
        WorkflowBuilder::new("options_test", "Options Test")
            .version("3.2")
            .then_step(quick)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(
            workflow,
            &json!({}),
            StartOptions::new()
                .with_resource_id("tenant-a")
                .with_ttl(Duration::from_secs(3600))
                .with_tag("env", "test")
                .with_trigger("api", "user-42")
                .synchronous(),
        )
        .await
        .unwrap();

    let run = engine.get_run(&run_id).await.unwrap();
    assert_eq!(run.workflow_version, "3.2");
    assert_eq!(run.resource_id.as_deref(), Some("tenant-a"));
    assert_eq!(run.tags.get("env").map(String::as_str), Some("test"));
    let trigger = run.trigger.as_ref().unwrap();
    assert_eq!(trigger.trigger_type, "api");
    assert_eq!(trigger.source, "user-42");
    let expires_at = run.expires_at.unwrap();
    assert!(expires_at > run.created_at);

    let count = engine
        .store()
        .count_runs_by_status("tenant-a", RunStatus::Completed)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_custom_context_reaches_handlers() {
    struct AppContext {
        api_key: String,
    }

    let engine = test_engine();

    let uses_context = Step::new("keyed", "Keyed", |ctx: StepContext, _input: Value| async move {
        let app = ctx
            .custom::<AppContext>()
            .ok_or_else(|| StepError::execution("missing custom context"))?;
        Ok(json!({"key_len": app.api_key.len()}))
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("context_test", "Context Test")
            .context(AppContext {
                api_key: "secret".into(),
            })
            .then_step(uses_context)
            .build()
            .unwrap(),
    );

    let run_id = engine
        .start(workflow, &json!({}), StartOptions::new().synchronous())
        .await
        .unwrap();
    let run = engine.get_run(&run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let output: Value = serde_json::from_slice(run.output.as_deref().unwrap()).unwrap();
    assert_eq!(output, json!({"key_len": 6}));
}
