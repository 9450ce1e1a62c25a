//! A three-step sequential pipeline: add -> multiply -> format.
//!
//! Run with: `cargo run --example pipeline`

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gantry::prelude::*;

#[derive(Debug, Serialize, Deserialize)]
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let add = Step::new("add", "Add Numbers", |_ctx, input: PipelineInput| async move {
        Ok(AddOutput {
            value: input.a + input.b,
            mult: 2,
        })
    })
    .with_retries(2)
    .with_retry_delay(Duration::from_millis(200));

    let multiply = Step::new("multiply", "Multiply", |_ctx, input: AddOutput| async move {
        Ok(MultiplyOutput {
            value: input.value * input.mult,
        })
    });

    let format = Step::new("format", "Format Result", |_ctx, input: MultiplyOutput| async move {
        Ok(FormatOutput {
            message: format!("The final result is {}", input.value),
        })
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("math_pipeline", "Math Pipeline")
            .description("adds, multiplies, and formats a pair of numbers")
            .then_step(add)
            .then_step(multiply)
            .then_step(format)
            .build()?,
    );

    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let engine = Engine::new(store);

    let run_id = engine
        .start(
            workflow,
            &PipelineInput { a: 10, b: 5 },
            StartOptions::new()
                .with_trigger("api", "example")
                .synchronous(),
        )
        .await?;

    let run = engine.get_run(&run_id).await?;
    println!("run {run_id} finished with status {}", run.status);

    if let Some(output) = run.output {
        let formatted: FormatOutput = serde_json::from_slice(&output)?;
        println!("output: {}", formatted.message);
    }

    for exec in engine.list_step_executions(&run_id).await? {
        println!(
            "  step {:<10} {:<10} {}ms (attempt {})",
            exec.step_id, exec.status.to_string(), exec.duration_ms, exec.attempt
        );
    }

    Ok(())
}
