//! A conditionally gated step driven by run-scoped state.
//!
//! Run with: `cargo run --example conditional`

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use gantry::prelude::*;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScanResult {
    targets: Vec<String>,
    premium: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EnrichResult {
    enriched: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let scan = Step::new("scan", "Scan Targets", |ctx: StepContext, input: serde_json::Value| async move {
        let premium = input["premium"].as_bool().unwrap_or(false);
        ctx.state.set("premium", &premium).await?;
        Ok(ScanResult {
            targets: vec!["alpha".into(), "beta".into()],
            premium,
        })
    });

    // Only premium runs pay for enrichment; everyone else gets the default.
    let enrich = Step::new("enrich", "Enrich Targets", |_ctx, input: ScanResult| async move {
        Ok(EnrichResult {
            enriched: input
                .targets
                .iter()
                .map(|t| format!("{t} (enriched)"))
                .collect(),
        })
    });

    let premium_only = Condition::new(|ctx: StepContext| async move {
        let premium: bool = ctx.state.get("premium").await.unwrap_or(false);
        Ok(premium)
    });

    let workflow = Arc::new(
        WorkflowBuilder::new("conditional_scan", "Conditional Scan")
            .then_step(scan)
            .then_step_if(
                enrich,
                premium_only,
                Some(json!({"enriched": []})),
            )
            .build()?,
    );

    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let engine = Engine::new(store);

    for premium in [false, true] {
        let run_id = engine
            .start(
                workflow.clone(),
                &json!({"premium": premium}),
                StartOptions::new().synchronous(),
            )
            .await?;

        let run = engine.get_run(&run_id).await?;
        let output: EnrichResult = serde_json::from_slice(run.output.as_deref().unwrap_or(b"{}"))?;
        println!(
            "premium={premium}: status={} enriched={:?}",
            run.status, output.enriched
        );
    }

    Ok(())
}
