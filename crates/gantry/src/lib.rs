//! # Gantry
//!
//! A durable workflow orchestration engine embedded in a host process.
//! Workflows are directed acyclic graphs of typed steps; the engine drives
//! them in topological order, persists every state transition, retries
//! failed steps with configurable backoff, enforces per-attempt timeouts,
//! and supports cooperative cancellation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │   (scheduler, step runner, retry/timeout/cancel machine)    │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌───────────────────────────┐  ┌─────────────────────────────┐
//! │        Workflow           │  │       WorkflowStore         │
//! │ (step registry + DAG via  │  │ (runs, step executions,     │
//! │    WorkflowBuilder)       │  │  outputs, state — memory    │
//! └───────────────────────────┘  │  or Redis)                  │
//!                                └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gantry::prelude::*;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Numbers { a: i64, b: i64 }
//!
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! struct Sum { value: i64 }
//!
//! let add = Step::new("add", "Add", |_ctx, input: Numbers| async move {
//!     Ok(Sum { value: input.a + input.b })
//! });
//!
//! let workflow = Arc::new(
//!     WorkflowBuilder::new("math", "Math Pipeline")
//!         .then_step(add)
//!         .build()?,
//! );
//!
//! let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
//! let engine = Engine::new(store);
//! let run_id = engine.start(workflow, &Numbers { a: 10, b: 5 }, StartOptions::new()).await?;
//! ```
//!
//! Step handlers receive a [`step::StepContext`] with typed access to other
//! steps' outputs and run-scoped state; long-running handlers must consult
//! the context's cancellation token.

pub mod accessor;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod persistence;
pub mod step;
pub mod workflow;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::accessor::{StateAccessor, StepOutputAccessor};
    pub use crate::builder::{BuildError, WorkflowBuilder};
    pub use crate::config::{BackoffStrategy, EngineConfig, ExecutionConfig, StartOptions};
    pub use crate::engine::Engine;
    pub use crate::error::{EngineError, ErrorCode, StepError, WorkflowError};
    pub use crate::graph::{ExecutionGraph, GraphError, NodeKind};
    pub use crate::model::{
        RunFilter, RunStatus, StepExecution, StepStatus, TriggerInfo, WorkflowRun,
    };
    pub use crate::persistence::{
        InMemoryWorkflowStore, RedisWorkflowStore, StoreError, WorkflowStore,
    };
    pub use crate::step::{Condition, ConditionalStep, Step, StepContext, StepExecutor};
    pub use crate::workflow::Workflow;
}

// Re-export key types at crate root.
pub use accessor::{StateAccessor, StepOutputAccessor};
pub use builder::WorkflowBuilder;
pub use config::{BackoffStrategy, EngineConfig, ExecutionConfig, StartOptions};
pub use engine::Engine;
pub use error::{EngineError, ErrorCode, StepError, WorkflowError};
pub use graph::{ExecutionGraph, NodeKind};
pub use model::{RunFilter, RunStatus, StepExecution, StepStatus, WorkflowRun};
pub use persistence::{InMemoryWorkflowStore, RedisWorkflowStore, StoreError, WorkflowStore};
pub use step::{Condition, ConditionalStep, Step, StepContext, StepExecutor};
pub use workflow::Workflow;
