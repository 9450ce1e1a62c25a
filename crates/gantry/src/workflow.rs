//! The workflow blueprint: an immutable registry of steps plus the
//! execution graph, handed to the engine by reference and never mutated
//! after [`build`](crate::builder::WorkflowBuilder::build).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ExecutionConfig;
use crate::graph::ExecutionGraph;
use crate::step::StepExecutor;

/// A complete workflow definition.
///
/// Invariant, enforced at build time: every identifier appearing in the
/// graph has a matching entry in the step registry.
pub struct Workflow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) version: String,

    pub(crate) steps: HashMap<String, Arc<dyn StepExecutor>>,
    pub(crate) graph: ExecutionGraph,

    pub(crate) config: ExecutionConfig,
    pub(crate) tags: HashMap<String, String>,
    pub(crate) created_at: DateTime<Utc>,

    pub(crate) custom_context: Option<Arc<dyn Any + Send + Sync>>,
}

impl Workflow {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Version string, `"1.0"` unless overridden.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    /// Looks up a registered step by identifier.
    pub fn step(&self, step_id: &str) -> Option<&Arc<dyn StepExecutor>> {
        self.steps.get(step_id)
    }

    /// All registered steps, keyed by identifier.
    pub fn steps(&self) -> &HashMap<String, Arc<dyn StepExecutor>> {
        &self.steps
    }

    /// Default execution config steps inherit unless overridden.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The caller-supplied custom context, if any.
    pub fn custom_context(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.custom_context.as_ref()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}
