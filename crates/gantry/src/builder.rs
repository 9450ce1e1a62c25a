//! Fluent construction of workflow blueprints.
//!
//! The builder keeps a frontier of the most recently added step(s) and
//! appends edges from the frontier as the chain grows. Structural problems
//! encountered mid-chain are deferred and surfaced from [`build`], which
//! also validates the graph and checks that every graph node has a
//! registered step.
//!
//! [`build`]: WorkflowBuilder::build

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::config::ExecutionConfig;
use crate::graph::{ExecutionGraph, GraphError, NodeKind};
use crate::step::{Condition, ConditionalWrapper, StepExecutor};
use crate::workflow::Workflow;

/// Why [`WorkflowBuilder::build`] rejected the definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("invalid workflow graph: {0}")]
    Graph(#[from] GraphError),

    #[error("step {0} referenced in graph but not registered")]
    UnregisteredStep(String),
}

/// Fluent workflow builder.
///
/// ```
/// use gantry::builder::WorkflowBuilder;
/// use gantry::step::Step;
///
/// let double = Step::new("double", "Double", |_ctx, n: i64| async move { Ok(n * 2) });
/// let wf = WorkflowBuilder::new("math", "Math Pipeline")
///     .description("doubles a number")
///     .then_step(double)
///     .build()
///     .unwrap();
/// assert_eq!(wf.id(), "math");
/// ```
pub struct WorkflowBuilder {
    id: String,
    name: String,
    description: String,
    version: String,
    config: ExecutionConfig,
    tags: HashMap<String, String>,
    custom_context: Option<Arc<dyn Any + Send + Sync>>,

    steps: HashMap<String, Arc<dyn StepExecutor>>,
    graph: ExecutionGraph,

    /// Step(s) new edges are drawn from.
    frontier: Vec<String>,
    /// First structural error hit mid-chain, reported from `build`.
    deferred_error: Option<BuildError>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0".into(),
            config: ExecutionConfig::default(),
            tags: HashMap::new(),
            custom_context: None,
            steps: HashMap::new(),
            graph: ExecutionGraph::new(),
            frontier: Vec::new(),
            deferred_error: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Default execution config inherited by steps that do not override it.
    pub fn default_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Attaches an arbitrary value handlers can retrieve through
    /// [`StepContext::custom`](crate::step::StepContext::custom).
    pub fn context<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.custom_context = Some(Arc::new(value));
        self
    }

    /// Appends a step after the current frontier.
    pub fn then_step(self, step: impl StepExecutor + 'static) -> Self {
        self.then_arc(Arc::new(step), NodeKind::Sequential)
    }

    /// Fans out from the frontier to several parallel-tagged steps; they
    /// all become the new frontier.
    pub fn parallel(mut self, steps: Vec<Arc<dyn StepExecutor>>) -> Self {
        let mut new_frontier = Vec::with_capacity(steps.len());
        for step in steps {
            let step_id = step.id().to_string();
            self.register(step, NodeKind::Parallel);
            self.link_from_frontier(&step_id);
            new_frontier.push(step_id);
        }
        self.frontier = new_frontier;
        self
    }

    /// Chains several steps in order.
    pub fn sequence(mut self, steps: Vec<Arc<dyn StepExecutor>>) -> Self {
        for step in steps {
            self = self.then_arc(step, NodeKind::Sequential);
        }
        self
    }

    /// Appends a step gated by `condition`. When the condition is false at
    /// runtime, `default` is used as the step's output (`None` yields the
    /// output type's zero value).
    pub fn then_step_if(
        self,
        step: impl StepExecutor + 'static,
        condition: Condition,
        default: Option<serde_json::Value>,
    ) -> Self {
        let wrapped = ConditionalWrapper::new(Arc::new(step), condition, default);
        self.then_arc(Arc::new(wrapped), NodeKind::Conditional)
    }

    /// Overrides the entry point; the step must already be added.
    pub fn set_entry_point(mut self, step_id: impl AsRef<str>) -> Self {
        if let Err(e) = self.graph.set_entry_point(step_id) {
            self.defer(e.into());
        }
        self
    }

    /// Finalizes the workflow: surfaces any deferred error, validates the
    /// graph, and checks step registration.
    pub fn build(self) -> Result<Workflow, BuildError> {
        if let Some(error) = self.deferred_error {
            return Err(error);
        }

        self.graph.validate()?;

        for step_id in self.graph.node_ids() {
            if !self.steps.contains_key(step_id) {
                return Err(BuildError::UnregisteredStep(step_id.to_string()));
            }
        }

        Ok(Workflow {
            id: self.id,
            name: self.name,
            description: self.description,
            version: self.version,
            steps: self.steps,
            graph: self.graph,
            config: self.config,
            tags: self.tags,
            created_at: Utc::now(),
            custom_context: self.custom_context,
        })
    }

    fn then_arc(mut self, step: Arc<dyn StepExecutor>, kind: NodeKind) -> Self {
        let step_id = step.id().to_string();
        self.register(step, kind);
        self.link_from_frontier(&step_id);
        self.frontier = vec![step_id];
        self
    }

    fn register(&mut self, step: Arc<dyn StepExecutor>, kind: NodeKind) {
        let step_id = step.id().to_string();
        if !self.steps.contains_key(&step_id) {
            self.steps.insert(step_id.clone(), step);
            self.graph.add_node(step_id, kind);
        }
    }

    fn link_from_frontier(&mut self, step_id: &str) {
        let frontier = std::mem::take(&mut self.frontier);
        for last_id in &frontier {
            if let Err(e) = self.graph.add_edge(last_id, step_id) {
                self.defer(e.into());
            }
        }
        self.frontier = frontier;
    }

    fn defer(&mut self, error: BuildError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(error);
        }
    }
}
