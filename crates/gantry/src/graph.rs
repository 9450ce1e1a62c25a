//! Execution graph: the DAG a workflow runs over.
//!
//! Nodes are stored in a flat map keyed by step identifier; edges are
//! successor-id lists. The graph is a value with no state machine; all
//! structural guarantees (acyclicity, reachability, a valid entry point)
//! are checked by [`ExecutionGraph::validate`] at build time.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::step::Condition;

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Sequential,
    Parallel,
    Conditional,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::Sequential => "SEQUENTIAL",
            Self::Parallel => "PARALLEL",
            Self::Conditional => "CONDITIONAL",
        };
        f.write_str(token)
    }
}

/// Structural defects in an execution graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("execution graph has no entry point")]
    MissingEntryPoint,

    #[error("node {0} not found in graph")]
    UnknownNode(String),

    #[error("execution graph contains a cycle")]
    CycleDetected,

    #[error("node {0} is not reachable from the entry point")]
    Unreachable(String),
}

/// A node in the execution graph.
#[derive(Debug)]
pub struct GraphNode {
    pub step_id: String,
    pub kind: NodeKind,
    /// Successor step identifiers, in insertion order.
    pub next: Vec<String>,
    /// Optional gating conditions attached to the node. Not cloned with the
    /// graph and not consumed by the engine; conditional behavior lives in
    /// the conditional step wrapper.
    pub conditions: Vec<Condition>,
}

impl GraphNode {
    fn new(step_id: String, kind: NodeKind) -> Self {
        Self {
            step_id,
            kind,
            next: Vec::new(),
            conditions: Vec::new(),
        }
    }
}

/// The workflow execution flow: a node map plus a single entry point.
#[derive(Debug, Default)]
pub struct ExecutionGraph {
    entry_point: Option<String>,
    nodes: HashMap<String, GraphNode>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent node insertion. The first node added becomes the entry
    /// point unless one was set explicitly.
    pub fn add_node(&mut self, step_id: impl Into<String>, kind: NodeKind) {
        let step_id = step_id.into();
        self.nodes
            .entry(step_id.clone())
            .or_insert_with(|| GraphNode::new(step_id.clone(), kind));

        if self.entry_point.is_none() {
            self.entry_point = Some(step_id);
        }
    }

    /// Appends a directed edge; both endpoints must already exist. Parallel
    /// edges are not deduplicated.
    pub fn add_edge(
        &mut self,
        from: impl AsRef<str>,
        to: impl AsRef<str>,
    ) -> Result<(), GraphError> {
        let from = from.as_ref();
        let to = to.as_ref();

        if !self.nodes.contains_key(to) {
            return Err(GraphError::UnknownNode(to.to_string()));
        }
        let from_node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| GraphError::UnknownNode(from.to_string()))?;
        from_node.next.push(to.to_string());
        Ok(())
    }

    /// Overrides the entry point; the node must exist.
    pub fn set_entry_point(&mut self, step_id: impl AsRef<str>) -> Result<(), GraphError> {
        let step_id = step_id.as_ref();
        if !self.nodes.contains_key(step_id) {
            return Err(GraphError::UnknownNode(step_id.to_string()));
        }
        self.entry_point = Some(step_id.to_string());
        Ok(())
    }

    /// Attaches a gating condition to a node.
    pub fn add_condition(
        &mut self,
        step_id: impl AsRef<str>,
        condition: Condition,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(step_id.as_ref())
            .ok_or_else(|| GraphError::UnknownNode(step_id.as_ref().to_string()))?;
        node.conditions.push(condition);
        Ok(())
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    pub fn node(&self, step_id: &str) -> Option<&GraphNode> {
        self.nodes.get(step_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate successors of a node.
    pub fn successors(&self, step_id: &str) -> Result<&[String], GraphError> {
        self.nodes
            .get(step_id)
            .map(|node| node.next.as_slice())
            .ok_or_else(|| GraphError::UnknownNode(step_id.to_string()))
    }

    /// True if the node exists and has no outgoing edges.
    pub fn is_terminal(&self, step_id: &str) -> bool {
        self.nodes
            .get(step_id)
            .map(|node| node.next.is_empty())
            .unwrap_or(false)
    }

    /// Succeeds iff the entry point is set and exists, no directed cycle is
    /// reachable from any node, and every node is reachable from the entry
    /// point.
    pub fn validate(&self) -> Result<(), GraphError> {
        let entry = self
            .entry_point
            .as_deref()
            .ok_or(GraphError::MissingEntryPoint)?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::UnknownNode(entry.to_string()));
        }

        // DFS with a recursion-stack marker for cycle detection.
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for node_id in self.nodes.keys() {
            if !visited.contains(node_id.as_str())
                && self.has_cycle(node_id, &mut visited, &mut rec_stack)
            {
                return Err(GraphError::CycleDetected);
            }
        }

        let reachable = self.reachable_from(entry);
        if reachable.len() != self.nodes.len() {
            let unreachable = self
                .nodes
                .keys()
                .find(|id| !reachable.contains(id.as_str()))
                .cloned()
                .unwrap_or_default();
            return Err(GraphError::Unreachable(unreachable));
        }

        Ok(())
    }

    fn has_cycle<'a>(
        &'a self,
        node_id: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> bool {
        visited.insert(node_id);
        rec_stack.insert(node_id);

        if let Some(node) = self.nodes.get(node_id) {
            for next_id in &node.next {
                if !visited.contains(next_id.as_str()) {
                    if self.has_cycle(next_id, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.contains(next_id.as_str()) {
                    return true;
                }
            }
        }

        rec_stack.remove(node_id);
        false
    }

    fn reachable_from<'a>(&'a self, start: &'a str) -> HashSet<&'a str> {
        let mut reachable = HashSet::new();
        let mut stack = vec![start];
        while let Some(node_id) = stack.pop() {
            if !reachable.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(node_id) {
                stack.extend(node.next.iter().map(String::as_str));
            }
        }
        reachable
    }

    /// A linearization consistent with successor order, computed by a
    /// post-order DFS from the entry point with reverse append. Validates
    /// the graph first, so unreachable nodes never appear.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.validate()?;

        let Some(entry) = self.entry_point.as_deref() else {
            return Err(GraphError::MissingEntryPoint);
        };
        let mut visited = HashSet::new();
        let mut postorder = Vec::with_capacity(self.nodes.len());
        self.visit_postorder(entry, &mut visited, &mut postorder);
        postorder.reverse();
        Ok(postorder)
    }

    fn visit_postorder<'a>(
        &'a self,
        node_id: &'a str,
        visited: &mut HashSet<&'a str>,
        postorder: &mut Vec<String>,
    ) {
        if !visited.insert(node_id) {
            return;
        }
        if let Some(node) = self.nodes.get(node_id) {
            for next_id in &node.next {
                self.visit_postorder(next_id, visited, postorder);
            }
        }
        postorder.push(node_id.to_string());
    }
}

impl Clone for ExecutionGraph {
    /// Deep-copies nodes and successor lists. Conditions are closures and
    /// are intentionally not cloned.
    fn clone(&self) -> Self {
        let nodes = self
            .nodes
            .iter()
            .map(|(id, node)| {
                (
                    id.clone(),
                    GraphNode {
                        step_id: node.step_id.clone(),
                        kind: node.kind,
                        next: node.next.clone(),
                        conditions: Vec::new(),
                    },
                )
            })
            .collect();
        Self {
            entry_point: self.entry_point.clone(),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> ExecutionGraph {
        let mut graph = ExecutionGraph::new();
        graph.add_node("a", NodeKind::Sequential);
        graph.add_node("b", NodeKind::Sequential);
        graph.add_node("c", NodeKind::Sequential);
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "c").unwrap();
        graph
    }

    #[test]
    fn test_first_node_becomes_entry_point() {
        let graph = linear_graph();
        assert_eq!(graph.entry_point(), Some("a"));
    }

    #[test]
    fn test_add_node_idempotent() {
        let mut graph = linear_graph();
        graph.add_node("a", NodeKind::Parallel);
        assert_eq!(graph.len(), 3);
        // Re-adding does not overwrite the original kind.
        assert_eq!(graph.node("a").unwrap().kind, NodeKind::Sequential);
    }

    #[test]
    fn test_add_edge_unknown_node() {
        let mut graph = linear_graph();
        assert_eq!(
            graph.add_edge("a", "missing"),
            Err(GraphError::UnknownNode("missing".into()))
        );
        assert_eq!(
            graph.add_edge("missing", "a"),
            Err(GraphError::UnknownNode("missing".into()))
        );
    }

    #[test]
    fn test_set_entry_point() {
        let mut graph = linear_graph();
        assert!(graph.set_entry_point("b").is_ok());
        assert_eq!(graph.entry_point(), Some("b"));
        assert_eq!(
            graph.set_entry_point("missing"),
            Err(GraphError::UnknownNode("missing".into()))
        );
    }

    #[test]
    fn test_validate_empty_graph() {
        let graph = ExecutionGraph::new();
        assert_eq!(graph.validate(), Err(GraphError::MissingEntryPoint));
    }

    #[test]
    fn test_validate_linear() {
        assert!(linear_graph().validate().is_ok());
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut graph = linear_graph();
        graph.add_edge("c", "a").unwrap();
        assert_eq!(graph.validate(), Err(GraphError::CycleDetected));
    }

    #[test]
    fn test_validate_detects_self_loop() {
        let mut graph = linear_graph();
        graph.add_edge("b", "b").unwrap();
        assert_eq!(graph.validate(), Err(GraphError::CycleDetected));
    }

    #[test]
    fn test_validate_detects_unreachable() {
        let mut graph = linear_graph();
        graph.add_node("orphan", NodeKind::Sequential);
        assert_eq!(
            graph.validate(),
            Err(GraphError::Unreachable("orphan".into()))
        );
    }

    #[test]
    fn test_topological_order_linear() {
        let order = linear_graph().topological_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topological_order_diamond() {
        let mut graph = ExecutionGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.add_node(id, NodeKind::Sequential);
        }
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", "c").unwrap();
        graph.add_edge("b", "d").unwrap();
        graph.add_edge("c", "d").unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 4);
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_topological_order_every_node_once() {
        let order = linear_graph().topological_order().unwrap();
        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
    }

    #[test]
    fn test_successors_and_terminal() {
        let graph = linear_graph();
        assert_eq!(graph.successors("a").unwrap(), ["b".to_string()]);
        assert!(graph.successors("c").unwrap().is_empty());
        assert!(graph.is_terminal("c"));
        assert!(!graph.is_terminal("a"));
        assert!(!graph.is_terminal("missing"));
        assert!(matches!(
            graph.successors("missing"),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_clone_drops_conditions() {
        let mut graph = linear_graph();
        graph
            .add_condition("b", Condition::new(|_ctx| async { Ok(true) }))
            .unwrap();
        assert_eq!(graph.node("b").unwrap().conditions.len(), 1);

        let clone = graph.clone();
        assert_eq!(clone.len(), 3);
        assert_eq!(clone.entry_point(), Some("a"));
        assert!(clone.node("b").unwrap().conditions.is_empty());
        assert_eq!(clone.node("a").unwrap().next, vec!["b".to_string()]);
    }
}
