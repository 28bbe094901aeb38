//! Fluent construction of workflow graphs.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::behaviors::{NodeBehavior, NodeBehaviorPipeline, RunBehavior, RunBehaviorPipeline};
use crate::node::NodeHandler;
use crate::types::{NodeId, NodeKind};

use super::edges::{Link, LinkCondition};
use super::workflow::{GraphCompileError, Workflow};

/// A single executable node record in a graph.
///
/// Pairs the node's identity and structural kind with its handler. The
/// handler is shared behind an `Arc` because a node may be invoked from
/// several supersteps and, in concurrent mode, from several tasks.
#[derive(Clone)]
pub struct WorkflowNode {
    /// Unique id within the graph.
    pub id: NodeId,
    /// Structural kind, used for dispatch and diagnostics.
    pub kind: NodeKind,
    /// Disabled nodes are skipped by dispatch: inbound messages forward
    /// along outbound links as if the node were a no-op.
    pub disabled: bool,
    /// The node's message handler.
    pub handler: Arc<dyn NodeHandler>,
}

impl WorkflowNode {
    /// Create an enabled node.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, handler: Arc<dyn NodeHandler>) -> Self {
        Self {
            id: id.into(),
            kind,
            disabled: false,
            handler,
        }
    }

    /// Set the disabled flag.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

impl fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Fluent builder for executable workflow graphs.
///
/// Used directly for hand-assembled graphs, and as the output target of
/// [`WorkflowModel::finalize`](crate::model::WorkflowModel::finalize) for
/// compiled declarative workflows. [`compile`](Self::compile) validates the
/// assembled graph and freezes it into an immutable [`Workflow`].
///
/// # Examples
///
/// ```rust,no_run
/// use loomflow::graphs::{GraphBuilder, WorkflowNode};
/// use loomflow::types::NodeKind;
/// # use std::sync::Arc;
/// # use loomflow::node::NodeHandler;
/// # fn handler() -> Arc<dyn NodeHandler> { unimplemented!() }
///
/// let workflow = GraphBuilder::new()
///     .add_node(WorkflowNode::new("a", NodeKind::Custom("A".into()), handler()))
///     .add_node(WorkflowNode::new("b", NodeKind::Custom("B".into()), handler()))
///     .add_link("a", "b")
///     .with_start("a")
///     .compile()
///     .expect("valid graph");
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    nodes: FxHashMap<NodeId, WorkflowNode>,
    links: FxHashMap<NodeId, Vec<Link>>,
    link_count: usize,
    start: Option<NodeId>,
    has_unsupported_actions: bool,
    node_behaviors: Vec<Arc<dyn NodeBehavior>>,
    run_behaviors: Vec<Arc<dyn RunBehavior>>,
}

impl fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("nodes", &self.nodes.len())
            .field("links", &self.link_count)
            .field("start", &self.start)
            .finish()
    }
}

impl GraphBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Re-adding an id replaces the previous record.
    #[must_use]
    pub fn add_node(mut self, node: WorkflowNode) -> Self {
        self.insert_node(node);
        self
    }

    /// Add an unconditional link.
    #[must_use]
    pub fn add_link(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.insert_link(from.into(), Link::unconditional(to));
        self
    }

    /// Add a link guarded by a routing predicate.
    #[must_use]
    pub fn add_conditional_link(
        mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        condition: LinkCondition,
    ) -> Self {
        self.insert_link(from.into(), Link::guarded(to, condition));
        self
    }

    /// Set the start node.
    #[must_use]
    pub fn with_start(mut self, id: impl Into<NodeId>) -> Self {
        self.start = Some(id.into());
        self
    }

    /// Register a node behavior. Registration order is interception order;
    /// the first registered behavior is outermost.
    #[must_use]
    pub fn with_node_behavior(mut self, behavior: Arc<dyn NodeBehavior>) -> Self {
        self.node_behaviors.push(behavior);
        self
    }

    /// Register a run behavior. Registration order is interception order.
    #[must_use]
    pub fn with_run_behavior(mut self, behavior: Arc<dyn RunBehavior>) -> Self {
        self.run_behaviors.push(behavior);
        self
    }

    pub(crate) fn insert_node(&mut self, node: WorkflowNode) {
        if self.nodes.contains_key(&node.id) {
            warn!(id = %node.id, "replacing existing node");
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn insert_link(&mut self, from: NodeId, link: Link) {
        self.link_count += 1;
        self.links.entry(from).or_default().push(link);
    }

    pub(crate) fn set_start_if_unset(&mut self, id: NodeId) {
        if self.start.is_none() {
            self.start = Some(id);
        }
    }

    pub(crate) fn mark_unsupported_actions(&mut self) {
        self.has_unsupported_actions = true;
    }

    /// Validate and freeze the graph.
    ///
    /// Fails when no start node is set, the start node is unknown, or any
    /// link references a node that was never added.
    pub fn compile(self) -> Result<Workflow, GraphCompileError> {
        let start = self.start.ok_or(GraphCompileError::MissingStart)?;
        if !self.nodes.contains_key(&start) {
            return Err(GraphCompileError::UnknownStart { id: start });
        }
        for (from, links) in &self.links {
            if !self.nodes.contains_key(from) {
                return Err(GraphCompileError::UnknownLinkEndpoint {
                    from: from.clone(),
                    to: links.first().map(|l| l.target.clone()).unwrap_or_default(),
                });
            }
            for link in links {
                if !self.nodes.contains_key(&link.target) {
                    return Err(GraphCompileError::UnknownLinkEndpoint {
                        from: from.clone(),
                        to: link.target.clone(),
                    });
                }
            }
        }

        // Zero registered behaviors means no pipeline at all: dispatch takes
        // the direct path without touching interception machinery.
        let node_behaviors = if self.node_behaviors.is_empty() {
            None
        } else {
            Some(Arc::new(NodeBehaviorPipeline::new(self.node_behaviors)))
        };
        let run_behaviors = if self.run_behaviors.is_empty() {
            None
        } else {
            Some(Arc::new(RunBehaviorPipeline::new(self.run_behaviors)))
        };

        Ok(Workflow::assemble(
            start,
            self.nodes,
            self.links,
            self.link_count,
            self.has_unsupported_actions,
            node_behaviors,
            run_behaviors,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::WorkflowMessage;
    use crate::node::{NodeContext, NodeError, NodeOutput};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl NodeHandler for Echo {
        async fn handle(
            &self,
            message: WorkflowMessage,
            _ctx: &mut NodeContext,
        ) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::with_payload(message.payload))
        }
    }

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeKind::Custom(id.to_uppercase()), Arc::new(Echo))
    }

    #[test]
    /// A linear graph compiles and preserves its shape.
    fn test_linear_graph_compiles() {
        let workflow = GraphBuilder::new()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_link("a", "b")
            .with_start("a")
            .compile()
            .expect("valid graph");
        assert_eq!(workflow.start_id(), "a");
        assert_eq!(workflow.node_count(), 2);
        assert_eq!(workflow.links_from("a").len(), 1);
        assert!(workflow.links_from("b").is_empty());
    }

    #[test]
    /// Compilation requires a known start node.
    fn test_missing_and_unknown_start() {
        let err = GraphBuilder::new()
            .add_node(node("a"))
            .compile()
            .expect_err("no start set");
        assert!(matches!(err, GraphCompileError::MissingStart));

        let err = GraphBuilder::new()
            .add_node(node("a"))
            .with_start("ghost")
            .compile()
            .expect_err("unknown start");
        assert!(matches!(err, GraphCompileError::UnknownStart { .. }));
    }

    #[test]
    /// Links must reference added nodes on both ends.
    fn test_dangling_link_rejected() {
        let err = GraphBuilder::new()
            .add_node(node("a"))
            .add_link("a", "ghost")
            .with_start("a")
            .compile()
            .expect_err("dangling link");
        match err {
            GraphCompileError::UnknownLinkEndpoint { from, to } => {
                assert_eq!(from, "a");
                assert_eq!(to, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
