//! The immutable compiled workflow graph.

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::behaviors::{NodeBehaviorPipeline, RunBehaviorPipeline};
use crate::types::NodeId;

use super::builder::WorkflowNode;
use super::edges::Link;

/// A validated, immutable workflow graph ready for execution.
///
/// Produced by [`GraphBuilder::compile`](super::GraphBuilder::compile).
/// Cheap to share: runners take it behind an `Arc` and never mutate it.
pub struct Workflow {
    start: NodeId,
    nodes: FxHashMap<NodeId, WorkflowNode>,
    links: FxHashMap<NodeId, Vec<Link>>,
    link_count: usize,
    has_unsupported_actions: bool,
    node_behaviors: Option<Arc<NodeBehaviorPipeline>>,
    run_behaviors: Option<Arc<RunBehaviorPipeline>>,
}

impl Workflow {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        start: NodeId,
        nodes: FxHashMap<NodeId, WorkflowNode>,
        links: FxHashMap<NodeId, Vec<Link>>,
        link_count: usize,
        has_unsupported_actions: bool,
        node_behaviors: Option<Arc<NodeBehaviorPipeline>>,
        run_behaviors: Option<Arc<RunBehaviorPipeline>>,
    ) -> Self {
        Self {
            start,
            nodes,
            links,
            link_count,
            has_unsupported_actions,
            node_behaviors,
            run_behaviors,
        }
    }

    /// Id of the node the run begins at.
    #[must_use]
    pub fn start_id(&self) -> &str {
        &self.start
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    /// True when the graph contains the given node id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in the graph, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes.values()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of links in the graph.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.link_count
    }

    /// Outbound links from the given node. Unknown ids have no links.
    #[must_use]
    pub fn links_from(&self, id: &str) -> &[Link] {
        self.links.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All links in the graph as `(source, link)` pairs.
    pub fn links(&self) -> impl Iterator<Item = (&NodeId, &Link)> {
        self.links
            .iter()
            .flat_map(|(from, links)| links.iter().map(move |l| (from, l)))
    }

    /// True when the source action tree contained actions the compiler does
    /// not support; such workflows compile but refuse to run.
    #[must_use]
    pub fn has_unsupported_actions(&self) -> bool {
        self.has_unsupported_actions
    }

    /// The node behavior chain, absent when none were registered.
    #[must_use]
    pub fn node_behaviors(&self) -> Option<&Arc<NodeBehaviorPipeline>> {
        self.node_behaviors.as_ref()
    }

    /// The run behavior chain, absent when none were registered.
    #[must_use]
    pub fn run_behaviors(&self) -> Option<&Arc<RunBehaviorPipeline>> {
        self.run_behaviors.as_ref()
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("start", &self.start)
            .field("nodes", &self.nodes.len())
            .field("links", &self.link_count)
            .field("has_unsupported_actions", &self.has_unsupported_actions)
            .finish()
    }
}

/// Errors from freezing a builder into a [`Workflow`].
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    /// No start node was set.
    #[error("graph has no start node")]
    #[diagnostic(
        code(loomflow::graphs::missing_start),
        help("Call GraphBuilder::with_start, or compile through the declarative compiler.")
    )]
    MissingStart,

    /// The configured start node was never added.
    #[error("start node {id} does not exist in the graph")]
    #[diagnostic(code(loomflow::graphs::unknown_start))]
    UnknownStart { id: NodeId },

    /// A link references a node that was never added.
    #[error("link {from} -> {to} references a node that does not exist")]
    #[diagnostic(
        code(loomflow::graphs::unknown_link_endpoint),
        help("Every link endpoint must be added as a node before compiling.")
    )]
    UnknownLinkEndpoint { from: NodeId, to: NodeId },
}
