//! Structural records tracked while a declarative workflow is modelled.

use crate::graphs::{LinkCondition, WorkflowNode};
use crate::types::NodeId;

/// Structural marker attached to a model node so later build steps can find
/// it by role while walking ancestors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeTag {
    /// Marks a loop entry node. Break jumps target `continuation_id`;
    /// continue jumps target `select_id`.
    Loop {
        select_id: NodeId,
        continuation_id: NodeId,
    },
    /// Marks a scope entry node. Sequential chaining past the scope links
    /// from `exit_id`, not from the entry, so successors wait for the
    /// scope's body.
    Scope { exit_id: NodeId },
}

/// A node under construction, carrying the structural bookkeeping the final
/// executable graph no longer needs: its parent, accumulated children, tree
/// depth, and an optional role tag.
pub struct ModelNode {
    /// The executable record that will land in the compiled graph.
    pub node: WorkflowNode,
    /// Parent node id; `None` for roots.
    pub parent: Option<NodeId>,
    /// Child ids in insertion order. The last entry is the "last sibling"
    /// that sequential links chain from.
    pub children: Vec<NodeId>,
    /// Distance from the root: roots are 0, children one more than their
    /// parent.
    pub depth: u32,
    /// Optional structural role marker.
    pub tag: Option<NodeTag>,
}

impl ModelNode {
    /// The node's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.node.id
    }

    /// True for clean-start markers, which are never edge endpoints.
    #[must_use]
    pub fn is_clean_start(&self) -> bool {
        self.node.kind.is_clean_start()
    }
}

/// A pending link recorded during modelling; targets are resolved against
/// the finished node set when the model is finalized.
pub struct ModelLink {
    pub source: NodeId,
    pub target: NodeId,
    pub condition: Option<LinkCondition>,
}
