//! Links between nodes in a compiled workflow graph.

use std::fmt;
use std::sync::Arc;

use crate::message::WorkflowMessage;
use crate::types::NodeId;

/// Predicate deciding whether a link accepts a forwarded message.
///
/// Conditions inspect only the message (typically a decision node's result
/// payload); they never touch scoped state, which keeps routing deterministic
/// for a given set of superstep outputs.
pub type LinkCondition = Arc<dyn Fn(&WorkflowMessage) -> bool + Send + Sync>;

/// An outbound link from one node to another.
///
/// Unconditional links always forward; guarded links forward only when their
/// condition accepts the message.
#[derive(Clone)]
pub struct Link {
    /// Id of the target node.
    pub target: NodeId,
    /// Optional routing predicate.
    pub condition: Option<LinkCondition>,
}

impl Link {
    /// A link that always forwards.
    #[must_use]
    pub fn unconditional(target: impl Into<NodeId>) -> Self {
        Self {
            target: target.into(),
            condition: None,
        }
    }

    /// A link guarded by a routing predicate.
    #[must_use]
    pub fn guarded(target: impl Into<NodeId>, condition: LinkCondition) -> Self {
        Self {
            target: target.into(),
            condition: Some(condition),
        }
    }

    /// True when this link carries a routing predicate.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    /// Whether this link forwards the given message.
    #[must_use]
    pub fn accepts(&self, message: &WorkflowMessage) -> bool {
        match &self.condition {
            Some(condition) => condition(message),
            None => true,
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("target", &self.target)
            .field("conditional", &self.is_conditional())
            .finish()
    }
}
