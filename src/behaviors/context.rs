//! Immutable context handed to behaviors.

use std::fmt;

use crate::message::WorkflowMessage;
use crate::types::{NodeId, NodeKind};

/// The lifecycle stage a behavior is executing in.
///
/// `Pre`/`Post` apply to node behaviors (before/after the continuation is
/// entered); `Starting`/`Ending` apply to run behaviors. The stage is
/// recorded on [`BehaviorError`](crate::behaviors::BehaviorError) when a
/// behavior faults, so operators can tell whether the wrapped operation had
/// already run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BehaviorStage {
    /// Before the node invocation (continuation not yet entered).
    Pre,
    /// After the node invocation (continuation was entered).
    Post,
    /// Whole-run wrap, before the first node executes.
    Starting,
    /// Whole-run wrap, after the run completed.
    Ending,
}

impl BehaviorStage {
    /// Stable lowercase label used in events and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BehaviorStage::Pre => "pre",
            BehaviorStage::Post => "post",
            BehaviorStage::Starting => "starting",
            BehaviorStage::Ending => "ending",
        }
    }
}

impl fmt::Display for BehaviorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only execution metadata a behavior observes.
///
/// For node-level interception the node fields and inbound message are
/// populated; for run-level interception they are `None`. Behaviors never
/// mutate the context — influence flows only through the continuation's
/// return value.
#[derive(Clone, Debug)]
pub struct BehaviorContext {
    /// The stage the chain was entered at. Node chains are entered at
    /// [`BehaviorStage::Pre`]; the post stage is implied by returning from
    /// the continuation.
    pub stage: BehaviorStage,
    /// Correlation id for the run.
    pub run_id: String,
    /// Id of the node being invoked, for node-level interception.
    pub node_id: Option<NodeId>,
    /// Kind of the node being invoked, for node-level interception.
    pub node_kind: Option<NodeKind>,
    /// The inbound message, for node-level interception.
    pub message: Option<WorkflowMessage>,
}

impl BehaviorContext {
    /// Context for wrapping a single node invocation.
    #[must_use]
    pub fn node_invocation(
        run_id: impl Into<String>,
        node_id: NodeId,
        node_kind: NodeKind,
        message: WorkflowMessage,
    ) -> Self {
        Self {
            stage: BehaviorStage::Pre,
            run_id: run_id.into(),
            node_id: Some(node_id),
            node_kind: Some(node_kind),
            message: Some(message),
        }
    }

    /// Context for the whole-run starting wrap.
    #[must_use]
    pub fn run_starting(run_id: impl Into<String>) -> Self {
        Self {
            stage: BehaviorStage::Starting,
            run_id: run_id.into(),
            node_id: None,
            node_kind: None,
            message: None,
        }
    }

    /// Context for the whole-run ending wrap.
    #[must_use]
    pub fn run_ending(run_id: impl Into<String>) -> Self {
        Self {
            stage: BehaviorStage::Ending,
            run_id: run_id.into(),
            node_id: None,
            node_kind: None,
            message: None,
        }
    }

    /// True when this context wraps a single node invocation.
    #[must_use]
    pub fn is_node_invocation(&self) -> bool {
        self.node_id.is_some()
    }
}
