//! Node execution framework for the loomflow workflow system.
//!
//! This module provides the core abstractions for executable workflow nodes:
//! the [`NodeHandler`] trait, the per-invocation [`NodeContext`], result
//! payloads, and the execution error taxonomy.
//!
//! A node owns no graph knowledge — only a typed, asynchronous message
//! handler. The runtime's dispatch wrapper (see
//! [`crate::runtimes`]) supplies the context, commits scope
//! mutations after a successful invocation, and forwards the result along
//! the node's outbound links.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::event_bus::Event;
use crate::message::WorkflowMessage;
use crate::scopes::{EvalError, ExpressionEvaluator, Scopes};
use crate::types::{NodeId, NodeKind};

/// Core trait for executable workflow nodes.
///
/// A handler receives the inbound message and an execution context, performs
/// its work, and returns a result payload (or nothing, for terminal nodes).
/// Scoped state is read and written through the context; handlers never
/// retain cross-run mutable state on the node instance itself.
///
/// # Error Handling
///
/// Return `Err(NodeError)` for failures. Recognized
/// [`ExecutionError`]s propagate unchanged through the dispatch wrapper;
/// every other failure is wrapped into
/// [`ExecutionError::NodeFailure`] tagged with the node's id and kind.
///
/// # Examples
///
/// ```rust,no_run
/// use loomflow::node::{NodeHandler, NodeContext, NodeOutput, NodeError};
/// use loomflow::message::WorkflowMessage;
/// use loomflow::scopes::Scopes;
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// struct CountWords;
///
/// #[async_trait]
/// impl NodeHandler for CountWords {
///     async fn handle(
///         &self,
///         message: WorkflowMessage,
///         ctx: &mut NodeContext,
///     ) -> Result<NodeOutput, NodeError> {
///         let text = message.payload["text"]
///             .as_str()
///             .ok_or(NodeError::MissingInput { what: "text" })?;
///         let count = text.split_whitespace().count();
///         ctx.scopes.set(Scopes::GLOBAL, "word_count", json!(count));
///         Ok(NodeOutput::with_payload(json!({ "count": count })))
///     }
/// }
/// ```
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Execute this node against the inbound message.
    async fn handle(
        &self,
        message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError>;
}

/// Cooperative cancellation signal threaded through every invocation.
///
/// Cancellation is checked by the runner between supersteps and before scope
/// commits; long-running handlers should poll
/// [`is_cancelled`](Self::is_cancelled) between their own state mutations.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    /// A fresh, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Execution context passed to nodes during workflow execution.
///
/// Carries the node's identity, the run correlation id, the working copy of
/// the run's scoped state, the bound expression evaluator, the cancellation
/// signal, and the event channel. Scope mutations made through
/// [`scopes`](Self::scopes) are committed back to the run by the dispatch
/// wrapper only after the handler succeeds and the run is not cancelled.
pub struct NodeContext {
    /// Unique identifier of the executing node.
    pub node_id: NodeId,
    /// Structural kind of the executing node.
    pub node_kind: NodeKind,
    /// Correlation id for the run.
    pub run_id: String,
    /// Current superstep number.
    pub step: u64,
    /// Working copy of the run's scoped variable state.
    pub scopes: Scopes,
    /// Evaluator bound to this invocation's scopes.
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    /// Cooperative cancellation signal for the run.
    pub cancel: CancelSignal,
    /// Channel for emitting events to the run's event system.
    pub event_sender: flume::Sender<Event>,
}

impl NodeContext {
    /// Evaluate an expression against this invocation's active scopes.
    pub fn evaluate(&self, expr: &str) -> Result<Value, EvalError> {
        self.evaluator.evaluate(expr, &self.scopes)
    }

    /// Evaluate an expression and coerce the result to a boolean.
    pub fn evaluate_bool(&self, expr: &str) -> Result<bool, EvalError> {
        self.evaluator.evaluate_bool(expr, &self.scopes)
    }

    /// True once the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emit a node-scoped event enriched with this context's metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.event_sender
            .send(Event::node_message_with_meta(
                self.node_id.clone(),
                self.step,
                scope,
                message,
            ))
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }
}

/// Result of a node invocation.
///
/// `payload` of `None` means the node produced no outbound message, which
/// makes it terminal for its branch: the dispatch wrapper forwards nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeOutput {
    /// The result payload, forwarded to linked nodes inside a
    /// [`WorkflowMessage`].
    pub payload: Option<Value>,
}

impl NodeOutput {
    /// A terminal result with no outbound message.
    #[must_use]
    pub fn empty() -> Self {
        Self { payload: None }
    }

    /// A result that forwards `payload` to linked nodes.
    #[must_use]
    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload: Some(payload),
        }
    }
}

/// Errors that can occur when using `NodeContext` methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent because the event channel is disconnected.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(loomflow::node::event_bus_unavailable),
        help("The event bus may be disconnected. Check the run's state.")
    )]
    EventBusUnavailable,
}

/// Errors returned by node handlers.
///
/// Variants other than [`NodeError::Execution`] are wrapped by the dispatch
/// wrapper into [`ExecutionError::NodeFailure`]; `Execution` passes through
/// unchanged so callers can distinguish known bad state from wrapped
/// arbitrary failure.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the inbound message.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(loomflow::node::missing_input),
        help("Check that the upstream node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(loomflow::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(loomflow::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Expression evaluation failed.
    #[error(transparent)]
    #[diagnostic(code(loomflow::node::eval))]
    Eval(#[from] EvalError),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(loomflow::node::event_bus))]
    EventBus(#[from] NodeContextError),

    /// A recognized internal execution failure, rethrown unchanged.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),
}

/// Recognized internal execution failures.
///
/// Every unexpected handler failure surfaces through exactly one shape:
/// [`NodeFailure`](Self::NodeFailure), tagged with the originating node's id
/// and kind.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutionError {
    /// The run's scoped state could not be obtained for this node.
    #[error("execution context unavailable for node {node_id}")]
    #[diagnostic(
        code(loomflow::execution::context_unavailable),
        help("The run state was dropped or poisoned before this node executed.")
    )]
    ContextUnavailable { node_id: NodeId },

    /// Wraps any unexpected failure from a node handler.
    #[error("node {node_id} ({node_kind}) failed: {source}")]
    #[diagnostic(code(loomflow::execution::node_failure))]
    NodeFailure {
        node_id: NodeId,
        node_kind: NodeKind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Cancellation is observable through clones of the same signal.
    fn test_cancel_signal_shared() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    /// NodeOutput constructors produce the documented shapes.
    fn test_node_output() {
        assert_eq!(NodeOutput::empty().payload, None);
        assert_eq!(
            NodeOutput::with_payload(serde_json::json!(1)).payload,
            Some(serde_json::json!(1))
        );
    }

    #[test]
    /// NodeFailure carries the originating node id and kind in its message.
    fn test_node_failure_display() {
        let err = ExecutionError::NodeFailure {
            node_id: "step_1".to_string(),
            node_kind: NodeKind::Effect,
            source: "boom".into(),
        };
        let text = err.to_string();
        assert!(text.contains("step_1"));
        assert!(text.contains("Effect"));
        assert!(text.contains("boom"));
    }
}
