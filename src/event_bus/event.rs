//! Event types emitted during workflow execution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scope label attached to the diagnostic emitted when a run's event stream
/// is about to close.
pub const STREAM_END_SCOPE: &str = "__loomflow_stream_end__";

/// A single event on a run's event stream.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    /// Emitted by a node handler through its context.
    Node(NodeEvent),
    /// Runtime diagnostics (run started, stream end, and similar).
    Diagnostic(DiagnosticEvent),
    /// A run-level error: an execution or behavior failure surfaced as an
    /// event rather than unwinding the dispatch loop.
    RunError(RunErrorEvent),
}

impl Event {
    /// A node event without node metadata.
    pub fn node_message(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Node(NodeEvent {
            node_id: None,
            step: None,
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// A node event enriched with the emitting node's id and step.
    pub fn node_message_with_meta(
        node_id: impl Into<String>,
        step: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Node(NodeEvent {
            node_id: Some(node_id.into()),
            step: Some(step),
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// A runtime diagnostic.
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// The scope label of this event.
    #[must_use]
    pub fn scope_label(&self) -> &str {
        match self {
            Event::Node(node) => &node.scope,
            Event::Diagnostic(diag) => &diag.scope,
            Event::RunError(err) => err.scope.label(),
        }
    }

    /// The human-readable message of this event.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Event::Node(node) => &node.message,
            Event::Diagnostic(diag) => &diag.message,
            Event::RunError(err) => &err.message,
        }
    }

    /// True for run-level error events.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Event::RunError(_))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Node(node) => match (&node.node_id, node.step) {
                (Some(id), Some(step)) => write!(f, "[{id}@{step}] {}", node.message),
                (Some(id), None) => write!(f, "[{id}] {}", node.message),
                (None, Some(step)) => write!(f, "[step {step}] {}", node.message),
                (None, None) => write!(f, "{}", node.message),
            },
            Event::Diagnostic(diag) => write!(f, "({}) {}", diag.scope, diag.message),
            Event::RunError(err) => {
                write!(f, "error[{}] {} | {}", err.scope.label(), err.when, err.message)
            }
        }
    }
}

/// Event emitted by a node handler.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeEvent {
    /// Id of the emitting node, when known.
    pub node_id: Option<String>,
    /// Superstep number, when known.
    pub step: Option<u64>,
    /// Free-form scope label (e.g. "routing", "validation").
    pub scope: String,
    /// Event message text.
    pub message: String,
}

/// Runtime diagnostic event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

/// Where a run-level error originated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RunErrorScope {
    /// A node handler failed; carries the node's id and encoded kind.
    Node { node_id: String, node_kind: String },
    /// A behavior faulted; carries the behavior's type name and the stage it
    /// was executing in.
    Behavior { behavior: String, stage: String },
    /// The runner itself failed.
    Runner,
}

impl RunErrorScope {
    /// Short label for display and filtering.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            RunErrorScope::Node { .. } => "node",
            RunErrorScope::Behavior { .. } => "behavior",
            RunErrorScope::Runner => "runner",
        }
    }
}

/// A structured run-level error event.
///
/// Execution and behavior failures are reported through these events on the
/// run's stream, leaving the run in a terminal failed state rather than
/// silently dropping messages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunErrorEvent {
    /// When the error was recorded.
    pub when: DateTime<Utc>,
    /// Correlation id of the run.
    pub run_id: String,
    /// Origin of the failure.
    pub scope: RunErrorScope,
    /// Rendered error message.
    pub message: String,
    /// Optional structured context.
    #[serde(default)]
    pub context: Value,
}

impl RunErrorEvent {
    /// Record a node-scoped execution failure.
    pub fn node(
        run_id: impl Into<String>,
        node_id: impl Into<String>,
        node_kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            when: Utc::now(),
            run_id: run_id.into(),
            scope: RunErrorScope::Node {
                node_id: node_id.into(),
                node_kind: node_kind.into(),
            },
            message: message.into(),
            context: Value::Null,
        }
    }

    /// Record a behavior fault.
    pub fn behavior(
        run_id: impl Into<String>,
        behavior: impl Into<String>,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            when: Utc::now(),
            run_id: run_id.into(),
            scope: RunErrorScope::Behavior {
                behavior: behavior.into(),
                stage: stage.into(),
            },
            message: message.into(),
            context: Value::Null,
        }
    }

    /// Record a runner-scoped failure.
    pub fn runner(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            run_id: run_id.into(),
            scope: RunErrorScope::Runner,
            message: message.into(),
            context: Value::Null,
        }
    }

    /// Attach structured context to this event.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Display includes node metadata when present.
    fn test_node_event_display() {
        let event = Event::node_message_with_meta("router", 5, "routing", "picked branch 1");
        assert_eq!(format!("{event}"), "[router@5] picked branch 1");
        let plain = Event::node_message("routing", "hello");
        assert_eq!(format!("{plain}"), "hello");
    }

    #[test]
    /// Run error events carry origin metadata through serde.
    fn test_run_error_round_trip() {
        let event = Event::RunError(RunErrorEvent::behavior(
            "run-1",
            "AuditBehavior",
            "pre",
            "audit store offline",
        ));
        assert!(event.is_error());
        assert_eq!(event.scope_label(), "behavior");
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, parsed);
    }
}
