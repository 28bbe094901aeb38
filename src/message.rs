//! The result-wrapper message that flows along workflow links.
//!
//! Every successful node invocation produces a [`WorkflowMessage`]: the
//! source node's id plus the JSON payload of its result. The runtime routes
//! that message along the source's outbound links; link conditions are
//! evaluated against it. At a fan-in point, messages from several branches
//! delivered in the same superstep merge into one message carrying every
//! contributing source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NodeId;

/// A message dispatched from one node to its linked successors.
///
/// Messages are immutable once created; the only mutation point in the
/// system is the scoped variable state, which nodes reach through their
/// context rather than through the message.
///
/// # Examples
///
/// ```
/// use loomflow::message::WorkflowMessage;
/// use serde_json::json;
///
/// let initial = WorkflowMessage::input(json!({"text": "hello"}));
/// assert!(initial.sources().is_empty());
///
/// let result = WorkflowMessage::result("classify", json!({"label": "greeting"}));
/// assert_eq!(result.source(), Some("classify"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowMessage {
    /// Nodes that contributed this message. Empty for the run's initial
    /// input; one entry for a normal dispatch; several after a fan-in merge.
    pub sources: Vec<NodeId>,
    /// The result payload produced by the source node (or the run input).
    pub payload: Value,
}

impl WorkflowMessage {
    /// Creates the initial input message for a run (no source node).
    #[must_use]
    pub fn input(payload: Value) -> Self {
        Self {
            sources: Vec::new(),
            payload,
        }
    }

    /// Creates a result message from a single source node.
    #[must_use]
    pub fn result(source: impl Into<NodeId>, payload: Value) -> Self {
        Self {
            sources: vec![source.into()],
            payload,
        }
    }

    /// Merges messages from several branches into one fan-in message.
    ///
    /// Source ids are concatenated in delivery order; payloads collapse to
    /// the single payload when only one message contributed, otherwise to a
    /// JSON array of all payloads.
    #[must_use]
    pub fn merge(messages: Vec<WorkflowMessage>) -> Self {
        if messages.len() == 1 {
            return messages.into_iter().next().expect("len checked");
        }
        let mut sources = Vec::new();
        let mut payloads = Vec::new();
        for message in messages {
            sources.extend(message.sources);
            payloads.push(message.payload);
        }
        Self {
            sources,
            payload: Value::Array(payloads),
        }
    }

    /// The single source of this message, if exactly one node produced it.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        match self.sources.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// All contributing sources (empty for the initial input).
    #[must_use]
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Returns true if this message came (at least in part) from `node_id`.
    #[must_use]
    pub fn is_from(&self, node_id: &str) -> bool {
        self.sources.iter().any(|s| s == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    /// Verifies constructors populate sources and payload as documented.
    fn test_construction() {
        let input = WorkflowMessage::input(json!("go"));
        assert!(input.sources().is_empty());
        assert_eq!(input.source(), None);

        let result = WorkflowMessage::result("a", json!(1));
        assert_eq!(result.source(), Some("a"));
        assert!(result.is_from("a"));
        assert!(!result.is_from("b"));
    }

    #[test]
    /// A single-message merge is the identity; multi-message merges collect
    /// sources and array-wrap payloads.
    fn test_merge() {
        let single = WorkflowMessage::merge(vec![WorkflowMessage::result("a", json!(1))]);
        assert_eq!(single, WorkflowMessage::result("a", json!(1)));

        let merged = WorkflowMessage::merge(vec![
            WorkflowMessage::result("a", json!(1)),
            WorkflowMessage::result("b", json!(2)),
        ]);
        assert_eq!(merged.sources(), &["a".to_string(), "b".to_string()]);
        assert_eq!(merged.payload, json!([1, 2]));
        assert_eq!(merged.source(), None);
    }

    #[test]
    /// Messages serialize and deserialize losslessly.
    fn test_serialization() {
        let original = WorkflowMessage::result("node", json!({"k": true}));
        let json = serde_json::to_string(&original).expect("serialize");
        let parsed: WorkflowMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(original, parsed);
    }
}
