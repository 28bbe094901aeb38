//! Core types for the loomflow workflow framework.
//!
//! This module defines the fundamental types used throughout the system for
//! identifying nodes in compiled workflow graphs. These are the core domain
//! concepts that define what a workflow *is*; runtime execution types (run
//! ids, statuses) live in [`crate::runtimes`].
//!
//! # Key Types
//!
//! - [`NodeId`]: Stable string identifier for a node, unique within a graph
//! - [`NodeKind`]: The structural role a node plays in the compiled graph
//!
//! # Examples
//!
//! ```rust
//! use loomflow::types::NodeKind;
//!
//! let decision = NodeKind::Decision;
//! let custom = NodeKind::Custom("SummarizeThread".to_string());
//!
//! // Encode for persistence
//! assert_eq!(custom.encode(), "Custom:SummarizeThread");
//! assert_eq!(NodeKind::decode("Decision"), NodeKind::Decision);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a node within one workflow graph.
///
/// Ids come from the declarative action tree (each action carries its own
/// stable id) or are derived from it by the compiler (e.g. a scope's exit
/// node is `<scope_id>__exit`).
pub type NodeId = String;

/// The structural role of a node within a compiled workflow graph.
///
/// The compiler emits a fixed vocabulary of node kinds while translating the
/// declarative action tree; `Custom` covers nodes injected directly by a
/// caller. The set is closed so dispatch over it can be exhaustive.
///
/// # Persistence
///
/// `NodeKind` supports serialization through both serde and the
/// [`encode`](Self::encode)/[`decode`](Self::decode) methods.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Entry marker for a scope (a named sequential block of actions).
    ScopeEntry,
    /// Exit marker emitted once all of a scope's children are known.
    ScopeExit,
    /// Decision point for a condition group; its result payload records the
    /// matched branch.
    Decision,
    /// Join point emitted immediately after a decision node; branch tails
    /// link back to it.
    Restart,
    /// Entry marker for a single condition branch.
    Branch,
    /// Entry marker for a foreach loop; tagged so break/continue can locate
    /// their nearest enclosing loop.
    LoopEntry,
    /// Iterator-advance node; its result payload says whether more items
    /// remain.
    SelectItem,
    /// First node inside a loop body.
    LoopBodyStart,
    /// Final node of a loop body; links back to the select node.
    LoopBodyEnd,
    /// Post-loop continuation point; the no-more link and `break` target it.
    LoopContinuation,
    /// Break / continue / goto transfer node.
    Jump,
    /// Structural sibling emitted after a terminal jump so that nothing
    /// downstream chains off the jump. Never an edge endpoint.
    CleanStart,
    /// Opaque leaf action executed through an effect handler.
    Effect,
    /// Variable assignment leaf.
    SetVariable,
    /// Terminal end-of-conversation / end-of-dialog node.
    End,
    /// Caller-injected node identified by a user-defined string.
    Custom(String),
}

impl NodeKind {
    /// Encode a `NodeKind` into its persisted string form.
    ///
    /// The encoding is human-readable and forward-compatible: unit variants
    /// encode as their name, `Custom("X")` as `"Custom:X"`.
    ///
    /// ```rust
    /// # use loomflow::types::NodeKind;
    /// assert_eq!(NodeKind::LoopEntry.encode(), "LoopEntry");
    /// assert_eq!(NodeKind::Custom("Router".into()).encode(), "Custom:Router");
    /// ```
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Custom(s) => format!("Custom:{s}"),
            other => other.name().to_string(),
        }
    }

    /// Decode a persisted string form back into a `NodeKind`.
    ///
    /// Unrecognized formats fall back to `Custom(s)` for forward
    /// compatibility.
    ///
    /// ```rust
    /// # use loomflow::types::NodeKind;
    /// assert_eq!(NodeKind::decode("Decision"), NodeKind::Decision);
    /// assert_eq!(NodeKind::decode("Custom:Router"), NodeKind::Custom("Router".into()));
    /// assert_eq!(NodeKind::decode("whatever"), NodeKind::Custom("whatever".into()));
    /// ```
    pub fn decode(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix("Custom:") {
            return NodeKind::Custom(rest.to_string());
        }
        match s {
            "ScopeEntry" => NodeKind::ScopeEntry,
            "ScopeExit" => NodeKind::ScopeExit,
            "Decision" => NodeKind::Decision,
            "Restart" => NodeKind::Restart,
            "Branch" => NodeKind::Branch,
            "LoopEntry" => NodeKind::LoopEntry,
            "SelectItem" => NodeKind::SelectItem,
            "LoopBodyStart" => NodeKind::LoopBodyStart,
            "LoopBodyEnd" => NodeKind::LoopBodyEnd,
            "LoopContinuation" => NodeKind::LoopContinuation,
            "Jump" => NodeKind::Jump,
            "CleanStart" => NodeKind::CleanStart,
            "Effect" => NodeKind::Effect,
            "SetVariable" => NodeKind::SetVariable,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }

    /// The stable name of this kind (without any `Custom` payload).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            NodeKind::ScopeEntry => "ScopeEntry",
            NodeKind::ScopeExit => "ScopeExit",
            NodeKind::Decision => "Decision",
            NodeKind::Restart => "Restart",
            NodeKind::Branch => "Branch",
            NodeKind::LoopEntry => "LoopEntry",
            NodeKind::SelectItem => "SelectItem",
            NodeKind::LoopBodyStart => "LoopBodyStart",
            NodeKind::LoopBodyEnd => "LoopBodyEnd",
            NodeKind::LoopContinuation => "LoopContinuation",
            NodeKind::Jump => "Jump",
            NodeKind::CleanStart => "CleanStart",
            NodeKind::Effect => "Effect",
            NodeKind::SetVariable => "SetVariable",
            NodeKind::End => "End",
            NodeKind::Custom(s) => s,
        }
    }

    /// Returns `true` for clean-start marker nodes.
    #[must_use]
    pub fn is_clean_start(&self) -> bool {
        matches!(self, Self::CleanStart)
    }

    /// Returns `true` for terminal end nodes.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns `true` for caller-injected custom nodes.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Developer experience: allow string literals where a NodeKind is expected.
impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Round-trips every unit variant through encode/decode.
    fn test_encode_decode_round_trip() {
        let kinds = [
            NodeKind::ScopeEntry,
            NodeKind::ScopeExit,
            NodeKind::Decision,
            NodeKind::Restart,
            NodeKind::Branch,
            NodeKind::LoopEntry,
            NodeKind::SelectItem,
            NodeKind::LoopBodyStart,
            NodeKind::LoopBodyEnd,
            NodeKind::LoopContinuation,
            NodeKind::Jump,
            NodeKind::CleanStart,
            NodeKind::Effect,
            NodeKind::SetVariable,
            NodeKind::End,
            NodeKind::Custom("Router".to_string()),
        ];
        for kind in kinds {
            assert_eq!(NodeKind::decode(&kind.encode()), kind);
        }
    }

    #[test]
    /// Unknown encodings decode to Custom for forward compatibility.
    fn test_decode_unknown_falls_back_to_custom() {
        assert_eq!(
            NodeKind::decode("SomethingNew"),
            NodeKind::Custom("SomethingNew".to_string())
        );
    }

    #[test]
    /// Validates equality for Custom variants with different payloads.
    fn test_custom_variant_equality() {
        let k1 = NodeKind::Custom("foo".to_string());
        let k2 = NodeKind::Custom("foo".to_string());
        let k3 = NodeKind::Custom("bar".to_string());
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_predicates() {
        assert!(NodeKind::CleanStart.is_clean_start());
        assert!(!NodeKind::Jump.is_clean_start());
        assert!(NodeKind::End.is_end());
        assert!(NodeKind::Custom("x".into()).is_custom());
    }
}
