//! Structural errors raised while modelling or finalizing a workflow.

use miette::Diagnostic;
use thiserror::Error;

use crate::types::NodeId;

/// Errors from workflow modelling and declarative compilation.
///
/// These are build-time structural failures: the workflow definition itself
/// is malformed. They never overlap with runtime execution or behavior
/// failures.
#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    /// A node named a parent that does not exist in the model.
    #[error("node {child} references unknown parent {parent}")]
    #[diagnostic(
        code(loomflow::model::unresolved_parent),
        help("Parents must be added to the model before their children.")
    )]
    UnresolvedParent { child: NodeId, parent: NodeId },

    /// An operation referenced a node id that does not exist.
    #[error("unknown node {id}")]
    #[diagnostic(code(loomflow::model::unresolved_step))]
    UnresolvedStep { id: NodeId },

    /// A link's target never materialized; typically a goto naming a
    /// nonexistent action.
    #[error("link from {origin} targets unknown node {target}")]
    #[diagnostic(
        code(loomflow::model::unresolved_target),
        help("Check goto targets and forward links against the action tree's ids.")
    )]
    UnresolvedTarget { origin: NodeId, target: NodeId },

    /// An action is missing a property the compiler requires.
    #[error("action {action_id} is missing required property {property}")]
    #[diagnostic(code(loomflow::model::missing_required_properties))]
    MissingRequiredProperties {
        action_id: String,
        property: &'static str,
    },

    /// A break or continue action has no enclosing loop.
    #[error("action {id} has no enclosing loop")]
    #[diagnostic(
        code(loomflow::model::no_enclosing_loop),
        help("break and continue are only valid inside a foreach body.")
    )]
    NoEnclosingLoop { id: NodeId },

    /// Two nodes were added with the same id.
    #[error("duplicate node id {id}")]
    #[diagnostic(
        code(loomflow::model::duplicate_step),
        help("Every action in the tree must carry a unique stable id.")
    )]
    DuplicateStep { id: NodeId },
}
