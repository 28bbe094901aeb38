//! Structural model of a workflow under construction.
//!
//! The declarative compiler does not write into a [`GraphBuilder`](crate::graphs::GraphBuilder)
//! directly; it drives a [`WorkflowModel`], which tracks the tree structure
//! the executable graph no longer needs — parent/child links, depth,
//! structural tags — plus two deferred mechanisms the translation rules
//! depend on:
//!
//! - **Completion callbacks** run once the whole tree has been visited, so
//!   a container can emit nodes (a scope's exit, a loop's continuation)
//!   that must come after all of its children.
//! - **Pending links** resolve their targets only at
//!   [`finalize`](WorkflowModel::finalize), so a link may point forward to
//!   a node a callback has yet to create.
//!
//! Finalize is strictly two-pass: every callback (including ones registered
//! by other callbacks) runs before any link is resolved.

pub mod builder;
pub mod errors;
pub mod node;

pub use builder::{CompletionCallback, WorkflowModel};
pub use errors::ModelError;
pub use node::{ModelLink, ModelNode, NodeTag};
