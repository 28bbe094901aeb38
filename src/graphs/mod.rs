//! Executable workflow graphs: nodes, links, and the builder that freezes
//! them into an immutable [`Workflow`].
//!
//! Graphs can be assembled by hand through [`GraphBuilder`] or produced by
//! the declarative compiler (see [`crate::compiler`]), which drives the
//! builder through the structural [`WorkflowModel`](crate::model::WorkflowModel).
//! Either way, [`GraphBuilder::compile`] validates link endpoints and the
//! start node before anything can run.

pub mod builder;
pub mod edges;
pub mod workflow;

pub use builder::{GraphBuilder, WorkflowNode};
pub use edges::{Link, LinkCondition};
pub use workflow::{GraphCompileError, Workflow};
