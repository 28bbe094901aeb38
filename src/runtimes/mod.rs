//! Workflow execution runtime.
//!
//! [`WorkflowRunner`] drives a compiled [`Workflow`](crate::graphs::Workflow)
//! in supersteps over a message frontier: every node with pending messages
//! is dispatched, its scope commits become visible, and its forwarded
//! messages form the next frontier. Messages converging on one target
//! within a step merge into a single fan-in invocation.
//!
//! Runs are observed and controlled through [`RunHandle`]: status,
//! cooperative cancellation, the event stream, and the final [`RunReport`].

pub mod runner;
pub mod runtime_config;

pub use runner::{RunHandle, RunReport, RunStatus, RunnerError, WorkflowRunner};
pub use runtime_config::{ExecutionMode, RuntimeConfig};
