//! # loomflow
//!
//! A workflow orchestration runtime for AI-agent pipelines: a directed
//! graph of small stateful nodes passing typed messages, plus a compiler
//! that turns a declarative action tree — scopes, condition groups, loops,
//! jumps — into that executable graph.
//!
//! ## Architecture
//!
//! - [`types`] / [`message`] / [`scopes`] — ids, node kinds, the
//!   result-wrapper message, and scoped variable state with an external
//!   expression-evaluator seam.
//! - [`node`] — the async [`NodeHandler`](node::NodeHandler) contract and
//!   per-invocation context.
//! - [`model`] — the structural build model: parent/child tracking, depth,
//!   deferred completion callbacks, forward links.
//! - [`graphs`] — [`GraphBuilder`](graphs::GraphBuilder) and the frozen
//!   [`Workflow`](graphs::Workflow).
//! - [`compiler`] — the declarative
//!   [`DeclarativeCompiler`](compiler::DeclarativeCompiler) visitor.
//! - [`behaviors`] — middleware chains wrapping node invocations and the
//!   run lifecycle.
//! - [`event_bus`] — flume-backed event fan-out with pluggable sinks.
//! - [`runtimes`] — the superstep
//!   [`WorkflowRunner`](runtimes::WorkflowRunner), run handles, reports.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use loomflow::compiler::{Action, ConditionBranch, DeclarativeCompiler};
//! use loomflow::runtimes::{RuntimeConfig, WorkflowRunner};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = Action::scope(
//!     "support",
//!     vec![
//!         Action::set_variable("triage", "topic.queue", "\"general\""),
//!         Action::condition_group_with_else(
//!             "route",
//!             vec![ConditionBranch::new(
//!                 "vip",
//!                 "=global.is_vip",
//!                 vec![Action::effect("page", "notify_oncall", json!({}))],
//!             )],
//!             vec![Action::effect("queue", "enqueue", json!({}))],
//!         ),
//!     ],
//! );
//!
//! let workflow = DeclarativeCompiler::with_echo_effects()
//!     .translate(&tree)?
//!     .compile()?;
//! let runner = WorkflowRunner::new(workflow, RuntimeConfig::new());
//! let report = runner.run_to_completion(json!({"user": "ada"})).await?;
//! assert!(report.status.is_terminal());
//! # Ok(())
//! # }
//! ```

pub mod behaviors;
pub mod compiler;
pub mod event_bus;
pub mod graphs;
pub mod message;
pub mod model;
pub mod node;
pub mod runtimes;
pub mod scopes;
pub mod types;
