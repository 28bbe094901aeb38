//! Cross-cutting behavior (middleware) pipelines.
//!
//! Two independent interceptor chains wrap workflow execution:
//!
//! - **Node behaviors** wrap every single node invocation. Registered
//!   behaviors run in registration order on the way in (pre stage) and in
//!   reverse order on the way out (post stage) — the first-registered
//!   behavior is outermost.
//! - **Run behaviors** wrap the run as a whole, firing once at starting
//!   (before the first node executes) and once at ending (when the run
//!   completes), with the same FIFO/outermost ordering.
//!
//! Both chains use a continuation-passing contract: a behavior receives an
//! immutable [`BehaviorContext`] and a continuation ([`NodeNext`] /
//! [`RunNext`]), and may call the continuation and return its result
//! (unchanged or transformed), return a value without calling it
//! (short-circuit — the wrapped operation never runs), or fail.
//!
//! A behavior's own fault is rewrapped into a [`BehaviorError`] carrying the
//! behavior's type name and the stage it was executing in, and surfaced as a
//! run-level error event rather than unwinding the dispatch loop. Errors
//! from the wrapped operation pass through continuations unchanged.
//!
//! The chain is an explicit ordered list driven by an index-based
//! continuation; with zero behaviors registered the wrapped operation is
//! invoked directly, with no interception machinery allocated.
//!
//! # Examples
//!
//! ```
//! use loomflow::behaviors::{
//!     BehaviorContext, BehaviorFailure, NodeBehavior, NodeNext,
//! };
//! use loomflow::node::NodeOutput;
//! use async_trait::async_trait;
//!
//! struct Timing;
//!
//! #[async_trait]
//! impl NodeBehavior for Timing {
//!     fn name(&self) -> &str {
//!         "Timing"
//!     }
//!
//!     async fn invoke(
//!         &self,
//!         cx: &BehaviorContext,
//!         next: NodeNext<'_>,
//!     ) -> Result<NodeOutput, BehaviorFailure> {
//!         let started = std::time::Instant::now();
//!         let result = next.run(cx).await?;
//!         tracing::debug!(elapsed = ?started.elapsed(), node = ?cx.node_id, "node timed");
//!         Ok(result)
//!     }
//! }
//! ```

mod builtin;
mod context;
mod pipeline;

pub use builtin::TracingBehavior;
pub use context::{BehaviorContext, BehaviorStage};
pub use pipeline::{
    BehaviorError, BehaviorFailure, DispatchError, NodeBehavior, NodeBehaviorPipeline,
    NodeNext, NodeOperation, RunBehavior, RunBehaviorPipeline, RunNext, RunOperation,
};
