//! Interceptor chains and their error types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use thiserror::Error;

use crate::node::{ExecutionError, NodeOutput};

use super::context::{BehaviorContext, BehaviorStage};

/// The wrapped node operation at the bottom of a node behavior chain.
pub type NodeOperation<'a> = BoxFuture<'a, Result<NodeOutput, DispatchError>>;

/// The wrapped run operation at the bottom of a run behavior chain.
pub type RunOperation<'a> = BoxFuture<'a, Result<(), DispatchError>>;

/// Failure surfaced by the dispatch wrapper for one invocation.
///
/// The two variants do not overlap: `Execution` is the wrapped operation
/// failing, `Behavior` is interception machinery failing. A single fault
/// produces exactly one of these.
#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    /// The node (or run) operation itself failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),

    /// A behavior faulted while intercepting.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Behavior(#[from] BehaviorError),
}

/// A behavior's own fault, rewrapped with attribution.
///
/// Carries the behavior's name and the stage it was executing in so a single
/// run-level error event can say which interceptor broke and whether the
/// wrapped operation had already run.
#[derive(Debug, Error, Diagnostic)]
#[error("behavior {behavior} faulted at {stage} stage: {source}")]
#[diagnostic(
    code(loomflow::behavior::fault),
    help("The failure is in the behavior itself, not the wrapped node or run.")
)]
pub struct BehaviorError {
    /// Name of the faulting behavior.
    pub behavior: String,
    /// Stage the behavior was executing in when it faulted.
    pub stage: BehaviorStage,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// What a behavior returns when it does not produce a result.
///
/// `Inner` carries a failure from deeper in the chain; `?` on the
/// continuation's result produces it automatically, so pass-through
/// behaviors propagate inner failures without rewrapping. `Fault` marks the
/// behavior's own code as the origin and is what gets rewrapped into a
/// [`BehaviorError`].
#[derive(Debug)]
pub enum BehaviorFailure {
    /// The behavior's own code faulted.
    Fault(Box<dyn std::error::Error + Send + Sync>),
    /// A failure from deeper in the chain, passing through unchanged.
    Inner(DispatchError),
}

impl BehaviorFailure {
    /// Mark a failure as originating in the behavior itself.
    pub fn fault(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        BehaviorFailure::Fault(err.into())
    }
}

impl From<DispatchError> for BehaviorFailure {
    fn from(err: DispatchError) -> Self {
        BehaviorFailure::Inner(err)
    }
}

/// Interceptor around every single node invocation.
///
/// Implementations receive the read-only [`BehaviorContext`] and a
/// [`NodeNext`] continuation. Calling `next.run(cx).await` executes the rest
/// of the chain and then the node; not calling it short-circuits the
/// invocation and the behavior's own return value stands in for the node's.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Name used to attribute faults and error events. Defaults to the
    /// implementing type's name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Intercept one node invocation.
    async fn invoke(
        &self,
        cx: &BehaviorContext,
        next: NodeNext<'_>,
    ) -> Result<NodeOutput, BehaviorFailure>;
}

/// Interceptor around the run as a whole, fired once at starting and once at
/// ending.
#[async_trait]
pub trait RunBehavior: Send + Sync {
    /// Name used to attribute faults and error events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Intercept the run-level lifecycle point named by `cx.stage`.
    async fn invoke(&self, cx: &BehaviorContext, next: RunNext<'_>)
        -> Result<(), BehaviorFailure>;
}

/// Continuation handed to a [`NodeBehavior`].
///
/// Owns its position in the chain and the terminal operation; consuming it
/// via [`run`](Self::run) invokes everything registered after the current
/// behavior, then the node itself. Dropping it without calling `run`
/// short-circuits the chain.
pub struct NodeNext<'a> {
    pipeline: &'a NodeBehaviorPipeline,
    index: usize,
    terminal: NodeOperation<'a>,
    entered: Arc<AtomicBool>,
}

impl NodeNext<'_> {
    /// Run the rest of the chain and the wrapped node operation.
    pub async fn run(self, cx: &BehaviorContext) -> Result<NodeOutput, DispatchError> {
        self.entered.store(true, Ordering::SeqCst);
        self.pipeline.dispatch(self.index, cx, self.terminal).await
    }
}

/// Continuation handed to a [`RunBehavior`].
pub struct RunNext<'a> {
    pipeline: &'a RunBehaviorPipeline,
    index: usize,
    terminal: RunOperation<'a>,
    entered: Arc<AtomicBool>,
}

impl RunNext<'_> {
    /// Run the rest of the chain and the wrapped run operation.
    pub async fn run(self, cx: &BehaviorContext) -> Result<(), DispatchError> {
        self.entered.store(true, Ordering::SeqCst);
        self.pipeline.dispatch(self.index, cx, self.terminal).await
    }
}

/// Ordered chain of node behaviors; first registered is outermost.
pub struct NodeBehaviorPipeline {
    behaviors: Vec<Arc<dyn NodeBehavior>>,
}

impl NodeBehaviorPipeline {
    /// Build a pipeline over an ordered behavior list.
    #[must_use]
    pub fn new(behaviors: Vec<Arc<dyn NodeBehavior>>) -> Self {
        Self { behaviors }
    }

    /// Number of registered behaviors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// True when the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Execute the full chain around `terminal`.
    pub async fn execute<'a>(
        &'a self,
        cx: &'a BehaviorContext,
        terminal: NodeOperation<'a>,
    ) -> Result<NodeOutput, DispatchError> {
        self.dispatch(0, cx, terminal).await
    }

    fn dispatch<'a>(
        &'a self,
        index: usize,
        cx: &'a BehaviorContext,
        terminal: NodeOperation<'a>,
    ) -> NodeOperation<'a> {
        Box::pin(async move {
            let Some(behavior) = self.behaviors.get(index) else {
                return terminal.await;
            };
            let entered = Arc::new(AtomicBool::new(false));
            let next = NodeNext {
                pipeline: self,
                index: index + 1,
                terminal,
                entered: Arc::clone(&entered),
            };
            match behavior.invoke(cx, next).await {
                Ok(output) => Ok(output),
                Err(BehaviorFailure::Inner(err)) => Err(err),
                Err(BehaviorFailure::Fault(source)) => Err(DispatchError::Behavior(BehaviorError {
                    behavior: behavior.name().to_string(),
                    stage: fault_stage(cx.stage, entered.load(Ordering::SeqCst)),
                    source,
                })),
            }
        })
    }
}

/// Ordered chain of run behaviors; first registered is outermost.
pub struct RunBehaviorPipeline {
    behaviors: Vec<Arc<dyn RunBehavior>>,
}

impl RunBehaviorPipeline {
    /// Build a pipeline over an ordered behavior list.
    #[must_use]
    pub fn new(behaviors: Vec<Arc<dyn RunBehavior>>) -> Self {
        Self { behaviors }
    }

    /// Number of registered behaviors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// True when the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Execute the full chain around `terminal`.
    pub async fn execute<'a>(
        &'a self,
        cx: &'a BehaviorContext,
        terminal: RunOperation<'a>,
    ) -> Result<(), DispatchError> {
        self.dispatch(0, cx, terminal).await
    }

    fn dispatch<'a>(
        &'a self,
        index: usize,
        cx: &'a BehaviorContext,
        terminal: RunOperation<'a>,
    ) -> RunOperation<'a> {
        Box::pin(async move {
            let Some(behavior) = self.behaviors.get(index) else {
                return terminal.await;
            };
            let entered = Arc::new(AtomicBool::new(false));
            let next = RunNext {
                pipeline: self,
                index: index + 1,
                terminal,
                entered: Arc::clone(&entered),
            };
            match behavior.invoke(cx, next).await {
                Ok(()) => Ok(()),
                Err(BehaviorFailure::Inner(err)) => Err(err),
                Err(BehaviorFailure::Fault(source)) => Err(DispatchError::Behavior(BehaviorError {
                    behavior: behavior.name().to_string(),
                    stage: fault_stage(cx.stage, entered.load(Ordering::SeqCst)),
                    source,
                })),
            }
        })
    }
}

/// Attribute a fault to pre or post depending on whether the continuation
/// was entered. Run stages keep their entry label either way.
fn fault_stage(entry: BehaviorStage, entered: bool) -> BehaviorStage {
    match entry {
        BehaviorStage::Pre if entered => BehaviorStage::Post,
        other => other,
    }
}
