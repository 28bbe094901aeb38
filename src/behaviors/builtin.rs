//! Behaviors shipped with the crate.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::node::NodeOutput;

use super::context::BehaviorContext;
use super::pipeline::{BehaviorFailure, NodeBehavior, NodeNext, RunBehavior, RunNext};

/// Emits a `tracing` span of events around every node invocation and the
/// run as a whole. Purely observational: it always calls its continuation
/// and never alters results.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingBehavior;

#[async_trait]
impl NodeBehavior for TracingBehavior {
    fn name(&self) -> &str {
        "TracingBehavior"
    }

    async fn invoke(
        &self,
        cx: &BehaviorContext,
        next: NodeNext<'_>,
    ) -> Result<NodeOutput, BehaviorFailure> {
        let node = cx.node_id.as_deref().unwrap_or("<unknown>");
        debug!(run_id = %cx.run_id, node, "node starting");
        let started = std::time::Instant::now();
        let result = next.run(cx).await;
        match &result {
            Ok(_) => debug!(run_id = %cx.run_id, node, elapsed = ?started.elapsed(), "node finished"),
            Err(err) => debug!(run_id = %cx.run_id, node, error = %err, "node failed"),
        }
        result.map_err(BehaviorFailure::Inner)
    }
}

#[async_trait]
impl RunBehavior for TracingBehavior {
    fn name(&self) -> &str {
        "TracingBehavior"
    }

    async fn invoke(&self, cx: &BehaviorContext, next: RunNext<'_>) -> Result<(), BehaviorFailure> {
        info!(run_id = %cx.run_id, stage = %cx.stage, "run lifecycle");
        next.run(cx).await.map_err(BehaviorFailure::Inner)
    }
}
