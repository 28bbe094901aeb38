//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use loomflow::event_bus::{Event, EventBus, MemorySink, STREAM_END_SCOPE};
use loomflow::graphs::WorkflowNode;
use loomflow::message::WorkflowMessage;
use loomflow::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use loomflow::runtimes::{RuntimeConfig, WorkflowRunner};
use loomflow::types::NodeKind;

/// Handler that forwards the inbound payload unchanged.
pub struct Echo;

#[async_trait]
impl NodeHandler for Echo {
    async fn handle(
        &self,
        message: WorkflowMessage,
        _ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::with_payload(message.payload))
    }
}

/// Handler that appends its node id to a shared log, then forwards.
pub struct Recorder {
    pub log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NodeHandler for Recorder {
    async fn handle(
        &self,
        message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        self.log.lock().unwrap().push(ctx.node_id.clone());
        Ok(NodeOutput::with_payload(message.payload))
    }
}

/// Handler that always fails with a validation error.
pub struct Failing {
    pub reason: &'static str,
}

#[async_trait]
impl NodeHandler for Failing {
    async fn handle(
        &self,
        _message: WorkflowMessage,
        _ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ValidationFailed(self.reason.to_string()))
    }
}

/// A caller-injected node with an echo handler.
pub fn echo_node(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeKind::Custom(id.to_uppercase()), Arc::new(Echo))
}

/// A caller-injected node that records its execution order.
pub fn recording_node(id: &str, log: Arc<Mutex<Vec<String>>>) -> WorkflowNode {
    WorkflowNode::new(id, NodeKind::Custom(id.to_uppercase()), Arc::new(Recorder { log }))
}

/// A runner wired to a memory sink instead of stdout.
pub fn memory_runner(
    workflow: loomflow::graphs::Workflow,
    config: RuntimeConfig,
) -> (WorkflowRunner, MemorySink) {
    let sink = MemorySink::new();
    let runner =
        WorkflowRunner::new(workflow, config).with_event_bus(EventBus::with_sink(sink.clone()));
    (runner, sink)
}

/// Drain a run's event stream until its end-of-stream diagnostic.
pub async fn drain_events(rx: &flume::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv_async()).await {
            Ok(Ok(event)) => {
                let done = event.scope_label() == STREAM_END_SCOPE;
                events.push(event);
                if done {
                    break;
                }
            }
            _ => break,
        }
    }
    events
}

/// A payload-free input message.
pub fn null_input() -> Value {
    Value::Null
}
