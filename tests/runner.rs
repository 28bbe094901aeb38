//! End-to-end runs over hand-built and compiled workflows.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use common::{drain_events, echo_node, memory_runner, null_input, recording_node};
use loomflow::compiler::{Action, ConditionBranch, DeclarativeCompiler, EffectHandler};
use loomflow::event_bus::{ChannelSink, RunErrorScope, STREAM_END_SCOPE};
use loomflow::graphs::{GraphBuilder, WorkflowNode};
use loomflow::message::WorkflowMessage;
use loomflow::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use loomflow::runtimes::{ExecutionMode, RunStatus, RunnerError, RuntimeConfig, WorkflowRunner};
use loomflow::scopes::Scopes;
use loomflow::types::NodeKind;

/// Effect handler that logs each executed effect's action id.
struct LoggingEffects {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EffectHandler for LoggingEffects {
    async fn execute(
        &self,
        _effect: &str,
        payload: &Value,
        _message: &WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<Value, NodeError> {
        self.log.lock().unwrap().push(ctx.node_id.clone());
        Ok(payload.clone())
    }
}

/// Handler that writes one fixed key into the global scope.
struct WriteKey {
    key: &'static str,
    value: Value,
}

#[async_trait]
impl NodeHandler for WriteKey {
    async fn handle(
        &self,
        message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        ctx.scopes
            .set(Scopes::GLOBAL, self.key, self.value.clone());
        Ok(NodeOutput::with_payload(message.payload))
    }
}

/// Handler that writes a scope key, then sleeps past the cancellation.
struct SlowWriter;

#[async_trait]
impl NodeHandler for SlowWriter {
    async fn handle(
        &self,
        message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        ctx.scopes.set(Scopes::GLOBAL, "written", json!(true));
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(NodeOutput::with_payload(message.payload))
    }
}

/// Handler that records the inbound message's merged sources.
struct CaptureSources {
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl NodeHandler for CaptureSources {
    async fn handle(
        &self,
        message: WorkflowMessage,
        _ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        self.seen.lock().unwrap().push(message.sources().to_vec());
        Ok(NodeOutput::with_payload(message.payload))
    }
}

fn compile_with_log(tree: &Action, log: Arc<Mutex<Vec<String>>>) -> loomflow::graphs::Workflow {
    DeclarativeCompiler::new(Arc::new(LoggingEffects { log }))
        .translate(tree)
        .expect("tree compiles")
        .compile()
        .expect("graph is valid")
}

/// A compiled condition group routes on scoped state written earlier in the
/// same run: sequential mode makes the write visible to the decision.
#[tokio::test]
async fn condition_routing_sees_earlier_writes() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let tree = Action::scope(
        "main",
        vec![
            Action::set_variable("mark", "global.is_vip", "true"),
            Action::condition_group_with_else(
                "route",
                vec![ConditionBranch::new(
                    "vip",
                    "=global.is_vip",
                    vec![Action::effect("page", "notify", json!({}))],
                )],
                vec![Action::effect("queue", "enqueue", json!({}))],
            ),
        ],
    );
    let workflow = compile_with_log(&tree, Arc::clone(&log));
    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());

    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["page"]);
    assert_eq!(report.final_scopes["global"]["is_vip"], json!(true));
}

/// A compiled foreach executes its body once per item and leaves the last
/// binding (but no iterator state) in the final scopes.
#[tokio::test]
async fn foreach_iterates_each_item() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let tree = Action::scope(
        "main",
        vec![
            Action::set_variable("seed", "global.items", "[1, 2, 3]"),
            Action::foreach(
                "each",
                "=global.items",
                "global.item",
                vec![Action::effect("work", "process", json!({}))],
            ),
        ],
    );
    let workflow = compile_with_log(&tree, Arc::clone(&log));
    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());

    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["work", "work", "work"]);
    assert_eq!(report.final_scopes["global"]["item"], json!(3));
    // Exhausted iterators leave nothing behind in the system scope.
    assert!(report.final_scopes["system"]["each"].is_null());
}

/// A goto jumps over intervening actions; the jumped-over effect never runs.
#[tokio::test]
async fn goto_skips_intervening_actions() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let tree = Action::scope(
        "main",
        vec![
            Action::goto("hop", "landing"),
            Action::effect("skipped", "never", json!({})),
            Action::effect("landing", "arrive", json!({})),
        ],
    );
    let workflow = compile_with_log(&tree, Arc::clone(&log));
    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());

    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["landing"]);
}

/// Disabled nodes are skipped, forward the inbound payload unchanged, and
/// are not counted as executed.
#[tokio::test]
async fn disabled_node_forwards_payload() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let disabled = WorkflowNode::new(
        "middle",
        NodeKind::Custom("MIDDLE".into()),
        Arc::new(WriteKey {
            key: "should_not_exist",
            value: json!(true),
        }),
    )
    .with_disabled(true);
    let workflow = GraphBuilder::new()
        .add_node(echo_node("start"))
        .add_node(disabled)
        .add_node(recording_node("end", Arc::clone(&log)))
        .add_link("start", "middle")
        .add_link("middle", "end")
        .with_start("start")
        .compile()
        .unwrap();

    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());
    let report = runner.run_to_completion(json!({"keep": 1})).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["end"]);
    // Skipped handler never ran, so its write never happened.
    assert!(report.final_scopes["global"]["should_not_exist"].is_null());
    assert_eq!(report.nodes_executed, 2);
}

/// Cancellation stops the run at the next boundary and discards scope
/// writes from handlers that finished after the cancel.
#[tokio::test]
async fn cancellation_discards_uncommitted_writes() {
    let workflow = GraphBuilder::new()
        .add_node(WorkflowNode::new(
            "slow",
            NodeKind::Custom("SLOW".into()),
            Arc::new(SlowWriter),
        ))
        .add_node(echo_node("next"))
        .add_link("slow", "next")
        .with_start("slow")
        .compile()
        .unwrap();

    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());
    let handle = runner.start(null_input()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let report = handle.join().await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.final_scopes["global"]["written"].is_null());
    assert!(report.error_events.is_empty());
}

/// Two branches converging on one target within a step merge into a single
/// invocation carrying both sources.
#[tokio::test]
async fn fan_in_merges_within_a_step() {
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let workflow = GraphBuilder::new()
        .add_node(echo_node("start"))
        .add_node(echo_node("a"))
        .add_node(echo_node("b"))
        .add_node(WorkflowNode::new(
            "join",
            NodeKind::Custom("JOIN".into()),
            Arc::new(CaptureSources {
                seen: Arc::clone(&seen),
            }),
        ))
        .add_link("start", "a")
        .add_link("start", "b")
        .add_link("a", "join")
        .add_link("b", "join")
        .with_start("start")
        .compile()
        .unwrap();

    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());
    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "join must be invoked exactly once");
    assert_eq!(seen[0], vec!["a".to_string(), "b".to_string()]);
}

/// Concurrent mode runs a step's nodes together and folds each node's scope
/// delta into the live state, so sibling writes both survive.
#[tokio::test]
async fn concurrent_mode_keeps_sibling_writes() {
    let workflow = GraphBuilder::new()
        .add_node(echo_node("start"))
        .add_node(WorkflowNode::new(
            "left",
            NodeKind::Custom("LEFT".into()),
            Arc::new(WriteKey {
                key: "left_done",
                value: json!(1),
            }),
        ))
        .add_node(WorkflowNode::new(
            "right",
            NodeKind::Custom("RIGHT".into()),
            Arc::new(WriteKey {
                key: "right_done",
                value: json!(2),
            }),
        ))
        .add_link("start", "left")
        .add_link("start", "right")
        .with_start("start")
        .compile()
        .unwrap();

    let config = RuntimeConfig::new().with_mode(ExecutionMode::Concurrent);
    let (runner, _sink) = memory_runner(workflow, config);
    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.final_scopes["global"]["left_done"], json!(1));
    assert_eq!(report.final_scopes["global"]["right_done"], json!(2));
}

/// Workflows compiled from trees with unsupported actions refuse to start.
#[tokio::test]
async fn unsupported_actions_refuse_to_run() {
    let tree = Action::scope("main", vec![Action::unsupported("card", "AdaptiveCard")]);
    let workflow = DeclarativeCompiler::with_echo_effects()
        .translate(&tree)
        .unwrap()
        .compile()
        .unwrap();
    assert!(workflow.has_unsupported_actions());

    let runner = WorkflowRunner::new(workflow, RuntimeConfig::new());
    let err = runner.start(null_input()).expect_err("must refuse");
    assert!(matches!(err, RunnerError::UnsupportedActions));
}

/// The run's event stream carries lifecycle diagnostics and closes with the
/// end-of-stream marker; the report mirrors the handle's run id.
#[tokio::test]
async fn event_stream_closes_after_run() {
    let workflow = GraphBuilder::new()
        .add_node(echo_node("only"))
        .with_start("only")
        .compile()
        .unwrap();
    let config = RuntimeConfig::new().with_run_id("run-events");
    let (runner, _sink) = memory_runner(workflow, config);
    let (bus_tx, bus_rx) = flume::unbounded();
    runner.event_bus().add_sink(ChannelSink::new(bus_tx));

    let handle = runner.start(null_input()).unwrap();
    assert_eq!(handle.run_id(), "run-events");
    let events = drain_events(handle.events()).await;
    assert!(!events.is_empty());
    assert_eq!(
        events.last().unwrap().scope_label(),
        STREAM_END_SCOPE,
        "stream must close with the end marker"
    );
    assert!(events
        .iter()
        .any(|e| e.message().contains("run-events starting")));

    let report = handle.join().await.unwrap();
    assert_eq!(report.run_id, "run-events");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.steps, 1);
    assert_eq!(report.nodes_executed, 1);

    // Bus sinks observe the same lifecycle the handle's stream saw.
    let bus_events = drain_events(&bus_rx).await;
    assert_eq!(bus_events.last().unwrap().scope_label(), STREAM_END_SCOPE);
}

/// Each run handle's event stream carries only that run's events, and a
/// stream closes when its run ends instead of picking up later runs.
#[tokio::test]
async fn event_streams_stay_per_run() {
    let workflow = GraphBuilder::new()
        .add_node(echo_node("only"))
        .with_start("only")
        .compile()
        .unwrap();
    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());

    let first = runner.start(null_input()).unwrap();
    let first_id = first.run_id().to_string();
    let first_events = drain_events(first.events()).await;
    assert!(first_events
        .iter()
        .any(|e| e.message().contains(&format!("run {first_id} starting"))));

    let second = runner.start(null_input()).unwrap();
    let second_id = second.run_id().to_string();
    assert_ne!(first_id, second_id);
    let second_events = drain_events(second.events()).await;
    assert!(second_events
        .iter()
        .any(|e| e.message().contains(&format!("run {second_id} starting"))));
    assert!(second_events.iter().all(|e| !e.message().contains(&first_id)));

    second.join().await.unwrap();
    // The first stream already closed with its run; nothing from the second
    // run landed on it.
    assert!(first.events().try_recv().is_err());
    first.join().await.unwrap();
}

/// A cyclic graph that never drains hits the superstep limit and fails with
/// a runner-scoped error event.
#[tokio::test]
async fn superstep_limit_fails_run() {
    let workflow = GraphBuilder::new()
        .add_node(echo_node("a"))
        .add_node(echo_node("b"))
        .add_link("a", "b")
        .add_link("b", "a")
        .with_start("a")
        .compile()
        .unwrap();

    let config = RuntimeConfig::new().with_max_supersteps(5);
    let (runner, _sink) = memory_runner(workflow, config);
    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.error_events.len(), 1);
    assert!(matches!(
        report.error_events[0].scope,
        RunErrorScope::Runner
    ));
    assert_eq!(report.steps, 5);
}

/// A failing handler produces a node-scoped error event and fails the run.
#[tokio::test]
async fn handler_failure_becomes_node_error_event() {
    let workflow = GraphBuilder::new()
        .add_node(WorkflowNode::new(
            "broken",
            NodeKind::Custom("BROKEN".into()),
            Arc::new(common::Failing {
                reason: "backend offline",
            }),
        ))
        .with_start("broken")
        .compile()
        .unwrap();

    let (runner, _sink) = memory_runner(workflow, RuntimeConfig::new());
    let report = runner.run_to_completion(null_input()).await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.error_events.len(), 1);
    match &report.error_events[0].scope {
        RunErrorScope::Node { node_id, .. } => assert_eq!(node_id, "broken"),
        other => panic!("expected node scope, got {other:?}"),
    }
    assert!(report.error_events[0].message.contains("backend offline"));
}
