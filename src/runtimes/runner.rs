//! Superstep-driven execution of compiled workflows.

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, instrument, warn};

use crate::behaviors::{BehaviorContext, DispatchError, NodeOperation};
use crate::event_bus::{Event, EventBus, RunErrorEvent, STREAM_END_SCOPE};
use crate::graphs::Workflow;
use crate::message::WorkflowMessage;
use crate::node::{CancelSignal, ExecutionError, NodeContext, NodeError, NodeOutput};
use crate::scopes::{ExpressionEvaluator, Scopes};
use crate::types::NodeId;

use super::runtime_config::{ExecutionMode, RuntimeConfig};

/// Lifecycle state of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is executing supersteps.
    Running,
    /// The frontier drained with no errors.
    Completed,
    /// An execution or behavior failure ended the run; see the run's error
    /// events.
    Failed,
    /// Cancellation was requested and honored.
    Cancelled,
}

impl RunStatus {
    /// True once the run can no longer make progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Final summary of one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Supersteps executed.
    pub steps: u64,
    /// Node invocations dispatched (disabled skips not counted).
    pub nodes_executed: u64,
    /// Snapshot of the run's scoped state at termination.
    pub final_scopes: Value,
    /// Every run-level error recorded, in order.
    pub error_events: Vec<RunErrorEvent>,
}

/// Errors preventing a run from starting or being joined.
///
/// Failures *inside* a run never surface here; they become run-level error
/// events and a `Failed` status on the report.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// The workflow was compiled from a tree with unsupported actions.
    #[error("workflow contains unsupported actions and cannot run")]
    #[diagnostic(
        code(loomflow::runtimes::unsupported_actions),
        help("Check Workflow::has_unsupported_actions before starting a run.")
    )]
    UnsupportedActions,

    /// The driver task panicked or was aborted.
    #[error("run {run_id} task ended abnormally")]
    #[diagnostic(code(loomflow::runtimes::task_panicked))]
    TaskPanicked { run_id: String },
}

/// Executes compiled workflows.
///
/// A runner owns an [`EventBus`] and a [`RuntimeConfig`]; each
/// [`start`](Self::start) spawns an independent run with its own exclusive
/// [`Scopes`], sharing the read-only [`Workflow`].
///
/// # Examples
///
/// ```rust,no_run
/// use loomflow::compiler::{Action, DeclarativeCompiler};
/// use loomflow::runtimes::{RuntimeConfig, WorkflowRunner};
/// use serde_json::json;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let tree = Action::scope("main", vec![Action::effect("hi", "log", json!({}))]);
/// let workflow = DeclarativeCompiler::with_echo_effects()
///     .translate(&tree)?
///     .compile()?;
///
/// let runner = WorkflowRunner::new(workflow, RuntimeConfig::new());
/// let report = runner.run_to_completion(json!({"text": "hello"})).await?;
/// println!("run {} {}", report.run_id, report.status);
/// # Ok(())
/// # }
/// ```
pub struct WorkflowRunner {
    workflow: Arc<Workflow>,
    config: RuntimeConfig,
    event_bus: EventBus,
}

impl WorkflowRunner {
    /// A runner over a compiled workflow, with a stdout event bus.
    #[must_use]
    pub fn new(workflow: Workflow, config: RuntimeConfig) -> Self {
        Self {
            workflow: Arc::new(workflow),
            config,
            event_bus: EventBus::default(),
        }
    }

    /// Replace the event bus (e.g. with memory sinks for tests).
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// The runner's event bus, for attaching extra sinks.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Start a run, returning a handle to observe and control it.
    ///
    /// Refuses workflows flagged with unsupported actions.
    pub fn start(&self, initial: Value) -> Result<RunHandle, RunnerError> {
        if self.workflow.has_unsupported_actions() {
            return Err(RunnerError::UnsupportedActions);
        }
        let run_id = self.config.resolved_run_id();
        self.event_bus.listen_for_events();

        // Each run emits into its own channel; a relay copies every event to
        // the shared bus and to the handle's stream. The handle therefore
        // sees exactly this run's events, and the bus keeps only its
        // configured sinks across runs.
        let (run_tx, run_rx) = flume::unbounded::<Event>();
        let (stream_tx, stream_rx) = flume::unbounded();
        let bus_tx = self.event_bus.get_sender();
        task::spawn(async move {
            while let Ok(event) = run_rx.recv_async().await {
                let _ = bus_tx.send(event.clone());
                let _ = stream_tx.send(event);
            }
        });

        let status = Arc::new(Mutex::new(RunStatus::Running));
        let cancel = CancelSignal::new();
        let driver = Driver {
            workflow: Arc::clone(&self.workflow),
            run_id: run_id.clone(),
            evaluator: Arc::clone(&self.config.evaluator),
            mode: self.config.mode,
            max_supersteps: self.config.max_supersteps,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
            sender: run_tx,
        };
        let join = task::spawn(driver.drive(initial));
        Ok(RunHandle {
            run_id,
            status,
            cancel,
            events: stream_rx,
            join,
        })
    }

    /// Start a run and wait for its final report.
    pub async fn run_to_completion(&self, initial: Value) -> Result<RunReport, RunnerError> {
        self.start(initial)?.join().await
    }
}

/// Handle to an in-flight run.
pub struct RunHandle {
    run_id: String,
    status: Arc<Mutex<RunStatus>>,
    cancel: CancelSignal,
    events: flume::Receiver<Event>,
    join: task::JoinHandle<RunReport>,
}

impl RunHandle {
    /// Correlation id of the run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    /// Request cooperative cancellation. The run stops at the next
    /// superstep boundary; no partial scope writes are committed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stream of events emitted during the run.
    #[must_use]
    pub fn events(&self) -> &flume::Receiver<Event> {
        &self.events
    }

    /// True once the driver task finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Hard-abort the driver task. Prefer [`cancel`](Self::cancel).
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Wait for the run to finish and take its report.
    pub async fn join(self) -> Result<RunReport, RunnerError> {
        self.join.await.map_err(|_| RunnerError::TaskPanicked {
            run_id: self.run_id,
        })
    }
}

/// Outcome of dispatching one frontier entry.
struct Dispatched {
    /// Scopes committed by the handler, absent when nothing committed.
    scopes: Option<Scopes>,
    /// Output to forward along the node's links.
    output: NodeOutput,
    /// False when the node was disabled and its handler never ran.
    executed: bool,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("status", &self.status())
            .finish()
    }
}

struct Driver {
    workflow: Arc<Workflow>,
    run_id: String,
    evaluator: Arc<dyn ExpressionEvaluator>,
    mode: ExecutionMode,
    max_supersteps: u64,
    status: Arc<Mutex<RunStatus>>,
    cancel: CancelSignal,
    sender: flume::Sender<Event>,
}

impl Driver {
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    async fn drive(self, initial: Value) -> RunReport {
        info!(start = %self.workflow.start_id(), mode = ?self.mode, "run starting");
        let _ = self
            .sender
            .send(Event::diagnostic("runner", format!("run {} starting", self.run_id)));

        let mut scopes = Scopes::new();
        let mut error_events: Vec<RunErrorEvent> = Vec::new();
        let mut steps = 0u64;
        let mut nodes_executed = 0u64;

        if let Some(pipeline) = self.workflow.run_behaviors() {
            let cx = BehaviorContext::run_starting(&self.run_id);
            if let Err(err) = pipeline.execute(&cx, Box::pin(async { Ok(()) })).await {
                self.record_error(&mut error_events, err, None);
                return self
                    .finish(RunStatus::Failed, steps, nodes_executed, &scopes, error_events)
                    .await;
            }
        }

        let mut frontier: Vec<(NodeId, WorkflowMessage)> = vec![(
            self.workflow.start_id().to_string(),
            WorkflowMessage::input(initial),
        )];
        let mut status = RunStatus::Completed;

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }
            if steps >= self.max_supersteps {
                let event = RunErrorEvent::runner(
                    &self.run_id,
                    format!("superstep limit {} exceeded", self.max_supersteps),
                );
                let _ = self.sender.send(Event::RunError(event.clone()));
                error_events.push(event);
                status = RunStatus::Failed;
                break;
            }

            // Fan-in barrier: everything addressed to one target within
            // this step merges into a single invocation.
            let batch = merge_frontier(std::mem::take(&mut frontier));
            debug!(step = steps, nodes = batch.len(), "superstep");

            let mut failed = false;
            match self.mode {
                ExecutionMode::Sequential => {
                    for (node_id, message) in batch {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        match self.dispatch(&node_id, message, scopes.clone(), steps).await {
                            Ok(done) => {
                                if let Some(mutated) = done.scopes {
                                    scopes = mutated;
                                }
                                if done.executed {
                                    nodes_executed += 1;
                                }
                                self.forward(&node_id, done.output, &mut frontier);
                            }
                            Err(err) => {
                                self.record_error(&mut error_events, err, Some(&node_id));
                                failed = true;
                            }
                        }
                    }
                }
                ExecutionMode::Concurrent => {
                    let snapshot = scopes.clone();
                    let futures = batch.iter().map(|(node_id, message)| {
                        self.dispatch(node_id, message.clone(), snapshot.clone(), steps)
                    });
                    for ((node_id, _), result) in batch.iter().zip(join_all(futures).await) {
                        match result {
                            Ok(done) => {
                                if let Some(mutated) = done.scopes {
                                    apply_scope_delta(&mut scopes, &snapshot, &mutated);
                                }
                                if done.executed {
                                    nodes_executed += 1;
                                }
                                self.forward(node_id, done.output, &mut frontier);
                            }
                            Err(err) => {
                                self.record_error(&mut error_events, err, Some(node_id));
                                failed = true;
                            }
                        }
                    }
                }
            }
            steps += 1;
            if failed {
                status = RunStatus::Failed;
                break;
            }
            if self.cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }
        }

        self.finish(status, steps, nodes_executed, &scopes, error_events)
            .await
    }

    /// The dispatch wrapper around one node invocation.
    ///
    /// Skips disabled nodes (forwarding the inbound payload as a no-op),
    /// exposes a working copy of the run's scopes to the handler, commits
    /// the mutated scopes only on success while not cancelled, and wraps
    /// unrecognized handler failures into `ExecutionError::NodeFailure`.
    /// With node behaviors registered, the whole operation runs at the
    /// bottom of the chain.
    async fn dispatch(
        &self,
        node_id: &str,
        message: WorkflowMessage,
        working: Scopes,
        step: u64,
    ) -> Result<Dispatched, DispatchError> {
        let node = self.workflow.node(node_id).ok_or_else(|| {
            DispatchError::Execution(ExecutionError::ContextUnavailable {
                node_id: node_id.to_string(),
            })
        })?;

        if node.disabled {
            debug!(node = node_id, "skipping disabled node");
            return Ok(Dispatched {
                scopes: None,
                output: NodeOutput::with_payload(message.payload),
                executed: false,
            });
        }

        let committed: Arc<Mutex<Option<Scopes>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&committed);
        let handler = Arc::clone(&node.handler);
        let node_kind = node.kind.clone();
        let ctx = NodeContext {
            node_id: node_id.to_string(),
            node_kind: node_kind.clone(),
            run_id: self.run_id.clone(),
            step,
            scopes: working,
            evaluator: Arc::clone(&self.evaluator),
            cancel: self.cancel.clone(),
            event_sender: self.sender.clone(),
        };
        let handler_message = message.clone();
        let terminal: NodeOperation<'static> = Box::pin(async move {
            let mut ctx = ctx;
            match handler.handle(handler_message, &mut ctx).await {
                Ok(output) => {
                    // A cancelled run leaves no partially applied writes.
                    if !ctx.is_cancelled() {
                        *slot.lock() = Some(ctx.scopes);
                    }
                    Ok(output)
                }
                Err(NodeError::Execution(err)) => Err(DispatchError::Execution(err)),
                Err(other) => Err(DispatchError::Execution(ExecutionError::NodeFailure {
                    node_id: ctx.node_id.clone(),
                    node_kind: ctx.node_kind.clone(),
                    source: Box::new(other),
                })),
            }
        });

        let output = match self.workflow.node_behaviors() {
            Some(pipeline) => {
                let cx = BehaviorContext::node_invocation(
                    self.run_id.clone(),
                    node_id.to_string(),
                    node_kind,
                    message,
                );
                pipeline.execute(&cx, terminal).await?
            }
            None => terminal.await?,
        };
        let scopes = committed.lock().take();
        Ok(Dispatched {
            scopes,
            output,
            executed: true,
        })
    }

    fn forward(
        &self,
        node_id: &str,
        output: NodeOutput,
        frontier: &mut Vec<(NodeId, WorkflowMessage)>,
    ) {
        let Some(payload) = output.payload else {
            debug!(node = node_id, "terminal node, nothing forwarded");
            return;
        };
        let message = WorkflowMessage::result(node_id, payload);
        for link in self.workflow.links_from(node_id) {
            if link.accepts(&message) {
                frontier.push((link.target.clone(), message.clone()));
            }
        }
    }

    fn record_error(
        &self,
        errors: &mut Vec<RunErrorEvent>,
        err: DispatchError,
        node_id: Option<&str>,
    ) {
        let event = match &err {
            DispatchError::Behavior(fault) => RunErrorEvent::behavior(
                &self.run_id,
                fault.behavior.clone(),
                fault.stage.as_str(),
                fault.to_string(),
            ),
            DispatchError::Execution(exec) => match node_id {
                Some(id) => {
                    let kind = self
                        .workflow
                        .node(id)
                        .map(|n| n.kind.encode())
                        .unwrap_or_default();
                    RunErrorEvent::node(&self.run_id, id, kind, exec.to_string())
                }
                None => RunErrorEvent::runner(&self.run_id, exec.to_string()),
            },
        };
        warn!(error = %err, "run error");
        let _ = self.sender.send(Event::RunError(event.clone()));
        errors.push(event);
    }

    async fn finish(
        &self,
        mut status: RunStatus,
        steps: u64,
        nodes_executed: u64,
        scopes: &Scopes,
        mut error_events: Vec<RunErrorEvent>,
    ) -> RunReport {
        if let Some(pipeline) = self.workflow.run_behaviors() {
            let cx = BehaviorContext::run_ending(&self.run_id);
            if let Err(err) = pipeline.execute(&cx, Box::pin(async { Ok(()) })).await {
                self.record_error(&mut error_events, err, None);
                status = RunStatus::Failed;
            }
        }

        *self.status.lock() = status;
        info!(%status, steps, nodes_executed, "run finished");
        let _ = self.sender.send(Event::diagnostic(
            "runner",
            format!("run {} {status}", self.run_id),
        ));
        let _ = self
            .sender
            .send(Event::diagnostic(STREAM_END_SCOPE, "event stream closing"));

        RunReport {
            run_id: self.run_id.clone(),
            status,
            steps,
            nodes_executed,
            final_scopes: scopes.to_json().unwrap_or(Value::Null),
            error_events,
        }
    }
}

/// Group the frontier by target in first-seen order and merge each group
/// into one fan-in message.
fn merge_frontier(frontier: Vec<(NodeId, WorkflowMessage)>) -> Vec<(NodeId, WorkflowMessage)> {
    let mut order: Vec<NodeId> = Vec::new();
    let mut grouped: FxHashMap<NodeId, Vec<WorkflowMessage>> = FxHashMap::default();
    for (target, message) in frontier {
        if !grouped.contains_key(&target) {
            order.push(target.clone());
        }
        grouped.entry(target).or_default().push(message);
    }
    order
        .into_iter()
        .map(|target| {
            let messages = grouped.remove(&target).unwrap_or_default();
            (target, WorkflowMessage::merge(messages))
        })
        .collect()
}

/// Fold one node's scope mutations into the live state.
///
/// Concurrent-mode nodes all start from the same step snapshot, so a plain
/// replacement would erase sibling writes; instead, only keys the node
/// actually changed (or removed) relative to the snapshot are applied.
fn apply_scope_delta(live: &mut Scopes, snapshot: &Scopes, mutated: &Scopes) {
    let mutated_names: Vec<String> = mutated.scope_names().map(str::to_string).collect();
    for name in &mutated_names {
        if let Some(scope) = mutated.scope(name) {
            for (key, value) in scope.iter() {
                if snapshot.get(name, key) != Some(value) {
                    live.set(name, key, value.clone());
                }
            }
        }
    }
    let snapshot_names: Vec<String> = snapshot.scope_names().map(str::to_string).collect();
    for name in &snapshot_names {
        if let Some(scope) = snapshot.scope(name) {
            let removed: Vec<String> = scope
                .iter()
                .filter(|(key, _)| mutated.get(name, key).is_none())
                .map(|(key, _)| key.to_string())
                .collect();
            for key in removed {
                live.reset_key(name, &key);
            }
        }
    }
}
