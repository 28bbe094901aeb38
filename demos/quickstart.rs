//! Quickstart: compile a declarative tree and run it.
//!
//! Builds a small support-routing workflow — assign a variable, branch on a
//! condition, execute an effect — compiles it to an executable graph, and
//! runs it to completion.
//!
//! Running:
//! ```bash
//! cargo run --example quickstart
//! ```

use std::sync::Arc;

use loomflow::behaviors::TracingBehavior;
use loomflow::compiler::{Action, ConditionBranch, DeclarativeCompiler};
use loomflow::runtimes::{RuntimeConfig, WorkflowRunner};
use miette::{IntoDiagnostic, Result};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let tree = Action::scope(
        "support",
        vec![
            Action::set_variable("triage", "global.is_vip", "true"),
            Action::condition_group_with_else(
                "route",
                vec![ConditionBranch::new(
                    "vip",
                    "=global.is_vip",
                    vec![Action::effect("page", "notify_oncall", json!({"team": "tier2"}))],
                )],
                vec![Action::effect("queue", "enqueue", json!({"queue": "general"}))],
            ),
        ],
    );

    let workflow = DeclarativeCompiler::with_echo_effects()
        .translate(&tree)?
        .with_node_behavior(Arc::new(TracingBehavior))
        .with_run_behavior(Arc::new(TracingBehavior))
        .compile()?;
    println!(
        "compiled: {} nodes, {} links, start at {}",
        workflow.node_count(),
        workflow.link_count(),
        workflow.start_id()
    );

    let runner = WorkflowRunner::new(workflow, RuntimeConfig::new());
    let report = runner.run_to_completion(json!({"user": "ada"})).await?;

    println!(
        "run {} finished: {} ({} steps, {} nodes executed)",
        report.run_id, report.status, report.steps, report.nodes_executed
    );
    println!(
        "final scopes: {}",
        serde_json::to_string_pretty(&report.final_scopes).into_diagnostic()?
    );
    Ok(())
}
