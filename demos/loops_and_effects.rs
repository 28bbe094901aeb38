//! Loops, custom effects, and the event stream.
//!
//! Seeds a collection, iterates it with a foreach, routes every effect node
//! through a custom [`EffectHandler`], and consumes the run's event stream
//! while the run is in flight.
//!
//! Running:
//! ```bash
//! cargo run --example loops_and_effects
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use loomflow::compiler::{Action, DeclarativeCompiler, EffectHandler};
use loomflow::event_bus::STREAM_END_SCOPE;
use loomflow::message::WorkflowMessage;
use loomflow::node::{NodeContext, NodeError};
use loomflow::runtimes::{RuntimeConfig, WorkflowRunner};
use miette::Result;
use serde_json::{json, Value};

/// Effect handler that prints what it was asked to do.
struct PrintingEffects;

#[async_trait]
impl EffectHandler for PrintingEffects {
    async fn execute(
        &self,
        effect: &str,
        payload: &Value,
        _message: &WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<Value, NodeError> {
        let item = ctx
            .scopes
            .get("global", "item")
            .cloned()
            .unwrap_or(Value::Null);
        println!("effect {effect} on item {item} (node {})", ctx.node_id);
        Ok(payload.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let tree = Action::scope(
        "batch",
        vec![
            Action::set_variable("seed", "global.items", r#"["red", "green", "blue"]"#),
            Action::foreach(
                "each",
                "=global.items",
                "global.item",
                vec![Action::effect("paint", "apply_color", json!({}))],
            ),
            Action::effect("done", "report", json!({"status": "all painted"})),
        ],
    );

    let workflow = DeclarativeCompiler::new(Arc::new(PrintingEffects))
        .translate(&tree)?
        .compile()?;
    let runner = WorkflowRunner::new(workflow, RuntimeConfig::new().with_run_id("demo-loops"));

    let handle = runner.start(Value::Null)?;
    while let Ok(event) = handle.events().recv_async().await {
        println!("event: {event}");
        if event.scope_label() == STREAM_END_SCOPE {
            break;
        }
    }

    let report = handle.join().await?;
    println!("run {} {}", report.run_id, report.status);
    Ok(())
}
