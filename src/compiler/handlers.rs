//! Node handlers the compiler installs on emitted nodes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::message::WorkflowMessage;
use crate::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use crate::scopes::Scopes;

/// Executes opaque leaf actions the workflow language treats as black boxes
/// (send a message, call a connector, invoke a model).
///
/// The compiler never interprets effect payloads; it installs one handler
/// for the whole workflow and routes every effect node through it.
#[async_trait]
pub trait EffectHandler: Send + Sync {
    /// Execute one effect. The returned value becomes the node's result
    /// payload.
    async fn execute(
        &self,
        effect: &str,
        payload: &Value,
        message: &WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<Value, NodeError>;
}

/// Effect handler that echoes the effect's static payload. Suitable for
/// dry runs and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoEffectHandler;

#[async_trait]
impl EffectHandler for EchoEffectHandler {
    async fn execute(
        &self,
        effect: &str,
        payload: &Value,
        _message: &WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<Value, NodeError> {
        ctx.emit("effect", format!("executed {effect}"))?;
        Ok(payload.clone())
    }
}

/// Structural pass-through: forwards the inbound payload unchanged.
///
/// Installed on scope entries/exits, restart joins, branch entries, loop
/// body markers, jumps, and clean-start nodes.
pub(crate) struct MarkerHandler;

#[async_trait]
impl NodeHandler for MarkerHandler {
    async fn handle(
        &self,
        message: WorkflowMessage,
        _ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::with_payload(message.payload))
    }
}

/// Terminal node: produces no outbound message, ending its branch.
pub(crate) struct EndHandler {
    pub(crate) label: &'static str,
}

#[async_trait]
impl NodeHandler for EndHandler {
    async fn handle(
        &self,
        _message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        ctx.emit("dialog", format!("{} reached", self.label))?;
        Ok(NodeOutput::empty())
    }
}

/// Evaluates a condition group's branch conditions in order and records the
/// matched branch in its result payload.
///
/// The guarded links out of the decision node only inspect this payload;
/// all expression evaluation stays inside the handler, keeping routing
/// predicates free of scoped state.
pub(crate) struct DecisionHandler {
    pub(crate) conditions: Vec<String>,
    pub(crate) has_else: bool,
}

#[async_trait]
impl NodeHandler for DecisionHandler {
    async fn handle(
        &self,
        _message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        for (index, condition) in self.conditions.iter().enumerate() {
            if ctx.evaluate_bool(condition)? {
                return Ok(NodeOutput::with_payload(json!({ "matched": index })));
            }
        }
        let matched = if self.has_else {
            json!("else")
        } else {
            Value::Null
        };
        Ok(NodeOutput::with_payload(json!({ "matched": matched })))
    }
}

/// Advances a foreach loop's iterator and reports whether an item was
/// selected.
///
/// Iterator state lives in the system scope under the loop's id, never on
/// the handler: `{"items": [...], "index": n}`. The first invocation
/// evaluates the source expression and snapshots the collection; each
/// invocation binds the current item (and optional index) and advances.
/// When the collection is exhausted the state is dropped so a later
/// re-entry restarts the loop from scratch.
pub(crate) struct SelectItemHandler {
    pub(crate) loop_id: String,
    pub(crate) source: String,
    pub(crate) value_scope: String,
    pub(crate) value_key: String,
    pub(crate) index_target: Option<(String, String)>,
}

#[async_trait]
impl NodeHandler for SelectItemHandler {
    async fn handle(
        &self,
        _message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let state = ctx.scopes.get(Scopes::SYSTEM, &self.loop_id).cloned();
        let (items, index) = match state {
            Some(state) => {
                let items = state["items"].as_array().cloned().unwrap_or_default();
                let index = state["index"].as_u64().unwrap_or(0) as usize;
                (items, index)
            }
            None => {
                let value = ctx.evaluate(&self.source)?;
                let items = value.as_array().cloned().ok_or_else(|| {
                    NodeError::ValidationFailed(format!(
                        "foreach source {} did not evaluate to an array",
                        self.source
                    ))
                })?;
                (items, 0)
            }
        };

        if let Some(item) = items.get(index) {
            ctx.scopes
                .set(&self.value_scope, self.value_key.clone(), item.clone());
            if let Some((scope, key)) = &self.index_target {
                ctx.scopes.set(scope, key.clone(), json!(index));
            }
            ctx.scopes.set(
                Scopes::SYSTEM,
                self.loop_id.clone(),
                json!({ "items": items, "index": index + 1 }),
            );
            Ok(NodeOutput::with_payload(
                json!({ "has_more": true, "index": index }),
            ))
        } else {
            ctx.scopes.reset_key(Scopes::SYSTEM, &self.loop_id);
            Ok(NodeOutput::with_payload(
                json!({ "has_more": false, "count": items.len() }),
            ))
        }
    }
}

/// Assigns an evaluated expression to a scoped variable, then forwards the
/// inbound payload.
pub(crate) struct SetVariableHandler {
    pub(crate) scope: String,
    pub(crate) key: String,
    pub(crate) value: String,
}

#[async_trait]
impl NodeHandler for SetVariableHandler {
    async fn handle(
        &self,
        message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let value = ctx.evaluate(&self.value)?;
        ctx.scopes.set(&self.scope, self.key.clone(), value);
        Ok(NodeOutput::with_payload(message.payload))
    }
}

/// Runs an effect node through the workflow's [`EffectHandler`].
pub(crate) struct EffectNodeHandler {
    pub(crate) effect: String,
    pub(crate) payload: Value,
    pub(crate) handler: Arc<dyn EffectHandler>,
}

#[async_trait]
impl NodeHandler for EffectNodeHandler {
    async fn handle(
        &self,
        message: WorkflowMessage,
        ctx: &mut NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let result = self
            .handler
            .execute(&self.effect, &self.payload, &message, ctx)
            .await?;
        Ok(NodeOutput::with_payload(result))
    }
}

/// Parse a `scope.name` variable path; a bare name defaults to the global
/// scope.
pub(crate) fn parse_var_path(path: &str) -> (String, String) {
    match path.split_once('.') {
        Some((scope, key)) if !scope.is_empty() && !key.is_empty() => {
            (scope.to_string(), key.to_string())
        }
        _ => (Scopes::GLOBAL.to_string(), path.to_string()),
    }
}
