//! Translation of the declarative action tree into an executable graph.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::graphs::{GraphBuilder, LinkCondition, WorkflowNode};
use crate::message::WorkflowMessage;
use crate::model::{ModelError, NodeTag, WorkflowModel};
use crate::types::NodeKind;

use super::actions::{Action, ActionKind, ConditionBranch};
use super::handlers::{
    parse_var_path, DecisionHandler, EchoEffectHandler, EffectHandler, EffectNodeHandler,
    EndHandler, MarkerHandler, SelectItemHandler, SetVariableHandler,
};

/// Compiles a declarative [`Action`] tree into a [`GraphBuilder`].
///
/// The compiler is a visitor: every action continues the sequential sibling
/// chain with a new node, optionally registers a completion callback on the
/// structural model, and recurses into children. All the non-local wiring —
/// scope exits, branch joins, loop cycles, jump targets — goes through the
/// model's deferred callbacks and forward links, resolved in
/// [`WorkflowModel::finalize`].
///
/// Compilation is best-effort: unknown action kinds compile to inert
/// markers and set the workflow's unsupported flag instead of raising.
///
/// # Examples
///
/// ```
/// use loomflow::compiler::{Action, DeclarativeCompiler};
/// use serde_json::json;
///
/// let tree = Action::scope(
///     "main",
///     vec![
///         Action::set_variable("init", "global.count", "0"),
///         Action::effect("notify", "send_message", json!({"text": "hi"})),
///     ],
/// );
/// let workflow = DeclarativeCompiler::with_echo_effects()
///     .translate(&tree)
///     .expect("tree compiles")
///     .compile()
///     .expect("graph is valid");
/// assert_eq!(workflow.start_id(), "main");
/// ```
pub struct DeclarativeCompiler {
    effect_handler: Arc<dyn EffectHandler>,
}

impl DeclarativeCompiler {
    /// A compiler routing effect nodes through the given handler.
    #[must_use]
    pub fn new(effect_handler: Arc<dyn EffectHandler>) -> Self {
        Self { effect_handler }
    }

    /// A compiler whose effects echo their static payloads. Suitable for
    /// dry runs and tests.
    #[must_use]
    pub fn with_echo_effects() -> Self {
        Self::new(Arc::new(EchoEffectHandler))
    }

    /// Translate the tree into a graph builder.
    ///
    /// The returned builder already contains every node and link; callers
    /// may register behaviors on it before freezing it with
    /// [`compile`](GraphBuilder::compile).
    pub fn translate(&self, root: &Action) -> Result<GraphBuilder, ModelError> {
        let mut model = WorkflowModel::new();
        let mut unsupported = false;
        self.visit(root, None, &mut model, &mut unsupported)?;

        let mut builder = GraphBuilder::new();
        model.finalize(&mut builder)?;
        if unsupported {
            builder.mark_unsupported_actions();
        }
        Ok(builder)
    }

    fn visit(
        &self,
        action: &Action,
        parent: Option<&str>,
        model: &mut WorkflowModel,
        unsupported: &mut bool,
    ) -> Result<(), ModelError> {
        // Continue the sequential chain before this node joins the sibling
        // list. The chain link is skipped automatically when the preceding
        // sibling is a clean-start marker.
        if let Some(parent) = parent {
            model.add_link_from_last_sibling(parent, action.id.clone(), None)?;
        }

        match &action.kind {
            ActionKind::Scope { actions } => {
                self.visit_scope(action, actions, parent, model, unsupported)
            }
            ActionKind::ConditionGroup {
                branches,
                else_actions,
            } => self.visit_condition_group(
                action,
                branches,
                else_actions.as_deref(),
                parent,
                model,
                unsupported,
            ),
            ActionKind::Foreach {
                source,
                value,
                index,
                body,
            } => self.visit_foreach(
                action,
                source,
                value,
                index.as_deref(),
                body,
                parent,
                model,
                unsupported,
            ),
            ActionKind::BreakLoop => self.visit_loop_jump(action, parent, true, model),
            ActionKind::ContinueLoop => self.visit_loop_jump(action, parent, false, model),
            ActionKind::Goto { target } => self.visit_goto(action, target, parent, model),
            ActionKind::EndConversation => {
                self.visit_end(action, "end of conversation", parent, model)
            }
            ActionKind::EndDialog => self.visit_end(action, "end of dialog", parent, model),
            ActionKind::Effect { effect, payload } => {
                let handler = EffectNodeHandler {
                    effect: effect.clone(),
                    payload: payload.clone(),
                    handler: Arc::clone(&self.effect_handler),
                };
                model.add_node(
                    WorkflowNode::new(&action.id, NodeKind::Effect, Arc::new(handler))
                        .with_disabled(action.disabled),
                    parent,
                )
            }
            ActionKind::SetVariable { variable, value } => {
                if variable.is_empty() {
                    return Err(ModelError::MissingRequiredProperties {
                        action_id: action.id.clone(),
                        property: "variable",
                    });
                }
                let (scope, key) = parse_var_path(variable);
                let handler = SetVariableHandler {
                    scope,
                    key,
                    value: value.clone(),
                };
                model.add_node(
                    WorkflowNode::new(&action.id, NodeKind::SetVariable, Arc::new(handler))
                        .with_disabled(action.disabled),
                    parent,
                )
            }
            ActionKind::Unsupported { original_kind } => {
                warn!(action = %action.id, kind = %original_kind, "unsupported action kind");
                *unsupported = true;
                model.add_node(
                    marker(
                        &action.id,
                        NodeKind::Custom(format!("Unsupported:{original_kind}")),
                    )
                    .with_disabled(action.disabled),
                    parent,
                )
            }
        }
    }

    fn visit_scope(
        &self,
        action: &Action,
        actions: &[Action],
        parent: Option<&str>,
        model: &mut WorkflowModel,
        unsupported: &mut bool,
    ) -> Result<(), ModelError> {
        let scope_id = action.id.clone();
        let exit_id = format!("{scope_id}__exit");

        let callback = {
            let scope_id = scope_id.clone();
            let exit_id = exit_id.clone();
            move |model: &mut WorkflowModel| {
                // Every child is known by now; chain the last one (or the
                // entry itself, for an empty scope) into the exit.
                model.add_link_from_last_sibling(&scope_id, exit_id.clone(), None)?;
                model.add_node(marker(&exit_id, NodeKind::ScopeExit), Some(&scope_id))
            }
        };

        // The Scope tag redirects sequential chaining past this scope
        // through the exit node. A nested scope that ends its parent
        // therefore links exit-to-exit, propagating termination upward;
        // a root scope's exit links nowhere.
        model.add_node_with(
            marker(&scope_id, NodeKind::ScopeEntry).with_disabled(action.disabled),
            parent,
            Some(NodeTag::Scope {
                exit_id: exit_id.clone(),
            }),
            Some(Box::new(callback)),
        )?;

        for child in actions {
            self.visit(child, Some(&scope_id), model, unsupported)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_condition_group(
        &self,
        action: &Action,
        branches: &[ConditionBranch],
        else_actions: Option<&[Action]>,
        parent: Option<&str>,
        model: &mut WorkflowModel,
        unsupported: &mut bool,
    ) -> Result<(), ModelError> {
        let decision_id = action.id.clone();
        let restart_id = format!("{decision_id}__restart");

        let handler = DecisionHandler {
            conditions: branches.iter().map(|b| b.condition.clone()).collect(),
            has_else: else_actions.is_some(),
        };
        model.add_node(
            WorkflowNode::new(&decision_id, NodeKind::Decision, Arc::new(handler))
                .with_disabled(action.disabled),
            parent,
        )?;
        // The join point follows the decision in the sibling list, so
        // actions after the group chain from it.
        model.add_node(marker(&restart_id, NodeKind::Restart), parent)?;

        for (index, branch) in branches.iter().enumerate() {
            let branch_id = branch.id.clone();
            let tail_callback = {
                let branch_id = branch_id.clone();
                let restart_id = restart_id.clone();
                move |model: &mut WorkflowModel| {
                    // An empty branch falls back to linking its entry
                    // straight to the join.
                    model.add_link_from_last_sibling(&branch_id, restart_id, None)
                }
            };
            model.add_node_with(
                marker(&branch_id, NodeKind::Branch),
                Some(&decision_id),
                None,
                Some(Box::new(tail_callback)),
            )?;
            model.add_link(
                decision_id.clone(),
                branch_id.clone(),
                Some(matched_predicate(Value::from(index))),
            )?;
            for child in &branch.actions {
                self.visit(child, Some(&branch_id), model, unsupported)?;
            }
        }

        match else_actions {
            Some(actions) => {
                let else_id = format!("{decision_id}__else");
                let tail_callback = {
                    let else_id = else_id.clone();
                    let restart_id = restart_id.clone();
                    move |model: &mut WorkflowModel| {
                        model.add_link_from_last_sibling(&else_id, restart_id, None)
                    }
                };
                model.add_node_with(
                    marker(&else_id, NodeKind::Branch),
                    Some(&decision_id),
                    None,
                    Some(Box::new(tail_callback)),
                )?;
                model.add_link(
                    decision_id.clone(),
                    else_id.clone(),
                    Some(matched_predicate(Value::from("else"))),
                )?;
                for child in actions {
                    self.visit(child, Some(&else_id), model, unsupported)?;
                }
            }
            None => {
                // No else arm: a no-match decision falls through to the join.
                model.add_link(
                    decision_id.clone(),
                    restart_id.clone(),
                    Some(matched_predicate(Value::Null)),
                )?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_foreach(
        &self,
        action: &Action,
        source: &str,
        value: &str,
        index: Option<&str>,
        body: &[Action],
        parent: Option<&str>,
        model: &mut WorkflowModel,
        unsupported: &mut bool,
    ) -> Result<(), ModelError> {
        if source.is_empty() {
            return Err(ModelError::MissingRequiredProperties {
                action_id: action.id.clone(),
                property: "source",
            });
        }
        if value.is_empty() {
            return Err(ModelError::MissingRequiredProperties {
                action_id: action.id.clone(),
                property: "value",
            });
        }

        let loop_id = action.id.clone();
        let select_id = format!("{loop_id}__select");
        let body_id = format!("{loop_id}__body");
        let body_end_id = format!("{loop_id}__body_end");
        let after_id = format!("{loop_id}__after");

        model.add_node_with(
            marker(&loop_id, NodeKind::LoopEntry).with_disabled(action.disabled),
            parent,
            Some(NodeTag::Loop {
                select_id: select_id.clone(),
                continuation_id: after_id.clone(),
            }),
            None,
        )?;
        // The post-loop continuation follows the loop in the sibling list;
        // actions after the loop chain from it.
        model.add_node(marker(&after_id, NodeKind::LoopContinuation), parent)?;

        let (value_scope, value_key) = parse_var_path(value);
        let select_handler = SelectItemHandler {
            loop_id: loop_id.clone(),
            source: source.to_string(),
            value_scope,
            value_key,
            index_target: index.map(parse_var_path),
        };
        model.add_node(
            WorkflowNode::new(&select_id, NodeKind::SelectItem, Arc::new(select_handler)),
            Some(&loop_id),
        )?;
        model.add_link(loop_id.clone(), select_id.clone(), None)?;

        model.add_node(marker(&body_id, NodeKind::LoopBodyStart), Some(&loop_id))?;
        model.add_link(
            select_id.clone(),
            body_id.clone(),
            Some(has_more_predicate(true)),
        )?;
        model.add_link(
            select_id.clone(),
            after_id.clone(),
            Some(has_more_predicate(false)),
        )?;

        for child in body {
            self.visit(child, Some(&body_id), model, unsupported)?;
        }

        let close_cycle = {
            let body_id = body_id.clone();
            move |model: &mut WorkflowModel| {
                model.add_link_from_last_sibling(&body_id, body_end_id.clone(), None)?;
                model.add_node(marker(&body_end_id, NodeKind::LoopBodyEnd), Some(&body_id))?;
                model.add_link(body_end_id, select_id, None)
            }
        };
        model.on_complete(Box::new(close_cycle));
        Ok(())
    }

    fn visit_loop_jump(
        &self,
        action: &Action,
        parent: Option<&str>,
        is_break: bool,
        model: &mut WorkflowModel,
    ) -> Result<(), ModelError> {
        model.add_node(
            marker(&action.id, NodeKind::Jump).with_disabled(action.disabled),
            parent,
        )?;
        let loop_node =
            model
                .nearest_loop(&action.id)
                .ok_or_else(|| ModelError::NoEnclosingLoop {
                    id: action.id.clone(),
                })?;
        let Some(NodeTag::Loop {
            select_id,
            continuation_id,
        }) = &loop_node.tag
        else {
            unreachable!("nearest_loop only returns loop-tagged nodes");
        };
        let target = if is_break {
            continuation_id.clone()
        } else {
            select_id.clone()
        };
        model.add_link(action.id.clone(), target, None)?;
        emit_clean_start(model, &action.id, parent)
    }

    fn visit_goto(
        &self,
        action: &Action,
        target: &str,
        parent: Option<&str>,
        model: &mut WorkflowModel,
    ) -> Result<(), ModelError> {
        if target.is_empty() {
            return Err(ModelError::MissingRequiredProperties {
                action_id: action.id.clone(),
                property: "target",
            });
        }
        model.add_node(
            marker(&action.id, NodeKind::Jump).with_disabled(action.disabled),
            parent,
        )?;
        // Forward references are fine; finalize resolves the target.
        model.add_link(action.id.clone(), target.to_string(), None)?;
        emit_clean_start(model, &action.id, parent)
    }

    fn visit_end(
        &self,
        action: &Action,
        label: &'static str,
        parent: Option<&str>,
        model: &mut WorkflowModel,
    ) -> Result<(), ModelError> {
        model.add_node(
            WorkflowNode::new(&action.id, NodeKind::End, Arc::new(EndHandler { label }))
                .with_disabled(action.disabled),
            parent,
        )?;
        emit_clean_start(model, &action.id, parent)
    }
}

fn marker(id: &str, kind: NodeKind) -> WorkflowNode {
    WorkflowNode::new(id, kind, Arc::new(MarkerHandler))
}

/// After a terminal jump, drop a clean-start sibling so nothing downstream
/// chains off the jump. No link touches the marker, ever.
fn emit_clean_start(
    model: &mut WorkflowModel,
    base_id: &str,
    parent: Option<&str>,
) -> Result<(), ModelError> {
    model.add_node(
        marker(&format!("{base_id}__fresh"), NodeKind::CleanStart),
        parent,
    )
}

/// Predicate over the decision node's result payload: did branch `expected`
/// match?
fn matched_predicate(expected: Value) -> LinkCondition {
    Arc::new(move |message: &WorkflowMessage| message.payload["matched"] == expected)
}

/// Predicate over the select node's result payload.
fn has_more_predicate(expected: bool) -> LinkCondition {
    Arc::new(move |message: &WorkflowMessage| message.payload["has_more"] == Value::Bool(expected))
}
