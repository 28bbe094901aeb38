//! The declarative action tree the compiler consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One action in the declarative tree.
///
/// Every action carries a stable id (unique across the tree — compiled node
/// ids derive from it) and a disabled flag the dispatch wrapper honors at
/// run time. Parent relationships are implied by nesting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    /// Stable id, unique across the whole tree.
    pub id: String,
    /// Disabled actions still compile; dispatch skips them.
    #[serde(default)]
    pub disabled: bool,
    /// What this action is.
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// The closed set of action kinds the compiler understands.
///
/// The set is fixed so translation can match exhaustively; kinds outside it
/// arrive as [`Unsupported`](ActionKind::Unsupported), which compiles
/// best-effort and flags the workflow instead of raising.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// A named sequential block of actions.
    Scope { actions: Vec<Action> },
    /// An if/else-if/else ladder.
    ConditionGroup {
        branches: Vec<ConditionBranch>,
        #[serde(default)]
        else_actions: Option<Vec<Action>>,
    },
    /// Iterate a collection, binding each item to a variable.
    Foreach {
        /// Expression producing the collection.
        source: String,
        /// `scope.name` path the current item is bound to.
        value: String,
        /// Optional `scope.name` path for the current index.
        #[serde(default)]
        index: Option<String>,
        body: Vec<Action>,
    },
    /// Jump to the nearest enclosing loop's continuation.
    BreakLoop,
    /// Jump back to the nearest enclosing loop's select-next-item node.
    ContinueLoop,
    /// Jump to an arbitrary action by id; forward references are allowed.
    Goto { target: String },
    /// Terminate the whole conversation.
    EndConversation,
    /// Terminate the current dialog.
    EndDialog,
    /// Opaque leaf executed through the registered
    /// [`EffectHandler`](crate::compiler::EffectHandler).
    Effect { effect: String, payload: Value },
    /// Assign an expression's value to a `scope.name` variable.
    SetVariable { variable: String, value: String },
    /// An action kind this compiler does not know.
    Unsupported { original_kind: String },
}

/// One arm of a condition group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionBranch {
    /// Stable id for the branch's entry node.
    pub id: String,
    /// Boolean expression deciding the branch.
    pub condition: String,
    pub actions: Vec<Action>,
}

impl Action {
    fn new(id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            disabled: false,
            kind,
        }
    }

    /// A named sequential block.
    pub fn scope(id: impl Into<String>, actions: Vec<Action>) -> Self {
        Self::new(id, ActionKind::Scope { actions })
    }

    /// An if/else-if ladder without an else arm.
    pub fn condition_group(id: impl Into<String>, branches: Vec<ConditionBranch>) -> Self {
        Self::new(
            id,
            ActionKind::ConditionGroup {
                branches,
                else_actions: None,
            },
        )
    }

    /// An if/else-if ladder with an else arm.
    pub fn condition_group_with_else(
        id: impl Into<String>,
        branches: Vec<ConditionBranch>,
        else_actions: Vec<Action>,
    ) -> Self {
        Self::new(
            id,
            ActionKind::ConditionGroup {
                branches,
                else_actions: Some(else_actions),
            },
        )
    }

    /// Iterate `source`, binding each item to `value`.
    pub fn foreach(
        id: impl Into<String>,
        source: impl Into<String>,
        value: impl Into<String>,
        body: Vec<Action>,
    ) -> Self {
        Self::new(
            id,
            ActionKind::Foreach {
                source: source.into(),
                value: value.into(),
                index: None,
                body,
            },
        )
    }

    /// Break out of the nearest enclosing loop.
    pub fn break_loop(id: impl Into<String>) -> Self {
        Self::new(id, ActionKind::BreakLoop)
    }

    /// Skip to the next iteration of the nearest enclosing loop.
    pub fn continue_loop(id: impl Into<String>) -> Self {
        Self::new(id, ActionKind::ContinueLoop)
    }

    /// Jump to the action with the given id.
    pub fn goto(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            id,
            ActionKind::Goto {
                target: target.into(),
            },
        )
    }

    /// End the conversation.
    pub fn end_conversation(id: impl Into<String>) -> Self {
        Self::new(id, ActionKind::EndConversation)
    }

    /// End the current dialog.
    pub fn end_dialog(id: impl Into<String>) -> Self {
        Self::new(id, ActionKind::EndDialog)
    }

    /// An opaque effect leaf.
    pub fn effect(id: impl Into<String>, effect: impl Into<String>, payload: Value) -> Self {
        Self::new(
            id,
            ActionKind::Effect {
                effect: effect.into(),
                payload,
            },
        )
    }

    /// Assign `value` (an expression) to `variable` (a `scope.name` path).
    pub fn set_variable(
        id: impl Into<String>,
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            ActionKind::SetVariable {
                variable: variable.into(),
                value: value.into(),
            },
        )
    }

    /// An action kind outside the supported set.
    pub fn unsupported(id: impl Into<String>, original_kind: impl Into<String>) -> Self {
        Self::new(
            id,
            ActionKind::Unsupported {
                original_kind: original_kind.into(),
            },
        )
    }

    /// Mark this action disabled.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

impl ConditionBranch {
    pub fn new(
        id: impl Into<String>,
        condition: impl Into<String>,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            id: id.into(),
            condition: condition.into(),
            actions,
        }
    }
}
