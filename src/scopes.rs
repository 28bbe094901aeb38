//! Scoped variable state for workflow runs.
//!
//! Variables are partitioned into named scopes (global, per-topic, system).
//! A [`Scopes`] container aggregates every scope for one run: it can be
//! serialized for checkpointing by an external durable-execution host,
//! restored, cleared per-scope, or have individual keys reset. Each run owns
//! its `Scopes` exclusively; concurrent runs never share one.
//!
//! Formula resolution is delegated to an [`ExpressionEvaluator`] — the
//! embedded expression language is an external collaborator, specified only
//! at this interface. [`LiteralEvaluator`] ships as a minimal built-in that
//! resolves `=scope.key` variable references and JSON literals, enough for
//! loops and conditions in tests.
//!
//! # Examples
//!
//! ```
//! use loomflow::scopes::{Scopes, ExpressionEvaluator, LiteralEvaluator};
//! use serde_json::json;
//!
//! let mut scopes = Scopes::new();
//! scopes.set(Scopes::GLOBAL, "user", json!("ada"));
//!
//! let evaluator = LiteralEvaluator;
//! let value = evaluator.evaluate("=global.user", &scopes).unwrap();
//! assert_eq!(value, json!("ada"));
//!
//! // Checkpoint and restore
//! let saved = scopes.to_json().unwrap();
//! let restored = Scopes::restore(&saved).unwrap();
//! assert_eq!(restored.get(Scopes::GLOBAL, "user"), Some(&json!("ada")));
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A named partition of key→value variable bindings.
///
/// Values are dynamically typed JSON, tagged by the scope they live in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    vars: FxHashMap<String, Value>,
}

impl Scope {
    /// Look up a variable in this scope.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Bind a variable in this scope, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(key.into(), value)
    }

    /// Remove a single binding.
    pub fn reset(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key)
    }

    /// Drop every binding in this scope.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Iterate over the bindings in this scope.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bindings currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true when the scope holds no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// All named scopes for a single run.
///
/// The three well-known scopes exist from construction; additional scopes
/// are created on first write. Serialization preserves every scope so a run
/// can be checkpointed and resumed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scopes {
    scopes: FxHashMap<String, Scope>,
}

impl Scopes {
    /// Workflow-wide variables.
    pub const GLOBAL: &'static str = "global";
    /// Per-topic (per-conversation) variables.
    pub const TOPIC: &'static str = "topic";
    /// Runtime-internal state, e.g. loop iterators.
    pub const SYSTEM: &'static str = "system";

    /// Creates a container with the three well-known scopes present.
    #[must_use]
    pub fn new() -> Self {
        let mut scopes = FxHashMap::default();
        scopes.insert(Self::GLOBAL.to_string(), Scope::default());
        scopes.insert(Self::TOPIC.to_string(), Scope::default());
        scopes.insert(Self::SYSTEM.to_string(), Scope::default());
        Self { scopes }
    }

    /// Look up a variable by scope name and key.
    #[must_use]
    pub fn get(&self, scope: &str, key: &str) -> Option<&Value> {
        self.scopes.get(scope).and_then(|s| s.get(key))
    }

    /// Bind a variable, creating the scope on first write.
    pub fn set(&mut self, scope: &str, key: impl Into<String>, value: Value) -> Option<Value> {
        self.scopes
            .entry(scope.to_string())
            .or_default()
            .set(key, value)
    }

    /// Remove a single binding from a scope.
    pub fn reset_key(&mut self, scope: &str, key: &str) -> Option<Value> {
        self.scopes.get_mut(scope).and_then(|s| s.reset(key))
    }

    /// Drop every binding in one scope, keeping the scope itself.
    pub fn clear_scope(&mut self, scope: &str) {
        if let Some(s) = self.scopes.get_mut(scope) {
            s.clear();
        }
    }

    /// Borrow a whole scope by name.
    #[must_use]
    pub fn scope(&self, scope: &str) -> Option<&Scope> {
        self.scopes.get(scope)
    }

    /// Names of every scope currently held.
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Serialize the full container for checkpointing.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Restore a container previously produced by [`to_json`](Self::to_json).
    pub fn restore(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// Errors surfaced by expression evaluation.
#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    /// The expression referenced a variable that is not bound.
    #[error("unknown variable: {scope}.{key}")]
    #[diagnostic(
        code(loomflow::scopes::unknown_variable),
        help("Check that an earlier action assigned this variable.")
    )]
    UnknownVariable { scope: String, key: String },

    /// The expression could not be parsed or evaluated.
    #[error("invalid expression: {expr}")]
    #[diagnostic(code(loomflow::scopes::invalid_expression))]
    InvalidExpression { expr: String },
}

/// Resolves formulas against the scoped state of a run.
///
/// The expression grammar itself is outside this crate; implementations wrap
/// whatever engine the host embeds. The runtime binds the active `Scopes`
/// to the evaluator for the duration of one node invocation by passing them
/// to every call — no evaluator retains cross-run state.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expr` against `scopes`, producing a JSON value.
    fn evaluate(&self, expr: &str, scopes: &Scopes) -> Result<Value, EvalError>;

    /// Evaluate `expr` and coerce the result to a boolean.
    ///
    /// Default coercion: JSON `true` is true; everything else is false.
    fn evaluate_bool(&self, expr: &str, scopes: &Scopes) -> Result<bool, EvalError> {
        Ok(matches!(self.evaluate(expr, scopes)?, Value::Bool(true)))
    }
}

/// Minimal built-in evaluator.
///
/// Supported forms:
/// - `=scope.key` — variable lookup (errors when unbound)
/// - any valid JSON literal — returned as-is
/// - anything else — returned as a string literal
#[derive(Clone, Copy, Debug, Default)]
pub struct LiteralEvaluator;

impl ExpressionEvaluator for LiteralEvaluator {
    fn evaluate(&self, expr: &str, scopes: &Scopes) -> Result<Value, EvalError> {
        if let Some(path) = expr.strip_prefix('=') {
            let (scope, key) = path.split_once('.').ok_or_else(|| EvalError::InvalidExpression {
                expr: expr.to_string(),
            })?;
            return scopes
                .get(scope, key)
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable {
                    scope: scope.to_string(),
                    key: key.to_string(),
                });
        }
        Ok(serde_json::from_str(expr).unwrap_or_else(|_| Value::String(expr.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    /// Well-known scopes exist from construction; writes create new scopes.
    fn test_scope_lifecycle() {
        let mut scopes = Scopes::new();
        assert!(scopes.scope(Scopes::GLOBAL).is_some());
        assert!(scopes.scope("custom").is_none());

        scopes.set("custom", "k", json!(1));
        assert_eq!(scopes.get("custom", "k"), Some(&json!(1)));

        scopes.reset_key("custom", "k");
        assert_eq!(scopes.get("custom", "k"), None);

        scopes.set(Scopes::TOPIC, "a", json!("x"));
        scopes.set(Scopes::TOPIC, "b", json!("y"));
        scopes.clear_scope(Scopes::TOPIC);
        assert!(scopes.scope(Scopes::TOPIC).unwrap().is_empty());
    }

    #[test]
    /// Checkpoint round-trip preserves every scope and binding.
    fn test_serialize_restore() {
        let mut scopes = Scopes::new();
        scopes.set(Scopes::GLOBAL, "user", json!("ada"));
        scopes.set(Scopes::SYSTEM, "loop_1", json!({"index": 3}));

        let saved = scopes.to_json().expect("serialize");
        let restored = Scopes::restore(&saved).expect("restore");
        assert_eq!(restored, scopes);
    }

    #[test]
    /// Variable references resolve; unbound variables error.
    fn test_literal_evaluator_variables() {
        let mut scopes = Scopes::new();
        scopes.set(Scopes::GLOBAL, "count", json!(5));

        let eval = LiteralEvaluator;
        assert_eq!(eval.evaluate("=global.count", &scopes).unwrap(), json!(5));
        assert!(matches!(
            eval.evaluate("=global.missing", &scopes),
            Err(EvalError::UnknownVariable { .. })
        ));
        assert!(matches!(
            eval.evaluate("=nodot", &scopes),
            Err(EvalError::InvalidExpression { .. })
        ));
    }

    #[test]
    /// Non-reference expressions parse as JSON or fall back to strings.
    fn test_literal_evaluator_literals() {
        let scopes = Scopes::new();
        let eval = LiteralEvaluator;
        assert_eq!(eval.evaluate("true", &scopes).unwrap(), json!(true));
        assert_eq!(eval.evaluate("[1,2]", &scopes).unwrap(), json!([1, 2]));
        assert_eq!(eval.evaluate("hello", &scopes).unwrap(), json!("hello"));
        assert!(eval.evaluate_bool("true", &scopes).unwrap());
        assert!(!eval.evaluate_bool("\"yes\"", &scopes).unwrap());
    }
}
