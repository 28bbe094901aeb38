//! Runtime configuration for workflow runs.

use std::fmt;
use std::sync::Arc;

use crate::scopes::{ExpressionEvaluator, LiteralEvaluator};

/// How frontier nodes within one superstep are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One node at a time, in deterministic frontier order. Each node sees
    /// the scope writes of the nodes dispatched before it in the same step.
    #[default]
    Sequential,
    /// All frontier nodes joined concurrently. Each node sees the scoped
    /// state as of the step start; commits apply in frontier order.
    Concurrent,
}

/// Configuration for a [`WorkflowRunner`](crate::runtimes::WorkflowRunner).
///
/// # Examples
///
/// ```
/// use loomflow::runtimes::{ExecutionMode, RuntimeConfig};
///
/// let config = RuntimeConfig::new()
///     .with_mode(ExecutionMode::Concurrent)
///     .with_max_supersteps(500);
/// assert_eq!(config.mode, ExecutionMode::Concurrent);
/// ```
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Correlation id for the run; a fresh UUID when unset.
    pub run_id: Option<String>,
    /// Superstep execution mode.
    pub mode: ExecutionMode,
    /// Hard cap on supersteps, guarding against runaway cycles.
    pub max_supersteps: u64,
    /// Expression evaluator bound to every node invocation.
    pub evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            mode: ExecutionMode::default(),
            max_supersteps: 1_000,
            evaluator: Arc::new(LiteralEvaluator),
        }
    }
}

impl RuntimeConfig {
    /// Default configuration: sequential mode, generated run id, literal
    /// evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration from the environment, with `.env` overrides loaded
    /// through dotenvy.
    ///
    /// Recognized variables: `LOOMFLOW_EXECUTION_MODE`
    /// (`sequential`/`concurrent`) and `LOOMFLOW_MAX_SUPERSTEPS`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(mode) = std::env::var("LOOMFLOW_EXECUTION_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "concurrent" => config.mode = ExecutionMode::Concurrent,
                "sequential" => config.mode = ExecutionMode::Sequential,
                other => tracing::warn!(mode = %other, "unrecognized execution mode, keeping default"),
            }
        }
        if let Ok(limit) = std::env::var("LOOMFLOW_MAX_SUPERSTEPS") {
            match limit.parse() {
                Ok(limit) => config.max_supersteps = limit,
                Err(_) => {
                    tracing::warn!(limit = %limit, "unparseable superstep limit, keeping default");
                }
            }
        }
        config
    }

    /// Pin the run id instead of generating one.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Set the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the superstep cap.
    #[must_use]
    pub fn with_max_supersteps(mut self, max: u64) -> Self {
        self.max_supersteps = max;
        self
    }

    /// Bind a custom expression evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// The configured run id, or a freshly generated UUID.
    #[must_use]
    pub fn resolved_run_id(&self) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("run_id", &self.run_id)
            .field("mode", &self.mode)
            .field("max_supersteps", &self.max_supersteps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Defaults are sequential with a generous step cap.
    fn test_defaults() {
        let config = RuntimeConfig::new();
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.max_supersteps, 1_000);
        assert!(config.run_id.is_none());
    }

    #[test]
    /// A pinned run id is used verbatim; otherwise ids are unique.
    fn test_run_id_resolution() {
        let pinned = RuntimeConfig::new().with_run_id("run-42");
        assert_eq!(pinned.resolved_run_id(), "run-42");

        let fresh = RuntimeConfig::new();
        assert_ne!(fresh.resolved_run_id(), fresh.resolved_run_id());
    }
}
