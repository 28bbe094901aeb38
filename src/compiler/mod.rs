//! Declarative workflow compiler.
//!
//! Turns an externally parsed [`Action`] tree — scopes, condition groups,
//! foreach loops, jumps, leaf effects — into an executable graph. The
//! interesting control-flow translation all lives in
//! [`DeclarativeCompiler`]: scope entry/exit bookkeeping, decision/restart
//! pairs for condition groups, loop cycles with iterator state in the
//! system scope, and clean-start markers after terminal jumps.
//!
//! Effects (the leaf actions the workflow language treats as opaque) run
//! through a single [`EffectHandler`] the caller supplies.

pub mod actions;
pub mod handlers;
pub mod visitor;

pub use actions::{Action, ActionKind, ConditionBranch};
pub use handlers::{EchoEffectHandler, EffectHandler};
pub use visitor::DeclarativeCompiler;
