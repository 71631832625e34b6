#![deny(missing_docs)]
//! The primitive action layer of the cortex runtime.
//!
//! Deliberative code never touches the actuator port directly — it
//! dispatches [`cortex_core::Directive`]s here. Dispatch selects a
//! primitive from the registry (falling back to the skill registry for
//! unknown types), adapts positional params, folds option keys,
//! consults the behavior rule engine for policy (which may block the
//! action), wraps execution in retry-with-backoff, and always produces
//! an [`cortex_core::Outcome`] — executor errors never escape.
//!
//! The [`chain::ChainExecutor`] runs ordered step lists with shared
//! local memory, `${key}` / `${BB.path}` template resolution,
//! conditionals, and `store_as` captures.

pub mod builtin;
pub mod chain;
pub mod dispatch;
pub mod normalize;
pub mod registry;

pub use chain::{ChainExecutor, ChainResult, ChainStep, Condition, StepKind, StepRecord};
pub use dispatch::{ActionStats, Dispatcher, OverrideTable};
pub use registry::{ActionContext, ActionError, ActionRegistry, PrimitiveAction, RetryDefaults};
