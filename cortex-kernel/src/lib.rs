#![deny(missing_docs)]
//! Kernel services of the cortex runtime.
//!
//! Five tightly coupled pieces that everything else builds on:
//!
//! - [`bus::SignalBus`] — typed pub/sub with per-subscription throttling
//!   and fan-out isolation
//! - [`blackboard::Blackboard`] — dot-keyed shared state with writer tags
//! - [`locks::LockManager`] — named asynchronous mutexes arbitrating the
//!   avatar's actuators
//! - [`scheduler::Scheduler`] — priority classes, utility scoring, and a
//!   watchdog over cooperative tasks
//! - [`retry::retry`] — exponential-backoff wrapper with a context tag
//!
//! Plus the global [`lmq::LmQueue`] that rate-limits, priority-orders,
//! and circuit-breaks every language-model call in the process.

pub mod blackboard;
pub mod bus;
pub mod lmq;
pub mod locks;
pub mod retry;
pub mod scheduler;

pub use blackboard::Blackboard;
pub use bus::{SignalBus, SubscriptionId};
pub use lmq::{LmQueue, LmQueueConfig};
pub use locks::LockManager;
pub use retry::{Retried, RetryOptions, retry};
pub use scheduler::{Priority, Scheduler, TaskHandle, TaskSpec};
