#![deny(missing_docs)]
//! The combat reflex of the cortex runtime.
//!
//! A reactive state machine (IDLE → ENGAGE → RETREAT) driven by a 50 ms
//! tick while engaged. Each tick runs the deadman switch, the tick
//! circuit breaker, auto-totem, emergency heal, projectile/creeper
//! defense, and range-banded engagement with line-of-sight and terrain
//! checks. The reflex preempts deliberative code by holding the
//! look/move actuator locks for the duration of an engagement, and
//! reports every combat outcome on the bus for the evolution engine.

pub mod fsm;

pub use fsm::{CombatConfig, CombatError, CombatReflex, CombatState};
