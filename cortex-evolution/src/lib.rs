#![deny(missing_docs)]
//! The evolution engine of the cortex runtime.
//!
//! Failures are raw material. Every task failure is captured as an
//! immutable snapshot of the world at the moment it happened and
//! fingerprinted; novel fingerprints go to the language-model port as a
//! structured repair prompt, and the extracted code — once it passes
//! sandbox validation — is hot-swapped into the skill registry as a
//! retained fix. Deaths produce one-sentence retrospectives stored
//! through the memory port. Combat outcomes nudge the genetic
//! parameter triple the reflex fights with.

pub mod engine;
pub mod metrics;
pub mod snapshot;

pub use engine::{DynamicReflex, EvolutionConfig, EvolutionEngine};
pub use metrics::LearningMetrics;
pub use snapshot::{FailureSnapshot, extract_code, fingerprint};
