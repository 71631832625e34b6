//! In-memory port implementations for testing.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! scriptable implementations that prove the port APIs are usable and
//! let downstream crates test against a simulated world.

mod in_memory_skills;
mod recording_memory;
mod scripted_model;
mod sim_adapter;
mod static_sandbox;

pub use in_memory_skills::{FnSkill, InMemorySkills};
pub use recording_memory::RecordingMemory;
pub use scripted_model::ScriptedModel;
pub use sim_adapter::{SimAdapter, SimWorld};
pub use static_sandbox::StaticSandbox;
