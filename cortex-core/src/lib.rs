//! # cortex-core — port traits and shared types for the cortex runtime
//!
//! This crate defines the boundary between the cognitive runtime and the
//! world it inhabits. The runtime never talks to a game server, a language
//! model, or a vector store directly — it talks to the five ports defined
//! here, and everything on the far side of a port is replaceable glue.
//!
//! ## The Ports
//!
//! | Port | Trait | What it does |
//! |------|-------|--------------|
//! | Actuator | [`GameAdapter`] | Pre-parsed world events in, avatar commands out |
//! | Planning | [`LanguageModel`] | Chat and code-generation capabilities |
//! | Validation | [`Sandbox`] | Execute untrusted code blobs against a finite ABI |
//! | Memory | [`SemanticMemory`] | Durable facts and named places, failures non-fatal |
//! | Skills | [`SkillRegistry`] | Opaque domain skills registered and discovered by name |
//!
//! ## Shared types
//!
//! [`Signal`] is the closed set of bus signal names, [`GameEvent`] the closed
//! set of inbound world events, [`Outcome`] the uniform result of every
//! primitive action, and [`AgentConfig`] the recognized configuration keys.
//!
//! ## Design principle
//!
//! Every port trait is operation-defined, not mechanism-defined.
//! [`GameAdapter::dig`] means "cause the avatar to break that block" —
//! not "send packet 0x1c". This is what makes adapters swappable: a
//! protocol client, a headless simulator, and a test double all implement
//! the same trait.
//!
//! ## Dependency notes
//!
//! Heterogeneous payloads (signal payloads, action params, skill schemas)
//! are `serde_json::Value`. JSON is the interchange format for everything
//! this runtime persists or passes across a port, and `serde_json::Value`
//! is the de facto standard carrier in the Rust ecosystem.

#![deny(missing_docs)]

pub mod action;
pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod lm;
pub mod memory;
pub mod merge;
pub mod outcome;
pub mod sandbox;
pub mod signal;
pub mod skills;
pub mod tuning;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use action::{ActionName, ActionOptions, Directive};
pub use adapter::{
    Block, BotStatus, Control, Entity, EntityFilter, EquipSlot, GameAdapter, ItemStack, Vec3,
};
pub use config::{AgentConfig, Timeouts};
pub use error::{AdapterError, LmError, MemoryError, SandboxError, SkillError};
pub use event::GameEvent;
pub use lm::{ChatMessage, ChatRole, CodeDraft, LanguageModel, LmPriority};
pub use memory::SemanticMemory;
pub use merge::deep_merge;
pub use outcome::Outcome;
pub use sandbox::{Sandbox, Validation};
pub use signal::{Signal, SignalEvent};
pub use skills::{Skill, SkillRegistry};
pub use tuning::{GeneticParams, SharedGeneticParams, shared_genetic_params};
