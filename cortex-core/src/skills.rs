//! The skill-registry port — opaque domain skills by name.

use crate::error::SkillError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Object-safe trait for a registered skill.
///
/// Skill bodies are opaque to the runtime: mining routines, generated
/// fixes from the evolution engine, anything. The runtime only knows the
/// name, the schema, and how to call it.
pub trait Skill: Send + Sync {
    /// Unique skill name.
    fn name(&self) -> &str;

    /// JSON Schema for the skill's parameters.
    fn schema(&self) -> serde_json::Value;

    /// Execute the skill.
    fn call(
        &self,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, SkillError>> + Send + '_>>;
}

/// The skill-registry port. Single writer (the evolution engine), many
/// readers; registration overwrites any existing skill with the same
/// name, which is how hot-swapping works.
pub trait SkillRegistry: Send + Sync {
    /// Register or replace a skill.
    fn register(&self, skill: Arc<dyn Skill>);

    /// Look up a skill by name.
    fn find_skill(&self, name: &str) -> Option<Arc<dyn Skill>>;

    /// Names of every registered skill.
    fn discover_skills(&self) -> Vec<String>;

    /// (name, schema) for every registered skill.
    fn list_schemas(&self) -> Vec<(String, serde_json::Value)>;
}
