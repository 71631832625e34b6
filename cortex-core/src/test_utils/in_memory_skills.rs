//! InMemorySkills — HashMap-backed skill registry.

use crate::error::SkillError;
use crate::skills::{Skill, SkillRegistry};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// A [`SkillRegistry`] backed by a `HashMap` behind a `RwLock`.
/// Registration overwrites, which is how hot-swap is exercised in tests.
#[derive(Default)]
pub struct InMemorySkills {
    skills: RwLock<HashMap<String, Arc<dyn Skill>>>,
}

impl InMemorySkills {
    /// New empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SkillRegistry for InMemorySkills {
    fn register(&self, skill: Arc<dyn Skill>) {
        self.skills
            .write()
            .unwrap()
            .insert(skill.name().to_string(), skill);
    }

    fn find_skill(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.read().unwrap().get(name).cloned()
    }

    fn discover_skills(&self) -> Vec<String> {
        self.skills.read().unwrap().keys().cloned().collect()
    }

    fn list_schemas(&self) -> Vec<(String, serde_json::Value)> {
        self.skills
            .read()
            .unwrap()
            .values()
            .map(|s| (s.name().to_string(), s.schema()))
            .collect()
    }
}

/// Build a [`Skill`] from a name and a synchronous closure.
pub struct FnSkill<F> {
    name: String,
    schema: serde_json::Value,
    f: F,
}

impl<F> FnSkill<F>
where
    F: Fn(serde_json::Value) -> Result<serde_json::Value, SkillError> + Send + Sync,
{
    /// Wrap a closure as a skill with an open schema.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            schema: serde_json::json!({"type": "object"}),
            f,
        }
    }
}

impl<F> Skill for FnSkill<F>
where
    F: Fn(serde_json::Value) -> Result<serde_json::Value, SkillError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn call(
        &self,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, SkillError>> + Send + '_>> {
        let result = (self.f)(params);
        Box::pin(async move { result })
    }
}
