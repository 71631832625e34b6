//! RecordingMemory — memory port double that records every write.

use crate::adapter::Vec3;
use crate::error::MemoryError;
use crate::memory::SemanticMemory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A [`SemanticMemory`] that keeps everything in maps for assertions.
#[derive(Default)]
pub struct RecordingMemory {
    facts: Mutex<Vec<(String, Vec<String>)>>,
    places: Mutex<HashMap<String, Vec3>>,
}

impl RecordingMemory {
    /// New empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every (kind, facts) pair remembered so far.
    pub fn recorded(&self) -> Vec<(String, Vec<String>)> {
        self.facts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticMemory for RecordingMemory {
    async fn remember(
        &self,
        kind: &str,
        facts: &[String],
        _metadata: serde_json::Value,
    ) -> Result<(), MemoryError> {
        self.facts
            .lock()
            .unwrap()
            .push((kind.to_string(), facts.to_vec()));
        Ok(())
    }

    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<String>, MemoryError> {
        let facts = self.facts.lock().unwrap();
        Ok(facts
            .iter()
            .flat_map(|(_, fs)| fs.iter())
            .filter(|f| f.contains(query))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn remember_place(&self, name: &str, pos: Vec3) -> Result<(), MemoryError> {
        self.places.lock().unwrap().insert(name.to_string(), pos);
        Ok(())
    }

    async fn get_place(&self, name: &str) -> Result<Option<Vec3>, MemoryError> {
        Ok(self.places.lock().unwrap().get(name).copied())
    }
}
