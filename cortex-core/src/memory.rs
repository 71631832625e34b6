//! The memory port — durable facts and named places.

use crate::adapter::Vec3;
use crate::error::MemoryError;
use async_trait::async_trait;

/// Long-term semantic memory. Backends are external (KV, graph, vector);
/// the runtime only ever issues these four operations, and treats every
/// failure as non-fatal.
#[async_trait]
pub trait SemanticMemory: Send + Sync {
    /// Store facts of a kind with attached metadata.
    async fn remember(
        &self,
        kind: &str,
        facts: &[String],
        metadata: serde_json::Value,
    ) -> Result<(), MemoryError>;

    /// Retrieve up to `limit` facts relevant to the query.
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<String>, MemoryError>;

    /// Store a named location.
    async fn remember_place(&self, name: &str, pos: Vec3) -> Result<(), MemoryError>;

    /// Look up a named location.
    async fn get_place(&self, name: &str) -> Result<Option<Vec3>, MemoryError>;
}
