//! Learning totals persisted to `learning_metrics.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters the evolution engine maintains across its whole life.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningMetrics {
    /// Failure snapshots captured.
    pub snapshots_captured: u64,
    /// Fixes hot-swapped into the skill registry.
    pub skills_learned: u64,
    /// Skills refactored after deaths.
    pub skills_refactored: u64,
    /// Death retrospectives stored.
    pub death_lessons: u64,
    /// Combat wins observed.
    pub combat_wins: u64,
    /// Combat losses observed.
    pub combat_losses: u64,
    /// Last time any counter moved.
    pub last_updated: DateTime<Utc>,
}

impl Default for LearningMetrics {
    fn default() -> Self {
        Self {
            snapshots_captured: 0,
            skills_learned: 0,
            skills_refactored: 0,
            death_lessons: 0,
            combat_wins: 0,
            combat_losses: 0,
            last_updated: Utc::now(),
        }
    }
}

impl LearningMetrics {
    /// Write to `path` as pretty-printed JSON.
    pub async fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, text).await
    }

    /// Load from `path`; a missing file yields defaults.
    pub async fn load_from(path: &std::path::Path) -> std::io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning_metrics.json");

        let missing = LearningMetrics::load_from(&path).await.unwrap();
        assert_eq!(missing.skills_learned, 0);

        let mut metrics = LearningMetrics::default();
        metrics.skills_learned = 3;
        metrics.save_to(&path).await.unwrap();
        let back = LearningMetrics::load_from(&path).await.unwrap();
        assert_eq!(back.skills_learned, 3);
    }
}
