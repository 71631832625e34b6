//! Per-agent persisted state layout.
//!
//! Everything lives in one directory as pretty-printed JSON:
//! `behavior_rules.json`, `learning_metrics.json`,
//! `dynamic_reflexes.json`, `mental_snapshot.json`, and the
//! `core_extraction.json` bundle of everything the agent has learned.

use cortex_evolution::{DynamicReflex, LearningMetrics};
use cortex_rules::BehaviorRule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File locations under the agent's data directory.
#[derive(Debug, Clone)]
pub struct PersistPaths {
    /// `behavior_rules.json`
    pub rules: PathBuf,
    /// `learning_metrics.json`
    pub metrics: PathBuf,
    /// `dynamic_reflexes.json`
    pub reflexes: PathBuf,
    /// `mental_snapshot.json`
    pub snapshot: PathBuf,
    /// `core_extraction.json`
    pub extraction: PathBuf,
}

impl PersistPaths {
    /// The standard layout under `dir`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            rules: dir.join("behavior_rules.json"),
            metrics: dir.join("learning_metrics.json"),
            reflexes: dir.join("dynamic_reflexes.json"),
            snapshot: dir.join("mental_snapshot.json"),
            extraction: dir.join("core_extraction.json"),
        }
    }
}

/// The agent's working memory, saved at shutdown and restored at boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MentalSnapshot {
    /// Stack of behavioral states, most recent last.
    pub state_stack: Vec<String>,
    /// Named places and spatial notes.
    pub spatial_map: serde_json::Value,
    /// `"item x count"` lines.
    pub inventory_summary: Vec<String>,
}

impl MentalSnapshot {
    /// Write to `path` as pretty-printed JSON.
    pub async fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, text).await
    }

    /// Load from `path`; a missing file yields defaults.
    pub async fn load_from(path: &Path) -> std::io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Everything the agent has learned, bundled for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreExtraction {
    /// The live behavior rules.
    pub rules: Vec<BehaviorRule>,
    /// The retained failure→fix reflexes.
    pub reflexes: Vec<DynamicReflex>,
    /// The learning totals.
    pub metrics: LearningMetrics,
}

/// Save a list of dynamic reflexes.
pub async fn save_reflexes(path: &Path, reflexes: &[DynamicReflex]) -> std::io::Result<()> {
    let text = serde_json::to_string_pretty(reflexes)?;
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, text).await
}

/// Load dynamic reflexes; a missing file is an empty list.
pub async fn load_reflexes(path: &Path) -> std::io::Result<Vec<DynamicReflex>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Write the learned-state bundle.
pub async fn save_extraction(path: &Path, extraction: &CoreExtraction) -> std::io::Result<()> {
    let text = serde_json::to_string_pretty(extraction)?;
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, text).await
}
