//! Recognized configuration keys and their defaults.

use serde::{Deserialize, Serialize};

/// Nested timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wall-clock budget for sandboxed code execution, seconds.
    pub code_execution: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { code_execution: 90 }
    }
}

/// Security sub-table. `whitelist` here and the top-level `whitelist`
/// are merged when resolving friends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Friend usernames.
    pub whitelist: Vec<String>,
}

/// The agent's configuration. Every field has a default; a config file
/// only needs the keys it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Health at or below which survival behavior triggers.
    pub critical_health: f64,
    /// Food at or below which hunger is treated as a threat.
    pub critical_food: f64,
    /// Radius in blocks the agent treats as home territory.
    pub territorial_radius: f64,
    /// Bound on command loops; -1 means unbounded.
    pub max_commands: i64,
    /// Gates the code-execution primitive entirely.
    pub allow_insecure_coding: bool,
    /// When non-empty, outbound chat only goes to these usernames.
    pub only_chat_with: Vec<String>,
    /// Food level at which auto-eat starts.
    pub auto_eat_start: f64,
    /// Nested timeout settings.
    pub timeouts: Timeouts,
    /// Friend usernames.
    pub whitelist: Vec<String>,
    /// Security sub-table.
    pub security: SecurityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            critical_health: 8.0,
            critical_food: 6.0,
            territorial_radius: 15.0,
            max_commands: -1,
            allow_insecure_coding: false,
            only_chat_with: Vec::new(),
            auto_eat_start: 14.0,
            timeouts: Timeouts::default(),
            whitelist: Vec::new(),
            security: SecurityConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parse a config from JSON text. Unknown keys are ignored; missing
    /// keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The merged friend list (`whitelist` ∪ `security.whitelist`).
    #[must_use]
    pub fn friends(&self) -> Vec<String> {
        let mut out = self.whitelist.clone();
        for name in &self.security.whitelist {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    /// Whether outbound chat to `user` is allowed under `only_chat_with`.
    #[must_use]
    pub fn may_chat_with(&self, user: &str) -> bool {
        self.only_chat_with.is_empty() || self.only_chat_with.iter().any(|u| u == user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = AgentConfig::default();
        assert_eq!(c.critical_health, 8.0);
        assert_eq!(c.critical_food, 6.0);
        assert_eq!(c.territorial_radius, 15.0);
        assert_eq!(c.max_commands, -1);
        assert_eq!(c.auto_eat_start, 14.0);
        assert_eq!(c.timeouts.code_execution, 90);
        assert!(!c.allow_insecure_coding);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = AgentConfig::from_json(r#"{"critical_health": 10}"#).unwrap();
        assert_eq!(c.critical_health, 10.0);
        assert_eq!(c.critical_food, 6.0);
    }

    #[test]
    fn friends_merges_both_whitelists() {
        let c = AgentConfig::from_json(
            r#"{"whitelist": ["alice"], "security": {"whitelist": ["bob", "alice"]}}"#,
        )
        .unwrap();
        assert_eq!(c.friends(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn chat_whitelist_empty_allows_all() {
        let c = AgentConfig::default();
        assert!(c.may_chat_with("anyone"));
        let c = AgentConfig::from_json(r#"{"only_chat_with": ["alice"]}"#).unwrap();
        assert!(c.may_chat_with("alice"));
        assert!(!c.may_chat_with("bob"));
    }
}
