//! Failure snapshots, fingerprints, and code extraction.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use cortex_core::{CodeDraft, Vec3};
use serde::{Deserialize, Serialize};

/// Immutable record of world and agent state at the moment of a
/// failure. The `error_hash` is the dedup key for fixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSnapshot {
    /// The failing task's name.
    pub task_name: String,
    /// The raw error message.
    pub error_message: String,
    /// Normalized fingerprint of (task, error).
    pub error_hash: String,
    /// Where the avatar was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    /// Health at failure time.
    pub health: f64,
    /// Food at failure time.
    pub food: f64,
    /// `"item x count"` lines.
    pub inventory_summary: Vec<String>,
    /// Names of blocks around the avatar, when a scan was available.
    pub nearby_blocks: Vec<String>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Fingerprint a failure: digits in the error collapse to `N` so that
/// coordinates and counts don't defeat deduplication, then
/// `base64(intent + ":" + normalized)` truncated to 16 characters.
#[must_use]
pub fn fingerprint(intent: &str, error: &str) -> String {
    let mut normalized = String::with_capacity(error.len());
    let mut in_digits = false;
    for ch in error.chars() {
        if ch.is_ascii_digit() {
            if !in_digits {
                normalized.push('N');
                in_digits = true;
            }
        } else {
            in_digits = false;
            normalized.push(ch);
        }
    }
    let encoded = STANDARD.encode(format!("{intent}:{normalized}"));
    encoded.chars().take(16).collect()
}

/// Pull a code blob out of a model response. A JSON-wrapped
/// `{thought, code}` object is preferred; a fenced code block is the
/// fallback.
#[must_use]
pub fn extract_code(text: &str) -> Option<CodeDraft> {
    let trimmed = text.trim();
    if let Ok(draft) = serde_json::from_str::<CodeDraft>(trimmed) {
        return Some(draft);
    }
    // The JSON may itself be fenced.
    if let Some(inner) = fenced_block(trimmed)
        && let Ok(draft) = serde_json::from_str::<CodeDraft>(inner.trim())
    {
        return Some(draft);
    }
    fenced_block(trimmed).map(|code| CodeDraft {
        thought: String::new(),
        code: code.trim().to_string(),
    })
}

fn fenced_block(text: &str) -> Option<&str> {
    let re = regex::Regex::new(r"(?s)```[a-zA-Z]*\n(.*?)```").expect("valid regex");
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_digits() {
        let a = fingerprint("gather_water", "No water within 32 blocks of (10, 64, -3)");
        let b = fingerprint("gather_water", "No water within 16 blocks of (999, 12, 40)");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_separates_intents() {
        let a = fingerprint("gather_water", "No water bucket");
        let b = fingerprint("gather_lava", "No water bucket");
        assert_ne!(a, b);
    }

    #[test]
    fn extract_prefers_json_draft() {
        let text = r#"{"thought": "need a bucket first", "code": "craft bucket"}"#;
        let draft = extract_code(text).unwrap();
        assert_eq!(draft.thought, "need a bucket first");
        assert_eq!(draft.code, "craft bucket");
    }

    #[test]
    fn extract_falls_back_to_fenced_block() {
        let text = "Here is the fix:\n```js\nconst x = 1;\n```\nGood luck.";
        let draft = extract_code(text).unwrap();
        assert_eq!(draft.code, "const x = 1;");
    }

    #[test]
    fn extract_handles_fenced_json() {
        let text = "```json\n{\"thought\": \"t\", \"code\": \"c\"}\n```";
        let draft = extract_code(text).unwrap();
        assert_eq!(draft.code, "c");
    }

    #[test]
    fn extract_none_for_prose() {
        assert!(extract_code("I cannot help with that.").is_none());
    }
}
