//! Dot-keyed shared state with last-writer tags.
//!
//! The blackboard is the coordination surface between reflexes and
//! deliberation: perception snapshots, threat levels, strategy cursors.
//! Keys are dot-delimited paths into one nested JSON document. Reads
//! never block on I/O and never materialize intermediates; writes create
//! intermediate maps as needed and are serialized by the write lock.

use std::collections::HashMap;
use std::sync::RwLock;

struct BbState {
    root: serde_json::Map<String, serde_json::Value>,
    sources: HashMap<String, String>,
}

/// Process-scoped dot-keyed state.
pub struct Blackboard {
    state: RwLock<BbState>,
}

impl Blackboard {
    /// Create an empty blackboard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BbState {
                root: serde_json::Map::new(),
                sources: HashMap::new(),
            }),
        }
    }

    /// Write a value at a dot path, recording who wrote it.
    /// Intermediate maps are created; an intermediate non-map value is
    /// replaced by a map.
    pub fn set(&self, path: &str, value: serde_json::Value, source: &str) {
        let mut state = self.state.write().unwrap();
        state.sources.insert(path.to_string(), source.to_string());

        let mut parts = path.split('.').peekable();
        let mut current = &mut state.root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                current.insert(part.to_string(), value);
                return;
            }
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = serde_json::Value::Object(serde_json::Map::new());
            }
            current = entry.as_object_mut().unwrap();
        }
    }

    /// Read the value at a dot path, or `None` if any segment is absent.
    /// Never creates intermediates.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<serde_json::Value> {
        let state = self.state.read().unwrap();
        let mut current: &serde_json::Value = &serde_json::Value::Null;
        let mut first = true;
        for part in path.split('.') {
            current = if first {
                first = false;
                state.root.get(part)?
            } else {
                current.as_object()?.get(part)?
            };
        }
        Some(current.clone())
    }

    /// Convenience: read a number at a path.
    #[must_use]
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    /// Who last wrote this exact path, if anyone.
    #[must_use]
    pub fn source_of(&self, path: &str) -> Option<String> {
        self.state.read().unwrap().sources.get(path).cloned()
    }

    /// Shallow copy of the subtree at `path` (the whole document for
    /// an empty path). Used to publish perception state to subscribers.
    #[must_use]
    pub fn snapshot(&self, path: &str) -> serde_json::Value {
        if path.is_empty() {
            let state = self.state.read().unwrap();
            return serde_json::Value::Object(state.root.clone());
        }
        self.get(path).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediates() {
        let bb = Blackboard::new();
        bb.set("pos.home.x", json!(10), "test");
        assert_eq!(bb.get("pos.home.x"), Some(json!(10)));
        assert_eq!(bb.get("pos.home"), Some(json!({"x": 10})));
    }

    #[test]
    fn get_absent_is_none_and_creates_nothing() {
        let bb = Blackboard::new();
        assert_eq!(bb.get("a.b.c"), None);
        assert_eq!(bb.snapshot(""), json!({}));
    }

    #[test]
    fn last_writer_tag_is_recorded() {
        let bb = Blackboard::new();
        bb.set("threat.level", json!(0.4), "combat");
        bb.set("threat.level", json!(0.9), "scanner");
        assert_eq!(bb.source_of("threat.level").as_deref(), Some("scanner"));
    }

    #[test]
    fn non_map_intermediate_is_replaced() {
        let bb = Blackboard::new();
        bb.set("a", json!(1), "t");
        bb.set("a.b", json!(2), "t");
        assert_eq!(bb.get("a.b"), Some(json!(2)));
    }

    #[test]
    fn snapshot_is_detached() {
        let bb = Blackboard::new();
        bb.set("inv.logs", json!(3), "t");
        let snap = bb.snapshot("inv");
        bb.set("inv.logs", json!(5), "t");
        assert_eq!(snap, json!({"logs": 3}));
    }
}
