//! Param normalization: positional adaptation and option folding.

use serde_json::Value;

/// Well-known option keys. During normalization, any of these found at
/// the top level of a params record — and not in the primitive's
/// keep-top-level set — is folded into `options` unless `options`
/// already carries it.
pub const OPTION_KEYS: &[&str] = &[
    "retries",
    "baseDelay",
    "timeoutMs",
    "maxDistance",
    "moveTimeoutMs",
    "moveRetries",
    "minDistance",
    "maxSearchAttempts",
    "reachDistance",
    "continueOnError",
    "collectDrops",
    "executor",
    "placeOn",
    "dontCheat",
];

/// Map a positional (array) params value onto the named record for a
/// primitive. Record and scalar params pass through unchanged; excess
/// array elements are dropped.
#[must_use]
pub fn adapt_positional(names: &[&str], params: &Value) -> Value {
    let Value::Array(items) = params else {
        return params.clone();
    };
    let mut record = serde_json::Map::new();
    for (name, item) in names.iter().zip(items.iter()) {
        record.insert((*name).to_string(), item.clone());
    }
    Value::Object(record)
}

/// Fold well-known option keys out of the top level into `options`.
/// Keys named in `keep` stay at the top level; keys already present in
/// `options` are not overwritten (the explicit options record wins).
pub fn fold_options(params: &mut Value, keep: &[&str]) {
    let Value::Object(map) = params else {
        return;
    };
    let mut folded = serde_json::Map::new();
    for key in OPTION_KEYS {
        if keep.contains(key) {
            continue;
        }
        if let Some(value) = map.remove(*key) {
            folded.insert((*key).to_string(), value);
        }
    }
    if folded.is_empty() {
        return;
    }
    let options = map
        .entry("options".to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(options_map) = options {
        for (key, value) in folded {
            options_map.entry(key).or_insert(value);
        }
    }
}
