//! Deep merge for JSON policy patches and option records.

/// Recursively merge `patch` into `base`. Objects merge key-wise; any
/// other value in `patch` replaces the value in `base`. `null` in the
/// patch removes the key.
pub fn deep_merge(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_merge_keywise() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 3});
        deep_merge(&mut base, &json!({"a": {"y": 9, "z": 10}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 9, "z": 10}, "b": 3}));
    }

    #[test]
    fn scalars_replace() {
        let mut base = json!({"a": {"x": 1}});
        deep_merge(&mut base, &json!({"a": 5}));
        assert_eq!(base, json!({"a": 5}));
    }

    #[test]
    fn null_removes() {
        let mut base = json!({"a": 1, "b": 2});
        deep_merge(&mut base, &json!({"a": null}));
        assert_eq!(base, json!({"b": 2}));
    }
}
