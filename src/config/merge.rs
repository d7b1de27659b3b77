//! Configuration merge logic
//!
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values, `overlay` taking precedence.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_override_keeps_siblings() {
        let base = json!({"controller": {"workers": 2, "poll_interval_ms": 1000}});
        let overlay = json!({"controller": {"workers": 8}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["controller"]["workers"], 8);
        assert_eq!(result["controller"]["poll_interval_ms"], 1000);
    }

    #[test]
    fn test_array_replaces() {
        let result = deep_merge(json!({"x": [1, 2, 3]}), json!({"x": [9]}));
        assert_eq!(result["x"], json!([9]));
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({"finalizer": "a/f", "log_filter": "info"});
        let user = json!({"log_filter": "debug"});
        let file = json!({"finalizer": "b/f"});
        let cli = json!({"log_filter": "warn"});

        let result = merge_layers(vec![builtin, user, file, cli]);
        assert_eq!(result["finalizer"], "b/f");
        assert_eq!(result["log_filter"], "warn");
    }
}
