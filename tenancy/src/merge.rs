use crate::types::ConnectionParams;
use serde_json::Value;

/// Returns `base` with every field present in `overrides` replaced.
///
/// Nested objects are merged recursively, anything else (scalars, arrays,
/// nulls) replaces the base value wholesale. Fields missing from `overrides`
/// are inherited unchanged.
pub fn deep_merge(base: &ConnectionParams, overrides: &ConnectionParams) -> ConnectionParams {
    let mut merged = base.clone();

    for (key, value) in overrides {
        if let (Some(Value::Object(existing)), Value::Object(patch)) = (merged.get_mut(key), value)
        {
            *existing = deep_merge(existing, patch);
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> ConnectionParams {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_override_replaces_only_present_fields() {
        let base = params(json!({"ENGINE": "postgresql", "HOST": "db", "PORT": 5432}));
        let overrides = params(json!({"HOST": "r1"}));

        let merged = deep_merge(&base, &overrides);
        assert_eq!(
            Value::Object(merged),
            json!({"ENGINE": "postgresql", "HOST": "r1", "PORT": 5432})
        );
        // base untouched
        assert_eq!(base.get("HOST"), Some(&json!("db")));
    }

    #[test]
    fn test_nested_objects_merge() {
        let base = params(json!({"OPTIONS": {"sslmode": "require", "timeout": 5}}));
        let overrides = params(json!({"OPTIONS": {"timeout": 30}, "NAME": "t1"}));

        let merged = deep_merge(&base, &overrides);
        assert_eq!(
            Value::Object(merged),
            json!({"OPTIONS": {"sslmode": "require", "timeout": 30}, "NAME": "t1"})
        );
    }

    #[test]
    fn test_non_object_replaces_object() {
        let base = params(json!({"OPTIONS": {"sslmode": "require"}, "TAGS": ["a", "b"]}));
        let overrides = params(json!({"OPTIONS": null, "TAGS": ["c"]}));

        let merged = deep_merge(&base, &overrides);
        assert_eq!(Value::Object(merged), json!({"OPTIONS": null, "TAGS": ["c"]}));
    }
}
