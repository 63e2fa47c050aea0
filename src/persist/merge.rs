use serde_json::Value;

/// Merge `source` into `target`.
///
/// Nested objects are merged recursively; everything else (arrays, strings,
/// numbers, null) in `source` overwrites `target`. Nothing happens unless
/// both sides are objects. Returns whether `target` changed.
pub fn deep_merge(target: &mut Value, source: &Value) -> bool {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return false;
    };

    let mut changed = false;
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                changed |= deep_merge(existing, value);
            }
            Some(existing) => {
                if existing != value {
                    *existing = value.clone();
                    changed = true;
                }
            }
            None => {
                target.insert(key.clone(), value.clone());
                changed = true;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_nested_objects() {
        let mut target = json!({ "a": { "b": 1, "c": 2 }, "keep": true });
        let changed = deep_merge(&mut target, &json!({ "a": { "c": 3 } }));

        assert!(changed);
        assert_eq!(target, json!({ "a": { "b": 1, "c": 3 }, "keep": true }));
    }

    #[test]
    fn arrays_are_replaced() {
        let mut target = json!({ "list": [1, 2, 3] });
        deep_merge(&mut target, &json!({ "list": [4] }));
        assert_eq!(target, json!({ "list": [4] }));
    }

    #[test]
    fn identical_source_reports_no_change() {
        let mut target = json!({ "a": { "b": 1 } });
        assert!(!deep_merge(&mut target, &json!({ "a": { "b": 1 } })));
    }

    #[test]
    fn non_objects_are_ignored() {
        let mut target = json!(1);
        assert!(!deep_merge(&mut target, &json!({ "a": 1 })));
        let mut target = json!({ "a": 1 });
        assert!(!deep_merge(&mut target, &json!("text")));
        assert_eq!(target, json!({ "a": 1 }));
    }
}
