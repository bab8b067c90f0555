//! Structural merge
//!
//! Merges generated content into existing content without textual patching:
//! mappings merge key-wise, sequences concatenate keeping the first
//! occurrence of each item, scalars keep the first non-empty value. The empty
//! value of each shape is the identity.

use serde_json::Value;

/// Whether a value is the empty element of its shape
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Merge `incoming` into `base`
pub fn merge_values(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(incoming)) => {
            for item in incoming {
                if !base.contains(&item) {
                    base.push(item);
                }
            }
        }
        (base, incoming) => {
            if is_empty_value(base) {
                *base = incoming;
            }
        }
    }
}

/// Concatenate lines, keeping only the first occurrence of each
pub fn merge_lines(base: &mut Vec<String>, incoming: Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::with_capacity(base.len() + incoming.len());
    for line in base.drain(..).chain(incoming) {
        if seen.insert(line.clone()) {
            merged.push(line);
        }
    }
    *base = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn merged(a: Value, b: Value) -> Value {
        let mut a = a;
        merge_values(&mut a, b);
        a
    }

    #[test]
    fn test_scalars_keep_first_non_empty() {
        assert_eq!(merged(json!("a"), json!("b")), json!("a"));
        assert_eq!(merged(json!(""), json!("b")), json!("b"));
        assert_eq!(merged(json!(null), json!(3)), json!(3));
    }

    #[test]
    fn test_sequences_concatenate_without_duplicates() {
        assert_eq!(
            merged(json!(["a", "b"]), json!(["b", "c"])),
            json!(["a", "b", "c"])
        );
    }

    #[test]
    fn test_nested_mappings() {
        let a = json!({"tool": {"flit": {"requires": ["pandas"]}}});
        let b = json!({"tool": {"flit": {"requires": ["numpy"], "module": "x"}}});
        assert_eq!(
            merged(a, b),
            json!({"tool": {"flit": {"requires": ["pandas", "numpy"], "module": "x"}}})
        );
    }

    #[test]
    fn test_merge_is_associative() {
        let a = json!({"k": ["1"], "s": "", "m": {"x": 1}});
        let b = json!({"k": ["2"], "s": "b", "m": {"y": 2}});
        let c = json!({"k": ["1", "3"], "s": "c", "m": {"x": 5, "z": 3}});

        let left = merged(merged(a.clone(), b.clone()), c.clone());
        let right = merged(a, merged(b, c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_empty_is_identity() {
        let a = json!({"k": ["1"], "s": "x"});
        assert_eq!(merged(a.clone(), json!({})), a);
        assert_eq!(merged(json!({}), a.clone()), a);
    }

    #[test]
    fn test_merge_lines_dedups_in_order() {
        let mut base = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        merge_lines(&mut base, vec!["c".to_string(), "b".to_string()]);
        assert_eq!(base, vec!["a", "b", "c"]);
    }
}
