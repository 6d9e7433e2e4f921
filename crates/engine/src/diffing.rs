//! Diff helpers used only to compress stage-memory summaries (§4.3, §9
//! Design Notes: "non-semantic" — any reasonable diff representation is
//! acceptable, these are never compared for equality by a judge).
//!
//! Two shapes: a structural JSON diff (the architect and skeleton loops'
//! analogue of `DeepDiff`, comparing SSAT/skeleton JSON between steps) and
//! a unified text diff over the `similar` crate (the code loop's analogue
//! of `difflib.unified_diff`, comparing a file's source between steps).

use std::collections::BTreeMap;

use serde_json::Value;
use similar::TextDiff;

/// A recursive structural diff between two JSON values: every leaf path
/// present in `new` but not `old` is `added`, every leaf path present in
/// `old` but not `new` is `removed`, and every leaf path present in both
/// with a different value is `changed`. Array elements are compared
/// positionally (no alignment/reordering heuristics — this is a
/// compression aid, not a semantic comparison).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDiff {
    pub added: BTreeMap<String, Value>,
    pub removed: BTreeMap<String, Value>,
    pub changed: BTreeMap<String, (Value, Value)>,
}

impl JsonDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Render as pretty JSON, mirroring `json.dumps(DeepDiff(...), indent=2)`.
    pub fn to_json_string(&self) -> String {
        let value = serde_json::json!({
            "dictionary_item_added": self.added,
            "dictionary_item_removed": self.removed,
            "values_changed": self.changed.iter().map(|(path, (old, new))| {
                (path.clone(), serde_json::json!({"old_value": old, "new_value": new}))
            }).collect::<BTreeMap<_, _>>(),
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

pub fn diff_json(old: &Value, new: &Value) -> JsonDiff {
    let mut diff = JsonDiff::default();
    walk("root", old, new, &mut diff);
    diff
}

fn walk(path: &str, old: &Value, new: &Value, diff: &mut JsonDiff) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, new_val) in new_map {
                let child_path = format!("{path}['{key}']");
                match old_map.get(key) {
                    None => {
                        diff.added.insert(child_path, new_val.clone());
                    }
                    Some(old_val) => walk(&child_path, old_val, new_val, diff),
                }
            }
            for (key, old_val) in old_map {
                if !new_map.contains_key(key) {
                    let child_path = format!("{path}['{key}']");
                    diff.removed.insert(child_path, old_val.clone());
                }
            }
        }
        (Value::Array(old_arr), Value::Array(new_arr)) => {
            for (i, new_val) in new_arr.iter().enumerate() {
                let child_path = format!("{path}[{i}]");
                match old_arr.get(i) {
                    None => {
                        diff.added.insert(child_path, new_val.clone());
                    }
                    Some(old_val) => walk(&child_path, old_val, new_val, diff),
                }
            }
            for (i, old_val) in old_arr.iter().enumerate() {
                if new_arr.get(i).is_none() {
                    let child_path = format!("{path}[{i}]");
                    diff.removed.insert(child_path, old_val.clone());
                }
            }
        }
        (a, b) if a == b => {}
        (a, b) => {
            diff.changed.insert(path.to_string(), (a.clone(), b.clone()));
        }
    }
}

/// A unified text diff between two file contents (the code loop's memory
/// compression, §4.7 point 3).
pub fn unified_diff(old: &str, new: &str, path: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_added_and_removed_keys() {
        let old = json!({"a": 1});
        let new = json!({"b": 2});
        let diff = diff_json(&old, &new);
        assert_eq!(diff.added["root['b']"], json!(2));
        assert_eq!(diff.removed["root['a']"], json!(1));
    }

    #[test]
    fn detects_changed_scalar_leaf() {
        let old = json!({"a": 1});
        let new = json!({"a": 2});
        let diff = diff_json(&old, &new);
        assert_eq!(diff.changed["root['a']"], (json!(1), json!(2)));
    }

    #[test]
    fn identical_values_produce_empty_diff() {
        let v = json!({"a": [1, 2, {"b": "x"}]});
        let diff = diff_json(&v, &v);
        assert!(diff.is_empty());
    }

    #[test]
    fn nested_array_element_change_is_detected() {
        let old = json!({"files": [{"name": "a.rs"}, {"name": "b.rs"}]});
        let new = json!({"files": [{"name": "a.rs"}, {"name": "c.rs"}]});
        let diff = diff_json(&old, &new);
        assert_eq!(
            diff.changed["root['files'][1]['name']"],
            (json!("b.rs"), json!("c.rs"))
        );
    }

    #[test]
    fn unified_diff_marks_added_and_removed_lines() {
        let old = "fn a() {}\n";
        let new = "fn a() {}\nfn b() {}\n";
        let out = unified_diff(old, new, "src/lib.rs");
        assert!(out.contains("+fn b() {}"));
        assert!(out.contains("a/src/lib.rs"));
    }
}
