//! Skeleton record (§3): ordered `{path, skeleton}` pairs.
//!
//! Invariant: each path appears at most once; concatenating the `skeleton`
//! fields in order must parse as syntactically valid Rust (checked by the
//! skeleton judge's syntax gate, see `crate::skeleton_loop`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkeletonFile {
    pub path: String,
    pub skeleton: String,
}

pub type SkeletonRecord = Vec<SkeletonFile>;

pub fn find_duplicate_path(record: &SkeletonRecord) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    for file in record {
        if !seen.insert(file.path.as_str()) {
            return Some(file.path.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_path_detected() {
        let record = vec![
            SkeletonFile {
                path: "src/a.rs".into(),
                skeleton: "fn a() {}".into(),
            },
            SkeletonFile {
                path: "src/a.rs".into(),
                skeleton: "fn a2() {}".into(),
            },
        ];
        assert_eq!(find_duplicate_path(&record), Some("src/a.rs".to_string()));
    }
}
