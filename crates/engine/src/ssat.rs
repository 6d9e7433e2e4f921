//! SSAT (Semantic Software Architecture Tree) data model (§3).
//!
//! An ordered sequence of modules, each containing ordered files, each
//! containing ordered classes and functions. Shape mirrors the JSON the
//! architect agent emits, so `serde_json::from_value` on the architect's
//! raw extraction round-trips directly into these types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Parameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Class {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub functions: Vec<Function>,
}

/// Pseudo-class UML emits for module-level functions. Never appears in the
/// final `File::classes` list — its functions are flattened into
/// `File::functions` by [`File::from_raw_module`].
const GLOBAL_FUNCTIONS_PSEUDO_CLASS: &str = "Global_functions";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct File {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub global_code: Vec<String>,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub functions: Vec<Function>,
}

impl File {
    /// Flatten any `Global_functions` pseudo-class that survived the
    /// architect's raw output into this file's function list, so the
    /// invariant "`Global_functions` never appears as a Class" holds for
    /// every SSAT the engine hands downstream.
    pub fn flatten_global_functions(&mut self) {
        let mut kept = Vec::with_capacity(self.classes.len());
        for class in std::mem::take(&mut self.classes) {
            if class.name == GLOBAL_FUNCTIONS_PSEUDO_CLASS {
                self.functions.extend(class.functions);
            } else {
                kept.push(class);
            }
        }
        self.classes = kept;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<File>,
}

/// The SSAT itself: an ordered sequence of modules.
pub type Ssat = Vec<Module>;

/// Flatten every `Global_functions` pseudo-class across the whole tree.
/// Call this once, right after parsing the architect's raw JSON.
pub fn normalize(ssat: &mut Ssat) {
    for module in ssat.iter_mut() {
        for file in module.files.iter_mut() {
            file.flatten_global_functions();
        }
    }
}

/// §3 invariant: every File's path is unique across the whole SSAT.
/// Returns the first duplicate path found, if any.
pub fn find_duplicate_path(ssat: &Ssat) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    for module in ssat {
        for file in &module.files {
            if !seen.insert(file.path.as_str()) {
                return Some(file.path.clone());
            }
        }
    }
    None
}

/// A flattened `(file, enclosing module)` pair, the shape the skeleton
/// generator iterates over (§4.6: "Flatten SSAT to an ordered list of
/// `file_item = {file, module}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
    pub file: File,
    pub module: ModuleRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ModuleRef {
    pub name: String,
    pub description: String,
}

pub fn flatten_file_items(ssat: &Ssat) -> Vec<FileItem> {
    let mut items = Vec::new();
    for module in ssat {
        let module_ref = ModuleRef {
            name: module.name.clone(),
            description: module.description.clone(),
        };
        for file in &module.files {
            items.push(FileItem {
                file: file.clone(),
                module: module_ref.clone(),
            });
        }
    }
    items
}
