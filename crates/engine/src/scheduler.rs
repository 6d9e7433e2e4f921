//! Topological file scheduler (C4, §4.4).
//!
//! Builds an intra-project import graph from skeleton stubs (via `use`
//! items parsed with `syn`) and produces a generation order with Kahn's
//! algorithm: files with no remaining intra-project dependencies are
//! emitted first, so a file is always scheduled after everything it
//! imports. Files that fail to parse are excluded from the graph and
//! appended at the end in input order; cycles are broken the same way:
//! remaining nodes are appended in input order rather than erroring.

use std::collections::{HashMap, HashSet, VecDeque};

use syn::{Item, UseTree};

use crate::skeleton::{SkeletonFile, SkeletonRecord};

const SOURCE_EXTENSION: &str = ".rs";

/// Map a project-relative path to its logical module path: strip the
/// extension, replace path separators with `::` (the Rust analogue of the
/// original's `.`-joined Python module names).
fn path_to_module(path: &str) -> String {
    let stripped = path.strip_suffix(SOURCE_EXTENSION).unwrap_or(path);
    stripped.replace(['/', '\\'], "::")
}

/// Collect every module path named in this file's `use` statements, e.g.
/// `use a::b::c;` contributes `"a::b::c"` (and, for grouped/glob imports,
/// one entry per leaf).
fn extract_use_modules(source: &str) -> Option<HashSet<String>> {
    let file = syn::parse_file(source).ok()?;
    let mut modules = HashSet::new();
    for item in &file.items {
        if let Item::Use(use_item) = item {
            collect_use_tree(&use_item.tree, String::new(), &mut modules);
        }
    }
    Some(modules)
}

fn collect_use_tree(tree: &UseTree, prefix: String, out: &mut HashSet<String>) {
    match tree {
        UseTree::Path(p) => {
            let next = if prefix.is_empty() {
                p.ident.to_string()
            } else {
                format!("{prefix}::{}", p.ident)
            };
            collect_use_tree(&p.tree, next, out);
        }
        UseTree::Name(n) => {
            let full = if prefix.is_empty() {
                n.ident.to_string()
            } else {
                format!("{prefix}::{}", n.ident)
            };
            out.insert(full);
        }
        UseTree::Rename(r) => {
            let full = if prefix.is_empty() {
                r.ident.to_string()
            } else {
                format!("{prefix}::{}", r.ident)
            };
            out.insert(full);
        }
        UseTree::Glob(_) => {
            if !prefix.is_empty() {
                out.insert(prefix);
            }
        }
        UseTree::Group(g) => {
            for t in &g.items {
                collect_use_tree(t, prefix.clone(), out);
            }
        }
    }
}

/// Order the skeleton record so that files with no intra-project
/// dependencies on other source files precede files that depend on them,
/// when the import graph is acyclic. Files outside the configured source
/// extension, unparsable files, and any remaining cycle members are all
/// appended in their original relative order. Every input file appears
/// exactly once in the output (§8 property 3).
pub fn order(record: &SkeletonRecord) -> SkeletonRecord {
    let module_of: HashMap<&str, String> = record
        .iter()
        .filter(|f| f.path.ends_with(SOURCE_EXTENSION))
        .map(|f| (f.path.as_str(), path_to_module(&f.path)))
        .collect();

    // graph[a] = set of paths that `a` imports (a depends on them).
    let mut graph: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut unparsable: Vec<&str> = Vec::new();
    let mut in_graph: HashSet<&str> = HashSet::new();

    for file in record {
        if !file.path.ends_with(SOURCE_EXTENSION) {
            continue;
        }
        let Some(imports) = extract_use_modules(&file.skeleton) else {
            unparsable.push(file.path.as_str());
            continue;
        };
        in_graph.insert(file.path.as_str());
        let mut deps = HashSet::new();
        for imported in &imports {
            for (other_path, other_module) in &module_of {
                if *other_path == file.path.as_str() {
                    continue;
                }
                if imported == other_module || imported.starts_with(&format!("{other_module}::")) {
                    deps.insert(*other_path);
                }
            }
        }
        graph.insert(file.path.as_str(), deps);
    }

    // Kahn's algorithm, leaves first: in_degree[node] counts node's own
    // unresolved dependencies (len(graph[node])), so a file with no
    // intra-project imports starts at 0 and is emitted before anything
    // that depends on it. `reverse[dep]` holds the files that import
    // `dep`, so emitting `dep` frees up its dependents' in-degree.
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &in_graph {
        indegree.insert(node, graph.get(node).map_or(0, |d| d.len()));
    }
    for (node, deps) in &graph {
        for dep in deps {
            reverse.entry(*dep).or_default().push(*node);
        }
    }

    let mut queue: VecDeque<&str> = record
        .iter()
        .map(|f| f.path.as_str())
        .filter(|p| in_graph.contains(p) && indegree.get(p).copied().unwrap_or(0) == 0)
        .collect();

    let mut topo_order: Vec<&str> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        topo_order.push(node);
        if let Some(dependents) = reverse.get(node) {
            for dependent in dependents {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    let mut used: HashSet<&str> = topo_order.iter().copied().collect();

    // Cycle remainder: anything still in the graph but not emitted, in
    // original input order.
    for file in record {
        let p = file.path.as_str();
        if in_graph.contains(p) && !used.contains(p) {
            topo_order.push(p);
            used.insert(p);
        }
    }

    // Non-source and unparsable files, appended last in input order.
    for file in record {
        let p = file.path.as_str();
        if !used.contains(p) {
            topo_order.push(p);
            used.insert(p);
        }
    }

    let by_path: HashMap<&str, &SkeletonFile> = record.iter().map(|f| (f.path.as_str(), f)).collect();
    topo_order
        .into_iter()
        .filter_map(|p| by_path.get(p).map(|f| (*f).clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sk(path: &str, skeleton: &str) -> SkeletonFile {
        SkeletonFile {
            path: path.to_string(),
            skeleton: skeleton.to_string(),
        }
    }

    /// §8 S6: a -> b -> c (c has no imports) orders c, b, a.
    #[test]
    fn linear_chain_orders_leaves_first() {
        let record = vec![
            sk("a.rs", "use crate::b;\nfn a() {}"),
            sk("b.rs", "use crate::c;\nfn b() {}"),
            sk("c.rs", "fn c() {}"),
        ];
        let ordered = order(&record);
        let paths: Vec<&str> = ordered.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["c.rs", "b.rs", "a.rs"]);
    }

    /// §8 S6: cycle x -> y -> x still yields every input exactly once.
    #[test]
    fn cycle_preserves_every_file_exactly_once() {
        let record = vec![
            sk("x.rs", "use crate::y;\nfn x() {}"),
            sk("y.rs", "use crate::x;\nfn y() {}"),
        ];
        let ordered = order(&record);
        let mut paths: Vec<&str> = ordered.iter().map(|f| f.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["x.rs", "y.rs"]);
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn unparsable_file_appended_at_end_in_input_order() {
        let record = vec![
            sk("bad.rs", "fn f(:"),
            sk("a.rs", "fn a() {}"),
            sk("b.rs", "fn b() {}"),
        ];
        let ordered = order(&record);
        let paths: Vec<&str> = ordered.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths.last(), Some(&"bad.rs"));
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn non_source_files_pass_through_untouched() {
        let record = vec![sk("README.md", "# hi"), sk("a.rs", "fn a() {}")];
        let ordered = order(&record);
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn every_input_file_appears_exactly_once() {
        let record = vec![
            sk("a.rs", "use crate::b; use crate::c;\nfn a() {}"),
            sk("b.rs", "fn b() {}"),
            sk("c.rs", "use crate::b;\nfn c() {}"),
            sk("d.rs", "fn d() {}"),
        ];
        let ordered = order(&record);
        assert_eq!(ordered.len(), record.len());
        let mut ordered_paths: Vec<&str> = ordered.iter().map(|f| f.path.as_str()).collect();
        let mut input_paths: Vec<&str> = record.iter().map(|f| f.path.as_str()).collect();
        ordered_paths.sort();
        input_paths.sort();
        assert_eq!(ordered_paths, input_paths);
    }
}
