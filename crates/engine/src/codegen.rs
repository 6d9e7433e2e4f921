//! Code record (§3) and the API-signature extractor (§6).
//!
//! `CodeRecord` mirrors `SkeletonRecord`'s `{path, code}` shape. The API
//! extractor is the "AST API extractor" external interface named in §1/§6:
//! given a file's Rust source, summarize every top-level function and
//! `impl` block's method signatures so the code generator can compress
//! cross-file context without losing interface information (§4.7).

use serde::{Deserialize, Serialize};
use syn::{FnArg, ImplItem, Item, Pat, ReturnType, Type};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeFile {
    pub path: String,
    pub code: String,
}

pub type CodeRecord = Vec<CodeFile>;

pub fn find_duplicate_path(record: &CodeRecord) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    for file in record {
        if !seen.insert(file.path.as_str()) {
            return Some(file.path.clone());
        }
    }
    None
}

/// Render a function's signature as `name(arg: Ty, ...) -> Ty`. Falls back
/// to `-> ()` when there's no return type, mirroring the original's
/// `infer_return_type` defaulting to `"None"` for unannotated functions.
fn render_signature(sig: &syn::Signature) -> String {
    let args: Vec<String> = sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Receiver(r) => Some(if r.reference.is_some() {
                "&self".to_string()
            } else {
                "self".to_string()
            }),
            FnArg::Typed(pat_type) => {
                let name = match pat_type.pat.as_ref() {
                    Pat::Ident(ident) => ident.ident.to_string(),
                    _ => "_".to_string(),
                };
                let ty = type_to_string(&pat_type.ty);
                Some(format!("{name}: {ty}"))
            }
        })
        .collect();

    let ret = match &sig.output {
        ReturnType::Default => "()".to_string(),
        ReturnType::Type(_, ty) => type_to_string(ty),
    };

    format!("{}({}) -> {}", sig.ident, args.join(", "), ret)
}

fn type_to_string(ty: &Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}

/// Given Rust source and its path, summarize top-level `fn` signatures and
/// `impl` blocks' method signatures. Returns an empty string on a syntax
/// error (the API extractor is a pure compression aid — it must never
/// panic the code generator; an unparsable file simply contributes no
/// signatures to the context).
pub fn extract_api(source: &str, path: &str) -> String {
    let file = match syn::parse_file(source) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path, error = %e, "extract_api: syntax error, returning empty summary");
            return String::new();
        }
    };

    let mut out = String::new();
    for item in &file.items {
        match item {
            Item::Fn(f) => {
                out.push_str(&format!("fn {}\n", render_signature(&f.sig)));
            }
            Item::Impl(imp) => {
                let ty = type_to_string(&imp.self_ty);
                out.push_str(&format!("impl {ty} {{\n"));
                for sub in &imp.items {
                    if let ImplItem::Fn(m) = sub {
                        out.push_str(&format!("    fn {}\n", render_signature(&m.sig)));
                    }
                }
                out.push_str("}\n");
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_top_level_function_signature() {
        let src = "pub fn add(a: i32, b: i32) -> i32 { a + b }";
        let api = extract_api(src, "add.rs");
        assert_eq!(api.trim(), "fn add(a: i32, b: i32) -> i32");
    }

    #[test]
    fn extracts_impl_block_methods() {
        let src = "struct Foo; impl Foo { pub fn bar(&self) -> bool { true } }";
        let api = extract_api(src, "foo.rs");
        assert!(api.contains("impl Foo {"));
        assert!(api.contains("fn bar(&self) -> bool"));
    }

    #[test]
    fn syntax_error_yields_empty_summary() {
        let api = extract_api("fn f(:", "bad.rs");
        assert_eq!(api, "");
    }

    #[test]
    fn duplicate_path_detected() {
        let record = vec![
            CodeFile {
                path: "a.rs".into(),
                code: "fn a() {}".into(),
            },
            CodeFile {
                path: "a.rs".into(),
                code: "fn a2() {}".into(),
            },
        ];
        assert_eq!(find_duplicate_path(&record), Some("a.rs".to_string()));
    }
}
