//! Skeleton loop (C6, §4.6): per-file stub generation gated by
//! persistability, syntactic validity, and judge score.

use serde_json::Value;

use crate::diffing::unified_diff;
use crate::extract::{extract_fenced_code, parse_scored_critique};
use crate::fsio::Workspace;
use crate::judge::JudgeVerdict;
use crate::llm::{LlmClient, TemplateId, TemplateVars};
use crate::memory::{StageMemory, Turn};
use crate::skeleton::{self, SkeletonFile, SkeletonRecord};
use crate::ssat::Ssat;

pub const MAX_SKELETON_ITER: u32 = 3;
pub const SKELETON_SCORE_THRESHOLD: i64 = 8;
const MEMORY_TOP_K: usize = 2;

const CRITIQUE_FIELDS: &[(&str, &str)] = &[
    ("directory_structure_matching", "Directory Structure Matching"),
    (
        "interface_and_call_relationship_matching",
        "Interface And Call Relationship Matching",
    ),
];

fn render_joined(record: &SkeletonRecord) -> String {
    record
        .iter()
        .map(|f| format!("// {}\n{}", f.path, f.skeleton))
        .collect::<Vec<_>>()
        .join("\n")
}

fn find_prior<'a>(prior: &'a SkeletonRecord, path: &str) -> Option<&'a SkeletonFile> {
    prior.iter().find(|f| f.path == path)
}

/// Generate (or refine) every skeleton file for one step.
pub fn generate(
    llm: &dyn LlmClient,
    memory: &mut StageMemory,
    ssat: &Ssat,
    prior: &SkeletonRecord,
    feedback: &str,
    step: u32,
) -> SkeletonRecord {
    let file_items = crate::ssat::flatten_file_items(ssat);
    let history = if step > 1 { memory.render(feedback, MEMORY_TOP_K) } else { String::new() };

    let mut record: SkeletonRecord = Vec::new();
    for item in &file_items {
        let mut vars = TemplateVars::new();
        vars.insert("step".into(), step.to_string());
        vars.insert("file_name".into(), item.file.name.clone());
        vars.insert("file_path".into(), item.file.path.clone());
        vars.insert("file_description".into(), item.file.description.clone());
        vars.insert("module_name".into(), item.module.name.clone());
        vars.insert("context".into(), render_joined(&record));

        let template = if step == 1 {
            TemplateId::SkeletonInitial
        } else {
            let previous = find_prior(prior, &item.file.path)
                .map(|f| f.skeleton.clone())
                .unwrap_or_default();
            vars.insert("previous_skeleton".into(), previous);
            vars.insert("feedback".into(), feedback.into());
            vars.insert("history".into(), history.clone());
            TemplateId::SkeletonRefine
        };

        let raw = llm.invoke(template, &vars).unwrap_or_default();
        let code = extract_fenced_code(&raw);
        record.push(SkeletonFile {
            path: item.file.path.clone(),
            skeleton: code,
        });
    }

    let joined_new = render_joined(&record);
    let content_for_memory = if step == 1 {
        format!("Generated Skeleton:\n{joined_new}")
    } else {
        let joined_prior = render_joined(prior);
        let diff = unified_diff(&joined_prior, &joined_new, "skeleton");
        format!(
            "The feedback of the STEP {} is:\n{feedback}\nGiven the feedback of STEP {}, the diff between the updated skeleton and the previous skeleton is:\n{diff}\n",
            step - 1,
            step - 1
        )
    };

    memory.save_context(
        Turn {
            inputs: Value::String(feedback.to_string()),
            outputs: serde_json::json!({ "result": record }),
        },
        content_for_memory,
        feedback.to_string(),
    );

    record
}

/// Judge the skeleton record through the three gates of §4.6.
pub fn judge(
    llm: &dyn LlmClient,
    workspace: &dyn Workspace,
    ssat: &Ssat,
    record: &SkeletonRecord,
    step: u32,
) -> JudgeVerdict {
    if record.is_empty() || skeleton::find_duplicate_path(record).is_some() {
        return JudgeVerdict::Reject("Skeleton JSON parsing failed.".to_string());
    }

    for file in record {
        if workspace.write(&file.path, &file.skeleton).is_err() {
            return JudgeVerdict::Reject("Skeleton JSON parsing failed.".to_string());
        }
    }

    let verdict = {
        let mut compile_errors = Vec::new();
        for file in record {
            if let Err(e) = syn::parse_file(&file.skeleton) {
                compile_errors.push(format!("{}: {}", file.path, e));
            }
        }

        if !compile_errors.is_empty() {
            JudgeVerdict::Reject(compile_errors.join("\n"))
        } else {
            let mut vars = TemplateVars::new();
            vars.insert("step".into(), step.to_string());
            vars.insert(
                "ssat".into(),
                serde_json::to_string(ssat).unwrap_or_default(),
            );
            vars.insert(
                "skeleton".into(),
                serde_json::to_string(record).unwrap_or_default(),
            );
            let raw = llm.invoke(TemplateId::SkeletonJudge, &vars).unwrap_or_default();
            let critique = parse_scored_critique(&raw, CRITIQUE_FIELDS);
            let feedback = format!(
                "Directory Structure Matching: {}\nInterface And Call Relationship Matching: {}",
                critique.feedback.get("directory_structure_matching").cloned().unwrap_or_default(),
                critique
                    .feedback
                    .get("interface_and_call_relationship_matching")
                    .cloned()
                    .unwrap_or_default(),
            );

            if critique.final_score >= SKELETON_SCORE_THRESHOLD {
                JudgeVerdict::Accept(feedback)
            } else if step >= MAX_SKELETON_ITER {
                JudgeVerdict::ForceAccept(format!(
                    "Maximum skeleton iterations reached, forcing approval. {feedback}"
                ))
            } else {
                JudgeVerdict::Reject(feedback)
            }
        }
    };

    for file in record {
        let _ = workspace.remove(&file.path);
    }

    verdict
}
