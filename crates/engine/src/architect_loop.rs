//! Architect loop (C5, §4.5): produces and refines the SSAT.

use serde_json::Value;

use crate::diffing::diff_json;
use crate::extract::{extract_fenced_json, parse_scored_critique};
use crate::judge::JudgeVerdict;
use crate::llm::{LlmClient, TemplateId, TemplateVars};
use crate::memory::{StageMemory, Turn};
use crate::ssat::{self, Ssat};

pub const MAX_ARCH_ITER: u32 = 3;
pub const ARCH_SCORE_THRESHOLD: i64 = 8;
const MEMORY_TOP_K: usize = 2;

const CRITIQUE_FIELDS: &[(&str, &str)] = &[
    ("requirement_coverage", "Requirement Coverage"),
    (
        "consistency_with_provided_information",
        "Consistency With Provided Information",
    ),
    ("interface_consistency", "Interface Consistency"),
    ("dependency_relations", "Dependency Relations"),
];

/// The reference documents every architect prompt is grounded in.
pub struct ArchInputs<'a> {
    pub prd: &'a str,
    pub uml_class: &'a str,
    pub uml_sequence: &'a str,
    pub arch_design: &'a str,
}

/// Generate (or refine) the SSAT for one step. Writes a memory turn every
/// call. Returns an empty `Ssat` (no modules) when extraction fails —
/// callers treat this as `latest_arch` being cleared, per §4.5.
pub fn generate(
    llm: &dyn LlmClient,
    memory: &mut StageMemory,
    inputs: &ArchInputs,
    prior: &Ssat,
    feedback: &str,
    step: u32,
) -> Ssat {
    let mut vars = TemplateVars::new();
    vars.insert("prd".into(), inputs.prd.into());
    vars.insert("uml_class".into(), inputs.uml_class.into());
    vars.insert("uml_sequence".into(), inputs.uml_sequence.into());
    vars.insert("arch_design".into(), inputs.arch_design.into());
    vars.insert("step".into(), step.to_string());

    let content_for_memory;
    let raw = if step == 1 {
        llm.invoke(TemplateId::SsatInitial, &vars).unwrap_or_default()
    } else {
        let prior_json = serde_json::to_string(prior).unwrap_or_default();
        let history = memory.render(feedback, MEMORY_TOP_K);
        vars.insert("prior_arch".into(), prior_json);
        vars.insert("feedback".into(), feedback.into());
        vars.insert("history".into(), history);
        llm.invoke(TemplateId::SsatRefine, &vars).unwrap_or_default()
    };

    let extracted = extract_fenced_json(&raw);
    let mut new_ssat: Ssat = serde_json::from_value(extracted).unwrap_or_default();
    ssat::normalize(&mut new_ssat);

    let new_value = serde_json::to_value(&new_ssat).unwrap_or(Value::Array(vec![]));
    let mut outputs = serde_json::json!({ "result": new_value });
    if step > 1 {
        let prior_value = serde_json::to_value(prior).unwrap_or(Value::Array(vec![]));
        let diff = diff_json(&prior_value, &new_value);
        outputs["arch_diff"] = Value::String(diff.to_json_string());
        content_for_memory = format!(
            "Feedback of step {}: {}\nDiff vs previous: {}",
            step - 1,
            feedback,
            diff.to_json_string()
        );
    } else {
        content_for_memory = format!("Generated Architecture:\n{new_value}");
    }

    memory.save_context(
        Turn {
            inputs: Value::Object(
                vars.into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
            outputs,
        },
        content_for_memory,
        feedback.to_string(),
    );

    new_ssat
}

/// Judge the architect's latest SSAT, per §4.5.
pub fn judge(llm: &dyn LlmClient, inputs: &ArchInputs, ssat: &Ssat, step: u32) -> JudgeVerdict {
    if ssat.is_empty() {
        return JudgeVerdict::Reject("Architecture JSON parsing failed.".to_string());
    }
    if let Some(dup) = ssat::find_duplicate_path(ssat) {
        return JudgeVerdict::Reject(format!(
            "Duplicate file path in architecture: {dup}"
        ));
    }

    let mut vars = TemplateVars::new();
    vars.insert("prd".into(), inputs.prd.into());
    vars.insert(
        "arch".into(),
        serde_json::to_string(ssat).unwrap_or_default(),
    );
    vars.insert("step".into(), step.to_string());
    let raw = llm.invoke(TemplateId::ArchJudge, &vars).unwrap_or_default();
    let critique = parse_scored_critique(&raw, CRITIQUE_FIELDS);
    let feedback = format!(
        "Requirement Coverage: {}\nConsistency With Provided Information: {}\nInterface Consistency: {}\nDependency Relations: {}",
        critique.feedback.get("requirement_coverage").cloned().unwrap_or_default(),
        critique
            .feedback
            .get("consistency_with_provided_information")
            .cloned()
            .unwrap_or_default(),
        critique.feedback.get("interface_consistency").cloned().unwrap_or_default(),
        critique.feedback.get("dependency_relations").cloned().unwrap_or_default(),
    );

    if critique.final_score >= ARCH_SCORE_THRESHOLD {
        JudgeVerdict::Accept(feedback)
    } else if step >= MAX_ARCH_ITER {
        JudgeVerdict::ForceAccept(format!(
            "Maximum architecture iterations reached, forcing approval. {feedback}"
        ))
    } else {
        JudgeVerdict::Reject(feedback)
    }
}
