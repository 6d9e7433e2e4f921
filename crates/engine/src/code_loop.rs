//! Code loop (C7, §4.7): per-file code generation over the scheduler's
//! order, with a sliding context window, a file-selector sub-call on
//! refinement steps, and a test-driven judge.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::codegen::{self, CodeFile, CodeRecord};
use crate::diffing::unified_diff;
use crate::extract::{extract_fenced_code, extract_fenced_json};
use crate::fsio::Workspace;
use crate::judge::JudgeVerdict;
use crate::llm::{LlmClient, TemplateId, TemplateVars};
use crate::memory::{StageMemory, Turn};
use crate::scheduler;
use crate::skeleton::SkeletonRecord;
use crate::testrunner::TestRunner;

pub const MAX_CODE_ITER: u32 = 10;
const CONTEXT_WINDOW: usize = 5;
const MEMORY_TOP_K: usize = 2;

fn render_joined(record: &CodeRecord) -> String {
    record
        .iter()
        .map(|f| format!("// {}\n{}", f.path, f.code))
        .collect::<Vec<_>>()
        .join("\n")
}

/// §4.7 step 1 context rule: once more than `CONTEXT_WINDOW` files have been
/// emitted this step, everything but the trailing window collapses to
/// API-only extracts.
fn windowed_context(full_code: &CodeRecord) -> String {
    let n = full_code.len();
    if n <= CONTEXT_WINDOW {
        return render_joined(full_code);
    }
    let split = n - CONTEXT_WINDOW;
    let mut parts = Vec::new();
    for f in &full_code[..split] {
        parts.push(format!(
            "// {} (API only)\n{}",
            f.path,
            codegen::extract_api(&f.code, &f.path)
        ));
    }
    for f in &full_code[split..] {
        parts.push(format!("// {}\n{}", f.path, f.code));
    }
    parts.join("\n")
}

fn parse_path_list(value: &Value) -> HashSet<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Step 1: generate every file in topological order over the skeleton.
pub fn generate_step1(
    llm: &dyn LlmClient,
    memory: &mut StageMemory,
    skeleton: &SkeletonRecord,
) -> CodeRecord {
    let ordered = scheduler::order(skeleton);
    let mut full_code: CodeRecord = Vec::new();

    for item in &ordered {
        let mut vars = TemplateVars::new();
        vars.insert("step".into(), "1".to_string());
        vars.insert("file_path".into(), item.path.clone());
        vars.insert("skeleton".into(), item.skeleton.clone());
        vars.insert("context".into(), windowed_context(&full_code));

        let raw = llm.invoke(TemplateId::CodeInitial, &vars).unwrap_or_default();
        let code = extract_fenced_code(&raw);
        full_code.push(CodeFile {
            path: item.path.clone(),
            code,
        });
    }

    let joined = render_joined(&full_code);
    memory.save_context(
        Turn {
            inputs: Value::String(String::new()),
            outputs: serde_json::json!({ "result": full_code }),
        },
        format!("Generated Code:\n{joined}"),
        String::new(),
    );

    full_code
}

/// Step N > 1: file selector, then per-file refinement of the selected set.
pub fn generate_step_n(
    llm: &dyn LlmClient,
    memory: &mut StageMemory,
    prior: &CodeRecord,
    feedback: &str,
    step: u32,
) -> CodeRecord {
    let mut selector_vars = TemplateVars::new();
    selector_vars.insert("step".into(), step.to_string());
    selector_vars.insert("feedback".into(), feedback.to_string());
    selector_vars.insert("code".into(), render_joined(prior));
    let selector_raw = llm
        .invoke(TemplateId::FilesToUpdate, &selector_vars)
        .unwrap_or_default();
    let selected = parse_path_list(&extract_fenced_json(&selector_raw));

    if selected.is_empty() {
        memory.save_context(
            Turn {
                inputs: Value::String(feedback.to_string()),
                outputs: serde_json::json!({ "result": prior, "diff_code": Value::Array(vec![]) }),
            },
            format!(
                "The feedback of STEP {} is:\n{feedback}\nNo files were selected for update.",
                step - 1
            ),
            feedback.to_string(),
        );
        return prior.clone();
    }

    let history = memory.render(feedback, MEMORY_TOP_K);
    let context = prior
        .iter()
        .filter(|f| !selected.contains(&f.path))
        .map(|f| format!("// {} (API only)\n{}", f.path, codegen::extract_api(&f.code, &f.path)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut full_code: CodeRecord = Vec::new();
    let mut diffs: Vec<(String, String)> = Vec::new();

    for prior_file in prior {
        if selected.contains(&prior_file.path) {
            let mut vars = TemplateVars::new();
            vars.insert("step".into(), step.to_string());
            vars.insert("file_path".into(), prior_file.path.clone());
            vars.insert("previous_code".into(), prior_file.code.clone());
            vars.insert("feedback".into(), feedback.to_string());
            vars.insert("context".into(), context.clone());
            vars.insert("history".into(), history.clone());

            let raw = llm.invoke(TemplateId::CodeRefine, &vars).unwrap_or_default();
            let extracted = extract_fenced_json(&raw);
            let new_code = extracted
                .as_array()
                .and_then(|a| a.first())
                .and_then(|v| v.get("code"))
                .and_then(|v| v.as_str())
                .unwrap_or(&prior_file.code)
                .to_string();

            let diff = unified_diff(&prior_file.code, &new_code, &prior_file.path);
            diffs.push((prior_file.path.clone(), diff));
            full_code.push(CodeFile {
                path: prior_file.path.clone(),
                code: new_code,
            });
        } else {
            full_code.push(prior_file.clone());
        }
    }

    let diff_code_value: Vec<Value> = diffs
        .iter()
        .map(|(path, diff)| serde_json::json!({ "path": path, "diff": diff }))
        .collect();
    let content = format!(
        "The feedback of STEP {} is:\n{feedback}\nDiff vs previous:\n{}",
        step - 1,
        diffs.iter().map(|(_, d)| d.clone()).collect::<Vec<_>>().join("\n")
    );

    memory.save_context(
        Turn {
            inputs: Value::String(feedback.to_string()),
            outputs: serde_json::json!({ "result": full_code, "diff_code": diff_code_value }),
        },
        content,
        feedback.to_string(),
    );

    full_code
}

fn render_fix_suggestions(value: &Value) -> String {
    let items = value.as_array().cloned().unwrap_or_default();
    items
        .iter()
        .map(|item| {
            let summary = item.get("summary").and_then(|v| v.as_str()).unwrap_or("");
            let likely_cause = item.get("likely_cause").and_then(|v| v.as_str()).unwrap_or("");
            let suggested_fix = item.get("suggested_fix").and_then(|v| v.as_str()).unwrap_or("");
            format!("Summary: {summary}\nLikely Cause: {likely_cause}\nSuggested Fix: {suggested_fix}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Judge the code record through write → run tests → score, per §4.7. Mutates
/// `test_status[step]` and, once both `step-1` and `step` are recorded,
/// retroactively appends the "Test pass status changed" line to the memory
/// message saved at `step-1` (§4.3 supplement).
#[allow(clippy::too_many_arguments)]
pub fn judge(
    llm: &dyn LlmClient,
    workspace: &dyn Workspace,
    test_runner: &dyn TestRunner,
    memory: &mut StageMemory,
    test_status: &mut BTreeMap<u32, String>,
    record: &CodeRecord,
    step: u32,
) -> JudgeVerdict {
    if record.is_empty() || codegen::find_duplicate_path(record).is_some() {
        return JudgeVerdict::Reject("Code JSON parsing failed.".to_string());
    }

    for file in record {
        if workspace.write(&file.path, &file.code).is_err() {
            return JudgeVerdict::Reject("Code JSON parsing failed.".to_string());
        }
    }

    let repo_dir = workspace.resolve("").to_string_lossy().into_owned();
    let result = test_runner.run(&repo_dir);
    test_status.insert(step, result.status_line());

    if step >= 2 {
        if let (Some(prev), Some(cur)) = (
            test_status.get(&(step - 1)).cloned(),
            test_status.get(&step).cloned(),
        ) {
            memory.append_to_message(
                step - 1,
                &format!("\nTest pass status changed from {prev} to {cur}."),
            );
        }
    }

    if result.all_passed() {
        return JudgeVerdict::Accept("All unit tests passed.".to_string());
    }

    if step >= MAX_CODE_ITER {
        return JudgeVerdict::ForceAccept(format!(
            "Maximum code iterations reached, forcing approval. {}",
            result.status_line()
        ));
    }

    let mut vars = TemplateVars::new();
    vars.insert("step".into(), step.to_string());
    vars.insert("test_output".into(), result.raw_text.clone());
    let raw = llm.invoke(TemplateId::CodeJudge, &vars).unwrap_or_default();
    let feedback = render_fix_suggestions(&extract_fenced_json(&raw));

    JudgeVerdict::Reject(feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsio::RealWorkspace;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::RetentionPolicy;
    use crate::skeleton::SkeletonFile;
    use crate::testrunner::{ScriptedTestRunner, TestRunResult};

    fn one_file_skeleton() -> SkeletonRecord {
        vec![SkeletonFile {
            path: "src/add.rs".into(),
            skeleton: "fn add(a: i32, b: i32) -> i32 { 0 }".into(),
        }]
    }

    #[test]
    fn s4_code_test_pass_accepts_on_step_1() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RealWorkspace::new(dir.path());
        let llm = ScriptedLlmClient::new(String::new());
        llm.script(
            TemplateId::CodeInitial,
            1,
            vec!["```rust\nfn add(a: i32, b: i32) -> i32 { a + b }\n```".to_string()],
        );
        let runner = ScriptedTestRunner::new(vec![TestRunResult {
            raw_text: "test result: ok. 1 passed; 0 failed".into(),
            passed: 1,
            total: 1,
        }]);

        let mut memory = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        let mut test_status = BTreeMap::new();
        let record = generate_step1(&llm, &mut memory, &one_file_skeleton());
        let verdict = judge(&llm, &workspace, &runner, &mut memory, &mut test_status, &record, 1);

        assert_eq!(verdict, JudgeVerdict::Accept("All unit tests passed.".to_string()));
        assert_eq!(test_status.get(&1), Some(&"passed 1 out of 1".to_string()));
    }

    #[test]
    fn s5_code_iterate_then_passes_and_appends_status_change() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RealWorkspace::new(dir.path());
        let llm = ScriptedLlmClient::new(String::new());
        llm.script(
            TemplateId::CodeInitial,
            1,
            vec!["```rust\nfn add(a: i32, b: i32) -> i32 { a - b }\n```".to_string()],
        );
        llm.script(TemplateId::CodeJudge, 1, vec!["```json\n[{\"summary\":\"wrong operator\",\"likely_cause\":\"subtraction instead of addition\",\"suggested_fix\":\"use +\"}]\n```".to_string()]);
        llm.script(
            TemplateId::FilesToUpdate,
            2,
            vec!["```json\n[\"src/add.rs\"]\n```".to_string()],
        );
        llm.script(
            TemplateId::CodeRefine,
            2,
            vec!["```json\n[{\"path\":\"src/add.rs\",\"code\":\"fn add(a: i32, b: i32) -> i32 { a + b }\"}]\n```".to_string()],
        );

        let runner = ScriptedTestRunner::new(vec![
            TestRunResult { raw_text: "test result: FAILED. 0 passed; 1 failed".into(), passed: 0, total: 1 },
            TestRunResult { raw_text: "test result: ok. 1 passed; 0 failed".into(), passed: 1, total: 1 },
        ]);

        let mut memory = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: true });
        let mut test_status = BTreeMap::new();

        let record1 = generate_step1(&llm, &mut memory, &one_file_skeleton());
        let verdict1 = judge(&llm, &workspace, &runner, &mut memory, &mut test_status, &record1, 1);
        assert!(matches!(verdict1, JudgeVerdict::Reject(_)));

        let record2 = generate_step_n(&llm, &mut memory, &record1, verdict1.feedback(), 2);
        let verdict2 = judge(&llm, &workspace, &runner, &mut memory, &mut test_status, &record2, 2);

        assert_eq!(verdict2, JudgeVerdict::Accept("All unit tests passed.".to_string()));
        assert_eq!(
            test_status,
            BTreeMap::from([
                (1, "passed 0 out of 1".to_string()),
                (2, "passed 1 out of 1".to_string()),
            ])
        );
        assert!(
            memory.messages()[0]
                .content
                .contains("Test pass status changed from passed 0 out of 1 to passed 1 out of 1."),
            "status-change line should be appended to step 1's message, got: {:?}",
            memory.messages()[0].content
        );
    }

    #[test]
    fn empty_selector_list_skips_regeneration_but_still_saves_a_turn() {
        let llm = ScriptedLlmClient::new(String::new());
        llm.script(TemplateId::FilesToUpdate, 2, vec!["```json\n[]\n```".to_string()]);
        let mut memory = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: true });
        let prior = vec![CodeFile {
            path: "src/add.rs".into(),
            code: "fn add(a: i32, b: i32) -> i32 { a + b }".into(),
        }];
        let record = generate_step_n(&llm, &mut memory, &prior, "looks fine actually", 2);
        assert_eq!(record, prior);
        assert_eq!(memory.messages().len(), 1);
    }

    #[test]
    fn cap_forces_acceptance_on_tenth_failing_step() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RealWorkspace::new(dir.path());
        let llm = ScriptedLlmClient::new(String::new());
        let runner = ScriptedTestRunner::new(vec![TestRunResult {
            raw_text: "still failing".into(),
            passed: 0,
            total: 1,
        }]);
        let mut memory = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        let mut test_status = BTreeMap::new();
        let record = vec![CodeFile {
            path: "src/add.rs".into(),
            code: "fn add(a: i32, b: i32) -> i32 { a - b }".into(),
        }];
        let verdict = judge(
            &llm,
            &workspace,
            &runner,
            &mut memory,
            &mut test_status,
            &record,
            MAX_CODE_ITER,
        );
        match verdict {
            JudgeVerdict::ForceAccept(text) => {
                assert!(text.starts_with("Maximum code iterations reached"))
            }
            other => panic!("expected ForceAccept, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_path_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RealWorkspace::new(dir.path());
        let llm = ScriptedLlmClient::new(String::new());
        let runner = ScriptedTestRunner::new(vec![TestRunResult {
            raw_text: String::new(),
            passed: 0,
            total: 0,
        }]);
        let mut memory = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        let mut test_status = BTreeMap::new();
        let record = vec![
            CodeFile { path: "src/a.rs".into(), code: "fn a() {}".into() },
            CodeFile { path: "src/a.rs".into(), code: "fn a2() {}".into() },
        ];
        let verdict = judge(&llm, &workspace, &runner, &mut memory, &mut test_status, &record, 1);
        assert_eq!(verdict, JudgeVerdict::Reject("Code JSON parsing failed.".to_string()));
    }
}
