//! Pipeline controller (C8, §4.8): drives the architect, skeleton, and code
//! loops in order, threading one [`PipelineState`] through generate/judge
//! node pairs until the code loop accepts (or the recursion guard fires).

use std::collections::BTreeMap;
use std::fmt;

use crate::architect_loop::{self, ArchInputs};
use crate::codegen::CodeRecord;
use crate::error::{EngineError, EngineResult};
use crate::fsio::Workspace;
use crate::llm::LlmClient;
use crate::memory::{RetentionPolicy, StageMemory};
use crate::skeleton::SkeletonRecord;
use crate::skeleton_loop;
use crate::code_loop;
use crate::ssat::Ssat;
use crate::testrunner::TestRunner;

/// Total node visits across the whole run, not per-loop — the backstop for
/// a defect that would otherwise spin forever without any loop's own
/// iteration cap firing (§4.8, §5 "Partial failure policy").
pub const MAX_TOTAL_VISITS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Architect,
    ArchitectJudge,
    Skeleton,
    SkeletonJudge,
    Code,
    CodeJudge,
    Done,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Architect => "architect",
            Self::ArchitectJudge => "architect_judge",
            Self::Skeleton => "skeleton",
            Self::SkeletonJudge => "skeleton_judge",
            Self::Code => "code",
            Self::CodeJudge => "code_judge",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// One visited node, for replay/audit (§4.8 SUPPLEMENT, ported from the
/// teacher's `state_machine.rs` `TransitionRecord`).
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub from: Node,
    pub to: Node,
    pub visit: u32,
    pub reason: Option<String>,
}

/// Pipeline state (§3): the static repository/document inputs plus the
/// per-stage working fields. Once a loop's `*_decision` is true, the
/// controller never revisits that loop's node, so `latest_*` is immutable
/// for the remainder of the run by construction.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub repository_id: String,
    pub repository_output_dir: String,
    pub dataset_tag: String,
    pub prd: String,
    pub uml_class: String,
    pub uml_sequence: String,
    pub arch_design: String,

    pub latest_arch: Ssat,
    pub arch_steps: u32,
    pub arch_feedback: String,
    pub arch_decision: bool,

    pub latest_skeleton: SkeletonRecord,
    pub skeleton_steps: u32,
    pub skeleton_feedback: String,
    pub skeleton_decision: bool,

    pub latest_code: CodeRecord,
    pub code_steps: u32,
    pub code_feedback: String,
    pub code_decision: bool,
    pub test_status: BTreeMap<u32, String>,
}

impl PipelineState {
    pub fn new(
        repository_id: impl Into<String>,
        repository_output_dir: impl Into<String>,
        dataset_tag: impl Into<String>,
        prd: impl Into<String>,
        uml_class: impl Into<String>,
        uml_sequence: impl Into<String>,
        arch_design: impl Into<String>,
    ) -> Self {
        PipelineState {
            repository_id: repository_id.into(),
            repository_output_dir: repository_output_dir.into(),
            dataset_tag: dataset_tag.into(),
            prd: prd.into(),
            uml_class: uml_class.into(),
            uml_sequence: uml_sequence.into(),
            arch_design: arch_design.into(),
            latest_arch: Vec::new(),
            arch_steps: 0,
            arch_feedback: String::new(),
            arch_decision: false,
            latest_skeleton: Vec::new(),
            skeleton_steps: 0,
            skeleton_feedback: String::new(),
            skeleton_decision: false,
            latest_code: Vec::new(),
            code_steps: 0,
            code_feedback: String::new(),
            code_decision: false,
            test_status: BTreeMap::new(),
        }
    }
}

fn check_visit_cap(visits: u32) -> EngineResult<()> {
    if visits > MAX_TOTAL_VISITS {
        Err(EngineError::RecursionLimitExceeded { visits })
    } else {
        Ok(())
    }
}

/// Drives one repository's state through C5 → C6 → C7, per §4.8. Owns one
/// `StageMemory` per loop, since memory is scoped to a single repository run
/// (§5 "Shared resources").
pub struct Controller<'a> {
    llm: &'a dyn LlmClient,
    workspace: &'a dyn Workspace,
    test_runner: &'a dyn TestRunner,
    arch_memory: StageMemory,
    skeleton_memory: StageMemory,
    code_memory: StageMemory,
    transitions: Vec<TransitionRecord>,
    visits: u32,
}

impl<'a> Controller<'a> {
    pub fn new(llm: &'a dyn LlmClient, workspace: &'a dyn Workspace, test_runner: &'a dyn TestRunner) -> Self {
        Controller {
            llm,
            workspace,
            test_runner,
            arch_memory: StageMemory::new("ARCHSTEP", RetentionPolicy::AlwaysFull { keep_recent: false }),
            skeleton_memory: StageMemory::new("SKELETONSTEP", RetentionPolicy::AlwaysFull { keep_recent: true }),
            code_memory: StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: true }),
            transitions: Vec::new(),
            visits: 0,
        }
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Run the state machine to completion (code loop acceptance) or return
    /// `RecursionLimitExceeded` if the total visit cap is exceeded.
    pub fn run(&mut self, mut state: PipelineState) -> EngineResult<PipelineState> {
        let mut node = Node::Architect;
        loop {
            self.visits += 1;
            check_visit_cap(self.visits)?;

            let (next, reason) = self.step(node, &mut state);
            self.transitions.push(TransitionRecord {
                from: node,
                to: next,
                visit: self.visits,
                reason,
            });

            if next == Node::Done {
                return Ok(state);
            }
            node = next;
        }
    }

    fn step(&mut self, node: Node, state: &mut PipelineState) -> (Node, Option<String>) {
        match node {
            Node::Architect => {
                state.arch_steps += 1;
                let inputs = ArchInputs {
                    prd: &state.prd,
                    uml_class: &state.uml_class,
                    uml_sequence: &state.uml_sequence,
                    arch_design: &state.arch_design,
                };
                state.latest_arch = architect_loop::generate(
                    self.llm,
                    &mut self.arch_memory,
                    &inputs,
                    &state.latest_arch,
                    &state.arch_feedback,
                    state.arch_steps,
                );
                (Node::ArchitectJudge, None)
            }
            Node::ArchitectJudge => {
                let inputs = ArchInputs {
                    prd: &state.prd,
                    uml_class: &state.uml_class,
                    uml_sequence: &state.uml_sequence,
                    arch_design: &state.arch_design,
                };
                let verdict = architect_loop::judge(self.llm, &inputs, &state.latest_arch, state.arch_steps);
                state.arch_feedback = verdict.feedback().to_string();
                if verdict.is_final() {
                    state.arch_decision = true;
                    (Node::Skeleton, Some(state.arch_feedback.clone()))
                } else {
                    (Node::Architect, Some(state.arch_feedback.clone()))
                }
            }
            Node::Skeleton => {
                state.skeleton_steps += 1;
                state.latest_skeleton = skeleton_loop::generate(
                    self.llm,
                    &mut self.skeleton_memory,
                    &state.latest_arch,
                    &state.latest_skeleton,
                    &state.skeleton_feedback,
                    state.skeleton_steps,
                );
                (Node::SkeletonJudge, None)
            }
            Node::SkeletonJudge => {
                let verdict = skeleton_loop::judge(
                    self.llm,
                    self.workspace,
                    &state.latest_arch,
                    &state.latest_skeleton,
                    state.skeleton_steps,
                );
                state.skeleton_feedback = verdict.feedback().to_string();
                if verdict.is_final() {
                    state.skeleton_decision = true;
                    (Node::Code, Some(state.skeleton_feedback.clone()))
                } else {
                    (Node::Skeleton, Some(state.skeleton_feedback.clone()))
                }
            }
            Node::Code => {
                state.code_steps += 1;
                state.latest_code = if state.code_steps == 1 {
                    code_loop::generate_step1(self.llm, &mut self.code_memory, &state.latest_skeleton)
                } else {
                    code_loop::generate_step_n(
                        self.llm,
                        &mut self.code_memory,
                        &state.latest_code,
                        &state.code_feedback,
                        state.code_steps,
                    )
                };
                (Node::CodeJudge, None)
            }
            Node::CodeJudge => {
                let verdict = code_loop::judge(
                    self.llm,
                    self.workspace,
                    self.test_runner,
                    &mut self.code_memory,
                    &mut state.test_status,
                    &state.latest_code,
                    state.code_steps,
                );
                state.code_feedback = verdict.feedback().to_string();
                if verdict.is_final() {
                    state.code_decision = true;
                    (Node::Done, Some(state.code_feedback.clone()))
                } else {
                    (Node::Code, Some(state.code_feedback.clone()))
                }
            }
            Node::Done => (Node::Done, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsio::RealWorkspace;
    use crate::llm::{ScriptedLlmClient, TemplateId};
    use crate::testrunner::{ScriptedTestRunner, TestRunResult};

    fn one_module_ssat_reply() -> String {
        "```json\n[{\"name\":\"calc\",\"description\":\"\",\"files\":[{\"name\":\"add.rs\",\"path\":\"src/add.rs\",\"description\":\"\",\"global_code\":[],\"classes\":[],\"functions\":[]}]}]\n```".to_string()
    }

    #[test]
    fn happy_path_accepts_every_stage_on_first_try() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RealWorkspace::new(dir.path());
        let llm = ScriptedLlmClient::new(String::new());
        llm.script(TemplateId::SsatInitial, 1, vec![one_module_ssat_reply()]);
        llm.script(TemplateId::ArchJudge, 1, vec!["Final Score: 9".to_string()]);
        llm.script(
            TemplateId::SkeletonInitial,
            1,
            vec!["```rust\nfn add(a: i32, b: i32) -> i32 { 0 }\n```".to_string()],
        );
        llm.script(
            TemplateId::SkeletonJudge,
            1,
            vec!["Directory Structure Matching: good\nInterface And Call Relationship Matching: good\nFinal Score: 9".to_string()],
        );
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

        let mut controller = Controller::new(&llm, &workspace, &runner);
        let state = PipelineState::new("repo-1", dir.path().to_string_lossy(), "CodeProjectEval", "build a calculator", "class Calc", "seq", "design");
        let result = controller.run(state).unwrap();

        assert!(result.arch_decision);
        assert!(result.skeleton_decision);
        assert!(result.code_decision);
        assert_eq!(result.arch_steps, 1);
        assert_eq!(result.skeleton_steps, 1);
        assert_eq!(result.code_steps, 1);
        assert_eq!(result.code_feedback, "All unit tests passed.");
        assert_eq!(controller.transitions().last().unwrap().to, Node::Done);
    }

    #[test]
    fn architect_reject_then_accept_revisits_architect_node() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RealWorkspace::new(dir.path());
        let llm = ScriptedLlmClient::new(one_module_ssat_reply());
        llm.script(TemplateId::ArchJudge, 1, vec!["Final Score: 3".to_string()]);
        llm.script(TemplateId::ArchJudge, 2, vec!["Final Score: 9".to_string()]);
        llm.script(
            TemplateId::SkeletonInitial,
            1,
            vec!["```rust\nfn add(a: i32, b: i32) -> i32 { 0 }\n```".to_string()],
        );
        llm.script(
            TemplateId::SkeletonJudge,
            1,
            vec!["Directory Structure Matching: good\nInterface And Call Relationship Matching: good\nFinal Score: 9".to_string()],
        );
        llm.script(
            TemplateId::CodeInitial,
            1,
            vec!["```rust\nfn add(a: i32, b: i32) -> i32 { a + b }\n```".to_string()],
        );
        let runner = ScriptedTestRunner::new(vec![TestRunResult {
            raw_text: "ok".into(),
            passed: 1,
            total: 1,
        }]);

        let mut controller = Controller::new(&llm, &workspace, &runner);
        let state = PipelineState::new("repo-1", dir.path().to_string_lossy(), "CodeProjectEval", "prd", "class", "seq", "design");
        let result = controller.run(state).unwrap();

        assert_eq!(result.arch_steps, 2);
        assert!(result.arch_decision);
        assert!(result.code_decision);
    }

    #[test]
    fn visit_cap_guard_rejects_past_fifty_but_allows_exactly_fifty() {
        assert!(check_visit_cap(50).is_ok());
        match check_visit_cap(51) {
            Err(EngineError::RecursionLimitExceeded { visits }) => assert_eq!(visits, 51),
            other => panic!("expected RecursionLimitExceeded, got {other:?}"),
        }
    }
}
