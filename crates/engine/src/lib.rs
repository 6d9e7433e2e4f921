//! Multi-agent code-generation orchestration engine.
//!
//! THE CORE covered by this crate: the state machine driving three
//! generate/critique refinement loops (architecture → skeleton → code), the
//! per-stage memory managers that select relevant historical context for
//! each retry via BM25 retrieval, the topological scheduler that orders
//! code-file generation from a dependency graph, and the validation gates
//! (JSON repair, compile check, test execution, score thresholds, iteration
//! caps) that decide whether to advance or retry.
//!
//! External collaborators (the LLM client, prompt templates, the AST
//! signature extractor, the test runner, file I/O, logging) live behind the
//! traits in [`llm`], [`fsio`], and [`testrunner`] — concrete
//! implementations are wired by the `pipeline` binary.

#![allow(clippy::uninlined_format_args)]

pub mod architect_loop;
pub mod code_loop;
pub mod codegen;
pub mod controller;
pub mod diffing;
pub mod error;
pub mod extract;
pub mod fsio;
pub mod judge;
pub mod llm;
pub mod memory;
pub mod scheduler;
pub mod skeleton;
pub mod skeleton_loop;
pub mod ssat;
pub mod testrunner;

pub use codegen::{CodeFile, CodeRecord};
pub use controller::{Controller, Node, PipelineState, TransitionRecord, MAX_TOTAL_VISITS};
pub use error::{EngineError, EngineResult};
pub use extract::{extract_fenced_code, extract_fenced_json, parse_scored_critique, ScoredCritique};
pub use fsio::{FsError, RealWorkspace, Workspace};
pub use judge::JudgeVerdict;
pub use llm::{LlmClient, LlmError, ScriptedLlmClient, TemplateId, TemplateVars};
pub use memory::{HistoryItem, RetentionPolicy, StageMemory, Turn};
pub use skeleton::{SkeletonFile, SkeletonRecord};
pub use ssat::{Class, File, Function, Module, Parameter, Ssat};
pub use testrunner::{ScriptedTestRunner, TestRunResult, TestRunner};
