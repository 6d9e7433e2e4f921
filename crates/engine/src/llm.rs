//! LLM invocation wrapper (C1).
//!
//! The engine never talks to a model directly — prompt rendering and the
//! actual HTTP/SDK call are external collaborators injected by the caller
//! (the `pipeline` crate wires a real client). This module only fixes the
//! contract: render a named template with variables, return raw text,
//! surface upstream failures as `LlmError` so loops can treat them as a
//! retryable extraction failure.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Opaque template identifier. Prompt text itself lives outside the engine
/// (§6: "Prompt templates (opaque text assets, keyed by: ...)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateId {
    SsatInitial,
    SsatRefine,
    ArchJudge,
    SkeletonInitial,
    SkeletonRefine,
    SkeletonJudge,
    CodeInitial,
    CodeRefine,
    CodeJudge,
    FilesToUpdate,
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SsatInitial => "ssat_initial",
            Self::SsatRefine => "ssat_refine",
            Self::ArchJudge => "arch_judge",
            Self::SkeletonInitial => "skeleton_initial",
            Self::SkeletonRefine => "skeleton_refine",
            Self::SkeletonJudge => "skeleton_judge",
            Self::CodeInitial => "code_initial",
            Self::CodeRefine => "code_refine",
            Self::CodeJudge => "code_judge",
            Self::FilesToUpdate => "files_to_update",
        };
        f.write_str(s)
    }
}

/// Variables bound into a template before rendering. Kept as an ordered map
/// (not a `HashMap`) so rendered prompts are reproducible across runs.
pub type TemplateVars = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("upstream LLM call failed: {0}")]
    Upstream(String),
    #[error("LLM call timed out after {0}ms")]
    Timeout(u64),
}

/// Deterministic invocation: temperature 0, top-p 1, no internal retry.
/// Implementors own the model id and transport; the engine only needs
/// `invoke` to resolve.
pub trait LlmClient: Send + Sync {
    fn invoke(&self, template: TemplateId, vars: &TemplateVars) -> Result<String, LlmError>;
}

/// Deterministic scripted client for engine tests: returns a fixed reply
/// for each (template, step) pair, or a default reply otherwise. Lets the
/// core loops be exercised without a network-connected model, the way the
/// teacher's `MockSummarizer` stands in for a real summarization call.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    scripted: std::sync::Mutex<BTreeMap<(TemplateId, u32), Vec<String>>>,
    default_reply: String,
}

impl ScriptedLlmClient {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            scripted: std::sync::Mutex::new(BTreeMap::new()),
            default_reply: default_reply.into(),
        }
    }

    /// Queue replies returned in order for successive calls at `step`
    /// (steps are read from `vars["step"]`, defaulting to 0 when absent).
    pub fn script(&self, template: TemplateId, step: u32, replies: impl IntoIterator<Item = String>) {
        self.scripted
            .lock()
            .unwrap()
            .entry((template, step))
            .or_default()
            .extend(replies);
    }
}

impl LlmClient for ScriptedLlmClient {
    fn invoke(&self, template: TemplateId, vars: &TemplateVars) -> Result<String, LlmError> {
        let step: u32 = vars.get("step").and_then(|s| s.parse().ok()).unwrap_or(0);
        let mut scripted = self.scripted.lock().unwrap();
        if let Some(queue) = scripted.get_mut(&(template, step)) {
            if !queue.is_empty() {
                return Ok(queue.remove(0));
            }
        }
        Ok(self.default_reply.clone())
    }
}
