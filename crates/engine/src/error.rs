//! Error taxonomy for the orchestration engine.
//!
//! Every generate/judge failure the loops can hit — extraction failure,
//! persist failure, compile failure, a low judge score, failing tests — is
//! folded back into feedback text and retried by the enclosing loop rather
//! than raised as a `Result`; only the controller's total node-visit cap is
//! a hard abort, since no per-loop iteration cap failing to fire would
//! otherwise stop a run. `EngineError` models exactly that one case.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The controller's total node-visit cap (50) was exceeded.
    #[error("controller recursion limit exceeded after {visits} node visits")]
    RecursionLimitExceeded { visits: u32 },
}
