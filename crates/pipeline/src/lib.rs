//! External collaborators for the orchestration engine.
//!
//! Everything here is named out of core scope by the engine (§1/§6): the
//! `rig-core`-backed LLM client, the prompt-template registry, the `cargo
//! test` runner, and per-repository dataset/config loading. The `engine`
//! crate stays pure; this crate supplies the concrete trait impls and the
//! binary that drives `engine::Controller` over a dataset.

pub mod config;
pub mod llm_client;
pub mod prompts;
pub mod test_runner;
