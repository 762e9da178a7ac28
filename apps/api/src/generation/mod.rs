// Generation service: the orchestrator that runs documents through
// fetch → merge → map → render, and the HTTP handlers in front of it.

pub mod handlers;
pub mod orchestrator;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
