//! Turn orchestration for tutorbot.
//!
//! This crate owns the full request/response cycle around one user turn:
//! sliding-window admission control, prompt assembly from per-user
//! conversational context, oversized-reply chunking, and the orchestrator
//! state machine that ties them to the backend and front end.

pub mod chunker;
pub mod limiter;
pub mod orchestrator;
pub mod prompt;

pub use chunker::{CONTINUATION_MARKER, split};
pub use limiter::RateLimiter;
pub use orchestrator::{TurnOrchestrator, TurnOutcome};
pub use prompt::PromptAssembler;
