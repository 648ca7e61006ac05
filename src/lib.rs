//! LocaLM session library
//!
//! Session management between a chat UI and an in-process inference engine:
//! which model is loaded, how completions are dispatched and streamed back,
//! and how engine death is detected.

pub mod inference;
pub mod session;
pub mod storage;
pub mod types;

pub use session::{ChatError, ChatEvent, ChatListener, ChatRequest, LlmApi, LocalLlmApi};
