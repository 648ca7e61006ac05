//! Shared type definitions
//!
//! Value types passed between the session layer, the engine boundary and the UI.

pub mod config;
pub mod message;
pub mod model;

pub use config::{CacheMode, GenerationConfig, ModelConfig};
pub use message::{Message, Role};
pub use model::{LlmModel, LlmProvider, LlmUsage};
