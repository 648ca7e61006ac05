//! Inference engine boundary
//!
//! Traits and wire types the session layer uses to drive an in-process engine.

pub mod engine;
pub mod loopback;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use engine::{
    ChatCompletion, ChatCompletionChunk, CompletionRequest, CompletionResponse, EngineError,
    EngineHandle, InferenceEngine, InitProgressReport, LoadOptions, ProgressCallback,
};
pub use loopback::LoopbackEngine;
pub use streaming::{DeltaSender, DeltaStream, StreamToken};
