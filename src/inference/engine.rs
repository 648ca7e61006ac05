//! Inference engine boundary
//!
//! The session layer never runs a model itself. It talks to an engine through
//! two traits: [`InferenceEngine`] loads a model and hands back an
//! [`EngineHandle`], and the handle runs completions, reports its heartbeat
//! state and accepts interrupt requests.
//!
//! # Completion shapes
//!
//! A non-streaming completion resolves to a single [`ChatCompletion`]. A
//! streaming completion resolves to a [`DeltaStream`] of
//! [`ChatCompletionChunk`]s that can be consumed exactly once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::streaming::DeltaStream;
use crate::types::{CacheMode, GenerationConfig, Message, ModelConfig, Role};

/// Errors that can occur during engine operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("No model loaded")]
    NoModelLoaded,

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Delta stream closed by consumer")]
    StreamClosed,

    #[error("Worker error: {0}")]
    WorkerError(String),
}

/// One progress step reported while a model is fetched and warmed up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitProgressReport {
    /// Fraction complete, 0.0 to 1.0
    pub progress: f32,
    /// Seconds since the load started
    pub time_elapsed: f64,
    /// Human-readable stage description
    pub text: String,
}

pub type ProgressCallback = Arc<dyn Fn(&InitProgressReport) + Send + Sync>;

/// Everything an engine needs to bring a model up
#[derive(Clone)]
pub struct LoadOptions {
    pub generation: GenerationConfig,
    pub cache: CacheMode,
    pub progress: Option<ProgressCallback>,
}

impl LoadOptions {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            generation: config.generation(),
            cache: config.cache,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Forward a progress report to the registered callback, if any
    pub fn report(&self, report: &InitProgressReport) {
        if let Some(progress) = &self.progress {
            progress(report);
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("generation", &self.generation)
            .field("cache", &self.cache)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A chat completion call against a loaded handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub stream: bool,
    pub messages: Vec<Message>,
}

/// Assistant message inside a single-shot completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub role: Role,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ReplyMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Result of a non-streaming completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<Choice>,
}

impl ChatCompletion {
    pub fn from_reply(model: impl Into<String>, content: Option<String>) -> Self {
        Self {
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: ReplyMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }

    /// Content of the first choice
    pub fn reply(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

/// Incremental message fragment inside a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One item of a streaming completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    pub fn from_content(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: Some(content.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// Non-empty content of the first choice's delta
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()?
            .delta
            .content
            .as_deref()
            .filter(|content| !content.is_empty())
    }
}

/// What a completion call produced
#[derive(Debug)]
pub enum CompletionResponse {
    Single(ChatCompletion),
    Stream(DeltaStream),
}

/// Loads models. Implementations own whatever worker or device state that takes.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Load `model_id`, reporting progress through `options.progress`.
    ///
    /// Loading a model that is already loaded must succeed.
    async fn load(
        &self,
        model_id: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError>;
}

/// A loaded model instance
#[async_trait]
pub trait EngineHandle: Send + Sync {
    fn model_id(&self) -> &str;

    /// Consecutive heartbeats the engine worker has failed to emit
    fn missed_heartbeats(&self) -> u32;

    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, EngineError>;

    /// Best-effort request to stop the running generation
    async fn interrupt(&self);
}
