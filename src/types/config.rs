//! Configuration types
//!
//! Per-request model configuration and the generation subset handed to the engine.

use serde::{Deserialize, Serialize};

/// Where the engine keeps fetched model weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Plain artifact cache
    #[default]
    Cache,
    /// Indexed database cache
    IndexDb,
}

impl CacheMode {
    pub fn uses_indexed_db(self) -> bool {
        matches!(self, CacheMode::IndexDb)
    }
}

/// Model selection plus generation parameters for one chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Identifier of the model to run
    pub model: String,
    /// Temperature for sampling
    pub temperature: f32,
    /// Top-p (nucleus) sampling parameter
    pub top_p: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    /// Stream deltas instead of waiting for the full reply
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub cache: CacheMode,
}

fn default_stream() -> bool {
    true
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Sampling parameters the engine is configured with at load time
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        }
    }

    /// Clamp parameters into the ranges the engine accepts
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);
        self.presence_penalty = self.presence_penalty.clamp(-2.0, 2.0);
        self.frequency_penalty = self.frequency_penalty.clamp(-2.0, 2.0);
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: crate::storage::models::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            top_p: 0.9,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stream: true,
            cache: CacheMode::Cache,
        }
    }
}

/// Generation parameters fixed when a model is loaded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}
