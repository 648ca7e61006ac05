//! Prebuilt model catalog
//!
//! Static list of models the engine knows how to fetch. The session layer only
//! passes it through to the UI.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::types::{LlmModel, LlmProvider};

/// Model used when settings do not name one
pub const DEFAULT_MODEL: &str = "Llama-3-8B-Instruct-q4f32_1-MLC";

/// One entry of the prebuilt catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    /// Where the weights are fetched from
    pub model_url: String,
    pub vram_required_mb: f32,
    pub low_resource_required: bool,
}

// (model_id, vram_required_mb, low_resource_required)
const PREBUILT: &[(&str, f32, bool)] = &[
    ("Llama-3-8B-Instruct-q4f32_1-MLC", 6101.01, false),
    ("Llama-3-8B-Instruct-q4f16_1-MLC", 5001.0, false),
    ("Phi-3-mini-4k-instruct-q4f16_1-MLC", 3672.07, false),
    ("Mistral-7B-Instruct-v0.3-q4f16_1-MLC", 4573.39, false),
    ("gemma-2b-it-q4f16_1-MLC", 1476.52, true),
    ("Qwen2-1.5B-Instruct-q4f16_1-MLC", 1629.75, true),
    ("TinyLlama-1.1B-Chat-v1.0-q4f16_1-MLC", 697.24, true),
];

static PREBUILT_MODELS: Lazy<Vec<ModelRecord>> = Lazy::new(|| {
    PREBUILT
        .iter()
        .map(|&(model_id, vram_required_mb, low_resource_required)| ModelRecord {
            model_id: model_id.to_string(),
            model_url: format!("https://huggingface.co/mlc-ai/{model_id}"),
            vram_required_mb,
            low_resource_required,
        })
        .collect()
});

pub fn prebuilt_models() -> &'static [ModelRecord] {
    &PREBUILT_MODELS
}

pub fn find_model(model_id: &str) -> Option<&'static ModelRecord> {
    prebuilt_models().iter().find(|m| m.model_id == model_id)
}

/// Catalog as the UI lists it
pub fn catalog_models() -> Vec<LlmModel> {
    prebuilt_models()
        .iter()
        .map(|record| LlmModel {
            name: record.model_id.clone(),
            available: true,
            provider: LlmProvider::huggingface(),
        })
        .collect()
}
