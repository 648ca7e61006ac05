//! Model types
//!
//! Catalog and usage records returned to the UI layer.

use serde::{Deserialize, Serialize};

/// Who serves a catalog model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmProvider {
    pub id: String,
    pub provider_name: String,
    pub provider_type: String,
}

impl LlmProvider {
    pub fn huggingface() -> Self {
        Self {
            id: "huggingface".to_string(),
            provider_name: "huggingface".to_string(),
            provider_type: "huggingface".to_string(),
        }
    }
}

/// A model the UI can offer for selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmModel {
    pub name: String,
    pub available: bool,
    pub provider: LlmProvider,
}

/// Quota usage; local inference has none
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub used: u64,
    pub total: u64,
}
