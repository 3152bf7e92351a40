use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ExtractionError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub model_name: String,
    pub endpoint: String,
    /// Models the backend reported as served.
    pub available: Vec<String>,
}

/// The vision-language model. Takes a still and a prompt, returns the
/// model's raw text answer.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn extract(&self, image_path: &Path, prompt: &str) -> Result<String, ExtractionError>;

    async fn health_check(&self) -> Result<ModelStatus, ExtractionError>;
}
