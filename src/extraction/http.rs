//! OpenAI-compatible chat-completions client for a locally served
//! vision-language model.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;

use super::backend::{InferenceBackend, ModelStatus};
use crate::error::ExtractionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TEMPERATURE: f32 = 0.1;

pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl HttpBackend {
    pub fn new(endpoint: &str, model: &str, max_tokens: u32) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
        })
    }

    async fn error_for_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ExtractionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ExtractionError::Backend {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    async fn extract(&self, image_path: &Path, prompt: &str) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|source| ExtractionError::Image {
                path: image_path.to_path_buf(),
                source,
            })?;
        let data_uri = format!("data:image/jpeg;base64,{}", STANDARD.encode(&bytes));

        let body = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_uri } },
                    { "type": "text", "text": prompt }
                ]
            }]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&body)
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;
        let parsed: ChatResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ExtractionError::EmptyResponse)
    }

    async fn health_check(&self) -> Result<ModelStatus, ExtractionError> {
        let response = self
            .client
            .get(format!("{}/models", self.endpoint))
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;
        let models: ModelList = response.json().await?;

        let available: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
        Ok(ModelStatus {
            model_loaded: available.iter().any(|id| id == &self.model),
            model_name: self.model.clone(),
            endpoint: self.endpoint.clone(),
            available,
        })
    }
}
