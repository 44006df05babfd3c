use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::providers::traits::{CompletionProvider, EmbeddingProvider};

/// Talks to a local Ollama server through its native HTTP API.
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: 0.2,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self.client
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Ollama request failed: Status {}, Body: {}", status, error_text));
        }

        let response_json: Value = response.json().await?;

        // Check for API-level errors
        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("Ollama returned error: {}", error));
        }

        Ok(response_json)
    }

    /// Ollama lists pulled models with a tag (`llama3.2:latest`); a bare
    /// name refers to `:latest`.
    fn is_same_model(listed: &str, wanted: &str) -> bool {
        listed == wanted || (!wanted.contains(':') && listed == format!("{}:latest", wanted))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let response_json = self.post("embeddings", json!({
            "model": self.model,
            "prompt": text,
        }))
        .await?;

        let embedding: Vec<f32> = response_json
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embedding response: missing 'embedding' array"))?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| anyhow!("Invalid embedding response: non-numeric value"))?;

        if embedding.is_empty() {
            return Err(anyhow!("Model {} returned an empty embedding", self.model));
        }

        Ok(embedding)
    }

    fn embedding_model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String> {
        let response_json = self.post("chat", json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": system_message
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "stream": false,
            "options": {
                "temperature": self.temperature
            }
        }))
        .await?;

        response_json
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                let debug_json = serde_json::to_string_pretty(&response_json).unwrap_or_default();
                anyhow!("Invalid response format. Response JSON: {}", debug_json)
            })
    }

    async fn get_model_info(&self) -> Result<String> {
        let response = self.client
            .get(self.endpoint("tags"))
            .send()
            .await?
            .error_for_status()?;
        let tags: Value = response.json().await?;

        let installed = tags
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models.iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                    .any(|name| Self::is_same_model(name, &self.model))
            })
            .unwrap_or(false);

        if installed {
            Ok(format!("{} (ollama)", self.model))
        } else {
            Err(anyhow!("model '{}' is not pulled; run `ollama pull {}`", self.model, self.model))
        }
    }

    fn chat_model(&self) -> &str {
        &self.model
    }
}
