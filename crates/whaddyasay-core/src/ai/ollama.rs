use super::{Backend, BackendDescriptor};
use crate::error::{Error, Result};
use crate::provider::Provider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

pub(crate) fn human_size(bytes: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.1}GB", bytes / GB)
    } else {
        format!("{:.0}MB", bytes / MB)
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn query(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: 0.7,
                top_p: 0.9,
                num_predict: 2000,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::backend_status("ollama", status, text));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }

    pub async fn list_models(&self) -> Result<Vec<(String, Option<u64>)>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::backend_status(
                "ollama",
                response.status().as_u16(),
                "failed to list models",
            ));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| (model.name, model.size))
            .collect())
    }
}

#[async_trait]
impl Backend for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn probe(&self) -> Result<Vec<BackendDescriptor>> {
        let models = self.list_models().await?;
        Ok(models
            .into_iter()
            .map(|(name, size)| {
                let descriptor = BackendDescriptor::new(Provider::Ollama, name);
                match size {
                    Some(bytes) => descriptor.with_size(human_size(bytes)),
                    None => descriptor,
                }
            })
            .collect())
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.query(model, prompt).await
    }
}
