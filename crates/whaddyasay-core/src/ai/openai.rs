use super::{Backend, BackendDescriptor};
use crate::error::{Error, Result};
use crate::provider::Provider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const OPENAI_API_URL: &str = "https://api.openai.com";
pub const DEFAULT_LOCAL_API_URL: &str = "http://localhost:8080";
const DEFAULT_CLOUD_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

/// Chat completions client for api.openai.com and for local servers that
/// speak the same protocol (llama.cpp server, LM Studio, vLLM, ...)
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    provider: Provider,
}

impl OpenAIClient {
    /// Hosted OpenAI API
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: OPENAI_API_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(str::to_string),
            provider: Provider::OpenAI,
        }
    }

    /// OpenAI-compatible server on this machine
    pub fn local(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            provider: Provider::LocalApi,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn resolve_model<'a>(&self, model: &'a str) -> &'a str {
        if self.provider == Provider::OpenAI && (model.is_empty() || model == "default") {
            DEFAULT_CLOUD_MODEL
        } else {
            model
        }
    }

    pub async fn query(&self, model: &str, prompt: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: self.resolve_model(model).to_string(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.7,
            max_tokens: 2000,
        };

        let bearer = self.api_key.as_deref().unwrap_or("local");
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::backend_status(self.provider.as_str(), status, text));
        }

        let openai_response: OpenAIResponse = response.json().await?;
        Ok(openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::backend_status(
                self.provider.as_str(),
                response.status().as_u16(),
                "failed to list models",
            ));
        }

        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl Backend for OpenAIClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn probe(&self) -> Result<Vec<BackendDescriptor>> {
        match self.provider {
            // Hosted APIs are reported when a key is configured; no request is made
            Provider::OpenAI => Ok(if self.has_api_key() {
                vec![BackendDescriptor::new(Provider::OpenAI, "default")]
            } else {
                Vec::new()
            }),
            provider => Ok(self
                .list_models()
                .await?
                .into_iter()
                .map(|id| BackendDescriptor::new(provider, id))
                .collect()),
        }
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.query(model, prompt).await
    }
}
