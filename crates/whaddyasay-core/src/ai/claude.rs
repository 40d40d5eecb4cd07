use super::{Backend, BackendDescriptor};
use crate::error::{Error, Result};
use crate::provider::Provider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
}

impl ClaudeClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(str::to_string),
        }
    }

    pub async fn query(&self, model: &str, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("Anthropic API key not configured".to_string()))?;

        let model = if model.is_empty() || model == "default" {
            DEFAULT_MODEL
        } else {
            model
        };

        let request = ClaudeRequest {
            model: model.to_string(),
            max_tokens: 2000,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::backend_status("anthropic", status, text));
        }

        let claude_response: ClaudeResponse = response.json().await?;
        Ok(claude_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait]
impl Backend for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn probe(&self) -> Result<Vec<BackendDescriptor>> {
        Ok(match self.api_key {
            Some(_) => vec![BackendDescriptor::new(Provider::Anthropic, "default")],
            None => Vec::new(),
        })
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.query(model, prompt).await
    }
}
