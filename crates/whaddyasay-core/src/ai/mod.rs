pub mod claude;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod runtime;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
pub use runtime::{ModelRuntime, RuntimeModel};

use crate::advice::AdviceSource;
use crate::error::Result;
use crate::provider::Provider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where a backend runs, in selection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    LocalServer,
    InProcess,
    Cloud,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalServer => "local_server",
            BackendKind::InProcess => "in_process",
            BackendKind::Cloud => "cloud",
        }
    }

    pub fn all() -> Vec<BackendKind> {
        vec![BackendKind::LocalServer, BackendKind::InProcess, BackendKind::Cloud]
    }

    pub fn advice_source(&self) -> AdviceSource {
        match self {
            BackendKind::LocalServer => AdviceSource::ServerModel,
            BackendKind::InProcess => AdviceSource::LocalModel,
            BackendKind::Cloud => AdviceSource::CloudModel,
        }
    }
}

/// One discovered model on one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    #[serde(with = "provider_name")]
    pub provider: Provider,
    pub model: String,
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl BackendDescriptor {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        let kind = provider.kind();
        let capabilities = match kind {
            BackendKind::Cloud => vec!["conversation", "reasoning", "advanced_context"],
            _ => vec!["conversation", "reasoning"],
        };
        Self {
            kind,
            provider,
            model: model.into(),
            capabilities: capabilities.into_iter().map(String::from).collect(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    /// `provider:model`, e.g. `ollama:llama3.2`
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.model)
    }
}

mod provider_name {
    use crate::provider::Provider;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(provider: &Provider, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(provider.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Provider, D::Error> {
        let name = String::deserialize(deserializer)?;
        Provider::from_str(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown provider: {}", name)))
    }
}

/// A model backend the advice pipeline can probe and invoke
#[async_trait]
pub trait Backend: Send + Sync {
    fn provider(&self) -> Provider;

    fn kind(&self) -> BackendKind {
        self.provider().kind()
    }

    /// Models this backend can serve right now. Errors mean "unavailable".
    async fn probe(&self) -> Result<Vec<BackendDescriptor>>;

    /// Send one prompt and return the raw reply text
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}
