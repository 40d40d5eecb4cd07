use crate::ai::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Ollama,
    LocalApi,
    Runtime,
    OpenAI,
    Anthropic,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::LocalApi => "local-api",
            Provider::Runtime => "runtime",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Provider::Ollama),
            "local-api" | "local_api" | "localapi" => Some(Provider::LocalApi),
            "runtime" | "webllm" => Some(Provider::Runtime),
            "openai" => Some(Provider::OpenAI),
            "anthropic" | "claude" => Some(Provider::Anthropic),
            "google" | "gemini" => Some(Provider::Google),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![
            Provider::Ollama,
            Provider::LocalApi,
            Provider::Runtime,
            Provider::OpenAI,
            Provider::Anthropic,
            Provider::Google,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama (Local)",
            Provider::LocalApi => "OpenAI-compatible server (Local)",
            Provider::Runtime => "Built-in runtime (On device)",
            Provider::OpenAI => "ChatGPT (OpenAI)",
            Provider::Anthropic => "Claude (Anthropic)",
            Provider::Google => "Gemini (Google)",
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Provider::Ollama | Provider::LocalApi => BackendKind::LocalServer,
            Provider::Runtime => BackendKind::InProcess,
            Provider::OpenAI | Provider::Anthropic | Provider::Google => BackendKind::Cloud,
        }
    }

    /// Environment variable that overrides a stored API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Google => Some("GOOGLE_API_KEY"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
