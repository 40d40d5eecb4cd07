use crate::ai::ollama::DEFAULT_OLLAMA_URL;
use crate::ai::openai::DEFAULT_LOCAL_API_URL;
use crate::ai::runtime::DEFAULT_RUNTIME_PROGRAM;
use crate::error::{Error, Result};
use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "whaddyasay";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub ollama_url: String,
    pub local_api_url: String,
    pub preferred_model: Option<String>,
    pub cloud_provider: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub runtime_program: String,
    pub model_cache_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub device_memory_gb: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            local_api_url: DEFAULT_LOCAL_API_URL.to_string(),
            preferred_model: None,
            cloud_provider: None,
            openai_api_key: None,
            anthropic_api_key: None,
            google_api_key: None,
            probe_timeout_ms: 2000,
            request_timeout_ms: 8000,
            runtime_program: DEFAULT_RUNTIME_PROGRAM.to_string(),
            model_cache_dir: None,
            data_dir: None,
            device_memory_gb: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR))
                .ok_or_else(|| Error::Config("Could not determine data directory".to_string())),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("whaddyasay.db"))
    }

    pub fn model_cache_dir(&self) -> Result<PathBuf> {
        match &self.model_cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|d| d.join(APP_DIR).join("models"))
                .ok_or_else(|| Error::Config("Could not determine cache directory".to_string())),
        }
    }

    /// Environment variables take precedence over stored keys
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let from_env = provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());

        from_env.or_else(|| {
            let stored = match provider {
                Provider::OpenAI => self.openai_api_key.as_ref(),
                Provider::Anthropic => self.anthropic_api_key.as_ref(),
                Provider::Google => self.google_api_key.as_ref(),
                _ => None,
            };
            stored.filter(|k| !k.trim().is_empty()).cloned()
        })
    }

    /// Restrict cloud discovery to one provider when configured
    pub fn cloud_provider(&self) -> Option<Provider> {
        self.cloud_provider
            .as_deref()
            .and_then(Provider::from_str)
            .filter(|p| p.kind() == crate::ai::BackendKind::Cloud)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Defaults to 4GB when unknown
    pub fn device_memory_gb(&self) -> f32 {
        self.device_memory_gb.unwrap_or(4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.probe_timeout(), Duration::from_millis(2000));
        assert_eq!(config.request_timeout(), Duration::from_millis(8000));
        assert_eq!(config.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"preferred_model": "ollama:llama3.2", "probe_timeout_ms": 500}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.preferred_model.as_deref(), Some("ollama:llama3.2"));
        assert_eq!(config.probe_timeout_ms, 500);
        assert_eq!(config.request_timeout_ms, 8000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.data_dir = Some(dir.path().to_path_buf());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.database_path().unwrap(), dir.path().join("whaddyasay.db"));
    }

    #[test]
    fn test_stored_key_used_for_provider_without_env() {
        let mut config = Config::new();
        config.google_api_key = Some("stored".to_string());
        // The runtime has no key concept
        assert_eq!(config.api_key(Provider::Runtime), None);
        if std::env::var("GOOGLE_API_KEY").is_err() {
            assert_eq!(config.api_key(Provider::Google).as_deref(), Some("stored"));
        }
    }

    #[test]
    fn test_cloud_provider_rejects_local_names() {
        let mut config = Config::new();
        config.cloud_provider = Some("ollama".to_string());
        assert_eq!(config.cloud_provider(), None);
        config.cloud_provider = Some("claude".to_string());
        assert_eq!(config.cloud_provider(), Some(Provider::Anthropic));
    }
}
