//! The advice engine as one explicit context object
//!
//! An `AdviceSession` owns the registered backends, the last discovery
//! result, storage, and the vault. Generation takes `&mut self`, so one
//! caller's requests are processed strictly one after another.

use crate::advice::{AdviceRequest, AdviceResult, PrivacyLevel, SituationType};
use crate::ai::{
    Backend, BackendDescriptor, ClaudeClient, GeminiClient, ModelRuntime, OllamaClient,
    OpenAIClient,
};
use crate::config::Config;
use crate::consent::{self, ConsentState};
use crate::context::{self, AdviceContext, UserProfile};
use crate::crypto::{Vault, VaultStatus};
use crate::discovery::{self, ModelAvailability};
use crate::error::Result;
use crate::heuristics;
use crate::patterns::{self, AdvicePattern, PatternReport};
use crate::pipeline;
use crate::provider::Provider;
use crate::selection::{self, Selection};
use crate::storage::{ConversationRecord, Database, MemorySearch, RecordStore, Settings};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const PROFILE_KEY: &str = "user_profile";

const CONTEXT_MEMORY_LIMIT: usize = 10;
const STRATEGY_SOURCE_LIMIT: usize = 50;
const REPORT_CONVERSATION_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub preferred_model: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(2000),
            request_timeout: Duration::from_millis(8000),
            preferred_model: None,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            request_timeout: config.request_timeout(),
            preferred_model: config.preferred_model.clone(),
        }
    }
}

/// Snapshot reported by `status()`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub consent: ConsentState,
    pub available: Vec<BackendDescriptor>,
    pub selected: Selection,
    pub model: String,
    pub privacy_level: PrivacyLevel,
    pub privacy_description: &'static str,
    pub vault_unlocked: bool,
}

/// Backends built from configuration, in discovery order
pub fn default_backends(config: &Config) -> Result<Vec<Arc<dyn Backend>>> {
    let mut backends: Vec<Arc<dyn Backend>> = vec![
        Arc::new(OllamaClient::new(&config.ollama_url)),
        Arc::new(OpenAIClient::local(&config.local_api_url)),
        Arc::new(ModelRuntime::new(
            &config.runtime_program,
            config.model_cache_dir()?,
        )),
    ];

    let only = config.cloud_provider();
    for provider in [Provider::OpenAI, Provider::Anthropic, Provider::Google] {
        if only.is_some_and(|p| p != provider) {
            continue;
        }
        let key = config.api_key(provider);
        let backend: Arc<dyn Backend> = match provider {
            Provider::OpenAI => Arc::new(OpenAIClient::new(key.as_deref())),
            Provider::Anthropic => Arc::new(ClaudeClient::new(key.as_deref())),
            _ => Arc::new(GeminiClient::new(key.as_deref())),
        };
        backends.push(backend);
    }
    Ok(backends)
}

pub struct AdviceSession {
    backends: Vec<Arc<dyn Backend>>,
    settings: Settings,
    records: RecordStore,
    vault: Vault,
    availability: ModelAvailability,
    options: SessionOptions,
    initialized: bool,
}

impl AdviceSession {
    pub fn new(db: Arc<Database>, backends: Vec<Arc<dyn Backend>>, options: SessionOptions) -> Self {
        let settings = Settings::new(db.clone());
        Self {
            backends,
            vault: Vault::new(settings.clone()),
            settings,
            records: RecordStore::new(db),
            availability: ModelAvailability::default(),
            options,
            initialized: false,
        }
    }

    /// Open the configured database and register the configured backends
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config.database_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Arc::new(Database::open(&path)?);
        Ok(Self::new(db, default_backends(config)?, SessionOptions::from(config)))
    }

    /// Use a different key-derivation cost; low values are for tests only
    pub fn with_vault_iterations(mut self, iterations: u32) -> Self {
        self.vault = Vault::with_iterations(self.settings.clone(), iterations);
        self.records.set_cipher(None);
        self
    }

    /// Discover backends. Never fails; unavailable backends are skipped.
    pub async fn initialize(&mut self) -> Result<()> {
        self.refresh().await;
        self.initialized = true;
        info!(
            "Advice engine ready: {} ({})",
            self.selection().identifier(),
            self.selection().privacy_level().as_str()
        );
        Ok(())
    }

    pub async fn refresh(&mut self) {
        let consent = self.consent();
        self.availability =
            discovery::discover(&self.backends, consent, self.options.probe_timeout).await;
    }

    /// Persist the opt-in, then rediscover so cloud backends appear or vanish
    pub async fn set_cloud_consent(&mut self, granted: bool) -> Result<()> {
        let mut state = self.consent();
        state.cloud_api = granted;
        consent::save_consent(&self.settings, &state)?;
        info!("Cloud consent {}", if granted { "granted" } else { "revoked" });
        self.refresh().await;
        Ok(())
    }

    /// Stored consent, read fresh. Storage trouble counts as no consent.
    pub fn consent(&self) -> ConsentState {
        consent::load_consent(&self.settings).unwrap_or_else(|e| {
            warn!("Could not read consent, assuming none: {}", e);
            ConsentState::default()
        })
    }

    pub fn availability(&self) -> &ModelAvailability {
        &self.availability
    }

    pub fn selection(&self) -> Selection {
        selection::select_backend(
            &self.availability,
            self.consent(),
            self.options.preferred_model.as_deref(),
        )
    }

    pub fn status(&self) -> EngineStatus {
        let selected = self.selection();
        let privacy_level = selected.privacy_level();
        EngineStatus {
            initialized: self.initialized,
            consent: self.consent(),
            available: self.availability.backends.clone(),
            model: selected.identifier(),
            selected,
            privacy_level,
            privacy_description: privacy_level.description(),
            vault_unlocked: self.vault.is_unlocked(),
        }
    }

    fn gather_context(&self, request: &AdviceRequest) -> AdviceContext {
        let memories = self
            .records
            .search_memories(&MemorySearch::new("").with_limit(CONTEXT_MEMORY_LIMIT))
            .unwrap_or_else(|e| {
                warn!("Memories unavailable for context: {}", e);
                Vec::new()
            });

        let profile = self
            .settings
            .get::<UserProfile>(PROFILE_KEY)
            .unwrap_or_else(|e| {
                warn!("Ignoring unreadable {}: {}", PROFILE_KEY, e);
                None
            });

        let situation_type = heuristics::classify_situation(&request.situation).situation_type;
        let past = self
            .records
            .conversations_by_type(situation_type, STRATEGY_SOURCE_LIMIT)
            .unwrap_or_default();

        AdviceContext {
            memories: context::relevant_memories(&request.situation, &memories),
            successful_strategies: context::successful_strategies(situation_type, &past),
            profile,
        }
    }

    /// Produce advice for a request. Always returns a valid result.
    pub async fn generate_advice(&mut self, request: &AdviceRequest) -> AdviceResult {
        let consent = self.consent();
        let chain = selection::eligible_chain(
            &self.availability,
            consent,
            self.options.preferred_model.as_deref(),
        );
        let context = self.gather_context(request);

        let result = pipeline::generate(
            &chain,
            &self.backends,
            request,
            &context,
            self.options.request_timeout,
        )
        .await;

        if let Err(e) = patterns::record_pattern(&self.settings, AdvicePattern::from_result(&result)) {
            warn!("Could not record advice pattern: {}", e);
        }
        result
    }

    /// Generate advice and keep it in the conversation history
    pub async fn coach(&mut self, request: &AdviceRequest) -> Result<(i64, AdviceResult)> {
        let result = self.generate_advice(request).await;
        let id = self
            .records
            .store_conversation(&ConversationRecord::new(&request.situation, result.clone()))?;
        Ok((id, result))
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.settings.set(PROFILE_KEY, profile)
    }

    pub fn pattern_report(&self, filter: Option<SituationType>) -> Result<PatternReport> {
        let history = patterns::load_patterns(&self.settings)?;
        let conversations = self.records.get_conversations(REPORT_CONVERSATION_LIMIT)?;
        Ok(patterns::analyze_patterns(&history, &conversations, filter))
    }

    /// Unlock (or first set up) the vault; new records are encrypted afterwards
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let cipher = self.vault.unlock(password)?;
        self.records.set_cipher(Some(cipher));
        Ok(())
    }

    pub fn lock(&mut self) {
        self.vault.lock();
        self.records.set_cipher(None);
    }

    pub fn rotate_key(&mut self, current: &str, new_password: Option<&str>) -> Result<()> {
        self.vault.rotate(current, new_password)?;
        self.records.set_cipher(self.vault.cipher().cloned());
        Ok(())
    }

    pub fn vault_status(&self) -> Result<VaultStatus> {
        self.vault.status()
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
