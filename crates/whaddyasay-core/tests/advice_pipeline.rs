use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use whaddyasay_core::consent::{save_consent, ConsentState};
use whaddyasay_core::{
    AdviceRequest, AdviceSession, AdviceSource, Backend, BackendDescriptor, Database, Error,
    PrivacyLevel, Provider, Result, SessionOptions,
};

const REPLY: &str = r#"Sure! {"strategy": "Open with what you want.", "keyPoints": ["Be concrete"], "helpfulPhrases": ["I'd like to discuss"]}"#;

#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    Fail,
    Hang,
}

/// Scripted backend that counts how often it is asked for advice
struct Fake {
    provider: Provider,
    models: Vec<&'static str>,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl Fake {
    fn new(provider: Provider, behavior: Behavior) -> Arc<Self> {
        Self::serving(provider, &["test-model"], behavior)
    }

    fn serving(provider: Provider, models: &[&'static str], behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            provider,
            models: models.to_vec(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for Fake {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn probe(&self) -> Result<Vec<BackendDescriptor>> {
        Ok(self
            .models
            .iter()
            .map(|m| BackendDescriptor::new(self.provider, *m))
            .collect())
    }

    async fn complete(&self, _model: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Answer => Ok(REPLY.to_string()),
            Behavior::Fail => Err(Error::backend_status(self.provider.as_str(), 500, "oops")),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(REPLY.to_string())
            }
        }
    }
}

fn registered(fake: &Arc<Fake>) -> Arc<dyn Backend> {
    fake.clone()
}

fn session(backends: Vec<Arc<dyn Backend>>) -> AdviceSession {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let options = SessionOptions {
        probe_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(100),
        preferred_model: None,
    };
    AdviceSession::new(db, backends, options)
}

#[tokio::test]
async fn slow_backend_counts_as_unavailable() {
    let slow = Fake::new(Provider::Ollama, Behavior::Hang);
    let runtime = Fake::new(Provider::Runtime, Behavior::Answer);
    let mut s = session(vec![registered(&slow), registered(&runtime)]);
    s.initialize().await.unwrap();

    let started = Instant::now();
    let result = s.generate_advice(&AdviceRequest::new("Tell my roommate about rent")).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(slow.calls(), 1);
    assert_eq!(runtime.calls(), 1);
    assert_eq!(result.source, AdviceSource::LocalModel);
    assert_eq!(result.model, "runtime:test-model");
    assert_eq!(result.key_points(), ["Be concrete"]);
}

#[tokio::test]
async fn failing_backends_fall_back_to_templates() {
    let server = Fake::new(Provider::Ollama, Behavior::Fail);
    let local_api = Fake::new(Provider::LocalApi, Behavior::Fail);
    let runtime = Fake::new(Provider::Runtime, Behavior::Answer);
    let mut s = session(vec![registered(&server), registered(&local_api), registered(&runtime)]);
    s.initialize().await.unwrap();

    let result = s.generate_advice(&AdviceRequest::new("I owe my friend an apology")).await;

    // One retry only: the third backend is never reached
    assert_eq!(server.calls() + local_api.calls(), 2);
    assert_eq!(runtime.calls(), 0);
    assert_eq!(result.source, AdviceSource::Template);
    assert_eq!(result.privacy_level, PrivacyLevel::TemplateBased);
    assert!(result.content.is_valid());
    assert!(!result.emergency);
}

#[tokio::test]
async fn dead_server_with_many_models_falls_through_to_runtime() {
    let server = Fake::serving(Provider::Ollama, &["llama3.2", "qwen"], Behavior::Fail);
    let runtime = Fake::serving(Provider::Runtime, &["phi-2"], Behavior::Answer);
    let mut s = session(vec![registered(&server), registered(&runtime)]);
    s.initialize().await.unwrap();

    let result = s.generate_advice(&AdviceRequest::new("Ask my landlord about repairs")).await;

    assert_eq!(server.calls(), 1);
    assert_eq!(runtime.calls(), 1);
    assert_eq!(result.source, AdviceSource::LocalModel);
    assert_eq!(result.model, "runtime:phi-2");
}

#[tokio::test]
async fn revoked_consent_never_reaches_cloud() {
    let cloud = Fake::new(Provider::Anthropic, Behavior::Answer);
    let mut s = session(vec![registered(&cloud)]);
    s.initialize().await.unwrap();
    assert!(s.availability().is_empty());

    s.set_cloud_consent(true).await.unwrap();
    let first = s.generate_advice(&AdviceRequest::new("Ask for a deadline extension")).await;
    assert_eq!(first.source, AdviceSource::CloudModel);
    assert_eq!(first.privacy_level, PrivacyLevel::CloudProcessed);
    assert_eq!(cloud.calls(), 1);

    // Revoked behind the session's back: availability still lists the
    // cloud backend, selection must not
    save_consent(s.settings(), &ConsentState::default()).unwrap();
    assert!(!s.availability().is_empty());
    let second = s.generate_advice(&AdviceRequest::new("Ask for a deadline extension")).await;
    assert_eq!(second.source, AdviceSource::Template);
    assert_eq!(cloud.calls(), 1);

    s.set_cloud_consent(false).await.unwrap();
    assert!(s.availability().is_empty());
    s.generate_advice(&AdviceRequest::new("One more")).await;
    assert_eq!(cloud.calls(), 1);
}

#[tokio::test]
async fn local_server_preferred_over_consented_cloud() {
    let cloud = Fake::new(Provider::OpenAI, Behavior::Answer);
    let server = Fake::new(Provider::Ollama, Behavior::Answer);
    let mut s = session(vec![registered(&cloud), registered(&server)]);
    s.set_cloud_consent(true).await.unwrap();

    let status = s.status();
    assert_eq!(status.model, "ollama:test-model");
    assert_eq!(status.privacy_level, PrivacyLevel::Complete);

    let result = s.generate_advice(&AdviceRequest::new("Plan a family dinner talk")).await;
    assert_eq!(result.source, AdviceSource::ServerModel);
    assert_eq!(cloud.calls(), 0);
}

#[tokio::test]
async fn history_is_stored_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whaddyasay.db");

    let id = {
        let db = Arc::new(Database::open(&path).unwrap());
        let mut s = AdviceSession::new(db, Vec::new(), SessionOptions::default());
        let (id, _) = s
            .coach(&AdviceRequest::new("My boss hasn't given me a raise in two years"))
            .await
            .unwrap();
        s.records().record_outcome(id, "Got a review date", 4, None).unwrap();
        id
    };

    let db = Arc::new(Database::open(&path).unwrap());
    let s = AdviceSession::new(db, Vec::new(), SessionOptions::default());
    let stored = s.records().get_conversation(id).unwrap();
    assert_eq!(stored.success_rating, Some(4));
    assert_eq!(stored.outcome.as_deref(), Some("Got a review date"));

    let report = s.pattern_report(None).unwrap();
    assert_eq!(report.total_advice, 1);
    assert_eq!(report.template_generated, 1);
}
