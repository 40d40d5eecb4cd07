use serde_json::json;
use std::sync::Arc;
use whaddyasay_core::advice::SituationType;
use whaddyasay_core::context::AdviceContext;
use whaddyasay_core::selection::{eligible_chain, select_backend};
use whaddyasay_core::templates;
use whaddyasay_core::{
    AdviceRequest, AdviceSession, AdviceSource, BackendDescriptor, BackendKind, Cipher,
    ConsentState, Database, MemoryRecord, MemorySearch, ModelAvailability, Provider, RecordStore,
    Selection, SessionOptions, Settings, Urgency, Vault,
};

const CANDIDATES: [(Provider, &str); 6] = [
    (Provider::Ollama, "llama3.2"),
    (Provider::LocalApi, "qwen2.5"),
    (Provider::Runtime, "phi-2"),
    (Provider::OpenAI, "default"),
    (Provider::Anthropic, "default"),
    (Provider::Google, "default"),
];

fn subset(mask: u32) -> ModelAvailability {
    ModelAvailability::new(
        CANDIDATES
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, (p, m))| BackendDescriptor::new(*p, *m))
            .collect(),
    )
}

#[test]
fn no_cloud_without_consent_for_any_availability() {
    let preferences = [None, Some("openai:default"), Some("default"), Some("phi-2")];
    let no_consent = [
        ConsentState::default(),
        ConsentState {
            cloud_api: false,
            data_sharing: true,
        },
    ];

    for mask in 0..(1u32 << CANDIDATES.len()) {
        let availability = subset(mask);
        for consent in no_consent {
            for preferred in preferences {
                let chain = eligible_chain(&availability, consent, preferred);
                assert!(
                    chain.iter().all(|d| d.kind != BackendKind::Cloud),
                    "cloud in chain for mask {:06b}",
                    mask
                );
                let selected = select_backend(&availability, consent, preferred);
                assert_ne!(selected.kind(), Some(BackendKind::Cloud));
            }
        }
    }
}

#[test]
fn precedence_holds_for_every_availability() {
    let consent = ConsentState {
        cloud_api: true,
        data_sharing: false,
    };
    for mask in 0..(1u32 << CANDIDATES.len()) {
        let availability = subset(mask);
        let selected = select_backend(&availability, consent, None);

        let best = [BackendKind::LocalServer, BackendKind::InProcess, BackendKind::Cloud]
            .into_iter()
            .find(|k| availability.has_kind(*k));
        assert_eq!(selected.kind(), best, "mask {:06b}", mask);
        if best.is_none() {
            assert_eq!(selected, Selection::Template);
        }

        // The chain never goes back up a tier
        let chain = eligible_chain(&availability, consent, None);
        assert!(chain.windows(2).all(|w| w[0].kind <= w[1].kind));
        assert_eq!(chain.len(), availability.len());
    }
}

fn store(db: &Arc<Database>, cipher: Option<Cipher>) -> RecordStore {
    let mut store = RecordStore::new(db.clone());
    store.set_cipher(cipher);
    store
}

#[test]
fn corrupted_record_is_isolated() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut vault = Vault::with_iterations(Settings::new(db.clone()), 10);
    let cipher = vault.unlock("hunter2 but longer").unwrap();
    let records = store(&db, Some(cipher));

    let first = records
        .store_memory(&MemoryRecord::new("Team retro", "Naming the problem early helped"))
        .unwrap();
    let broken = records
        .store_memory(&MemoryRecord::new("Landlord call", "Stay calm about the deposit"))
        .unwrap();
    let last = records
        .store_memory(&MemoryRecord::new("Dad's birthday", "Calm tone, early call"))
        .unwrap();

    records.overwrite_encrypted_memory(broken, "bm90IGEgcmVhbCBjaXBoZXJ0ZXh0").unwrap();

    let damaged = records.get_memory(broken).unwrap();
    assert!(damaged.decryption_error);
    assert!(damaged.title.is_empty());
    assert!(damaged.content.is_empty());

    assert!(records.get_memory(first).unwrap().is_readable());
    assert_eq!(records.get_memory(last).unwrap().title, "Dad's birthday");

    let found = records.search_memories(&MemorySearch::new("calm")).unwrap();
    let ids: Vec<i64> = found.iter().filter_map(|m| m.id).collect();
    assert_eq!(ids, vec![last]);

    let stats = records.stats().unwrap();
    assert_eq!(stats.memories, 3);
    assert_eq!(stats.unreadable, 1);
}

#[test]
fn encrypted_records_survive_reopen_and_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");

    let id = {
        let db = Arc::new(Database::open(&path).unwrap());
        let mut vault = Vault::with_iterations(Settings::new(db.clone()), 10);
        let cipher = vault.setup("first password").unwrap();
        let id = store(&db, Some(cipher))
            .store_memory(&MemoryRecord::new("Secret", "Only for me").with_tags(vec!["private".into()]))
            .unwrap();
        vault.rotate("first password", Some("second password")).unwrap();
        id
    };

    let db = Arc::new(Database::open(&path).unwrap());
    assert!(store(&db, None).get_memory(id).unwrap().locked);

    let mut vault = Vault::with_iterations(Settings::new(db.clone()), 10);
    assert!(vault.unlock("first password").is_err());
    let cipher = vault.unlock("second password").unwrap();
    let memory = store(&db, Some(cipher)).get_memory(id).unwrap();
    assert_eq!(memory.content, "Only for me");
    assert_eq!(memory.tags, vec!["private".to_string()]);
}

#[test]
fn cipher_round_trips_json_values() {
    let cipher = Cipher::generate();
    let values = [
        json!(null),
        json!(42),
        json!("naïve café ☕"),
        json!([1, "two", {"three": 3.0}]),
        json!({"nested": {"list": [true, false], "empty": {}}}),
    ];
    for value in values {
        let blob = cipher.encrypt(&value).unwrap();
        assert!(!blob.contains("nested"));
        let back: serde_json::Value = cipher.decrypt(&blob).unwrap();
        assert_eq!(back, value);
    }
}

#[test]
fn templates_are_total() {
    let long = "long ".repeat(2000);
    let situations = [
        "",
        "   ",
        "???",
        "My boss hasn't given me a raise in two years",
        "I need to break up with my boyfriend",
        "Mom keeps criticizing my cooking",
        "I forgot my best friend's birthday and want to apologize",
        "We argue about chores every week",
        "会議で上司に話したいことがある",
        "Мне нужно поговорить с соседом",
        "🙂🙃",
        long.as_str(),
    ];
    let relationships = ["", "manager", "partner", "mother", "stranger"];

    for situation in situations {
        for relationship in relationships {
            for urgency in [Urgency::Low, Urgency::Medium, Urgency::High] {
                let request = AdviceRequest::new(situation)
                    .with_relationship(relationship)
                    .with_urgency(urgency);
                let content = templates::generate(&request, &AdviceContext::default());
                assert!(content.is_valid(), "invalid template for {:?}", situation);
                assert!(content.follow_up_questions.len() <= 3);
                assert!(content.confidence_boosters.len() <= 3);
            }
        }
    }
}

#[tokio::test]
async fn raise_scenario_without_models() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut session = AdviceSession::new(db, Vec::new(), SessionOptions::default());
    session.initialize().await.unwrap();

    let result = session
        .generate_advice(
            &AdviceRequest::new("My boss hasn't given me a raise in two years")
                .with_relationship("manager"),
        )
        .await;

    assert_eq!(result.source, AdviceSource::Template);
    assert_eq!(result.analysis().situation_type, SituationType::Professional);
    let strategy = result.strategy().to_lowercase();
    assert!(strategy.contains("prepar") || strategy.contains("evidence"));
    assert!(result
        .helpful_phrases()
        .iter()
        .any(|p| p.starts_with("I ") || p.starts_with("I'")));
}
