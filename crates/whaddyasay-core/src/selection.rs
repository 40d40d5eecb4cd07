//! Backend selection
//!
//! Pure functions of availability, consent, and the preferred model. They
//! are re-run for every request so a consent change applies immediately.

use crate::advice::{AdviceSource, PrivacyLevel};
use crate::ai::{BackendDescriptor, BackendKind};
use crate::consent::ConsentState;
use crate::discovery::ModelAvailability;
use crate::templates::TEMPLATE_MODEL;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selection {
    Backend(BackendDescriptor),
    Template,
}

impl Selection {
    pub fn identifier(&self) -> String {
        match self {
            Selection::Backend(d) => d.identifier(),
            Selection::Template => TEMPLATE_MODEL.to_string(),
        }
    }

    pub fn source(&self) -> AdviceSource {
        match self {
            Selection::Backend(d) => d.kind.advice_source(),
            Selection::Template => AdviceSource::Template,
        }
    }

    pub fn privacy_level(&self) -> PrivacyLevel {
        self.source().privacy_level()
    }

    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            Selection::Backend(d) => Some(d.kind),
            Selection::Template => None,
        }
    }
}

fn is_preferred(descriptor: &BackendDescriptor, preferred: Option<&str>) -> bool {
    preferred.is_some_and(|p| descriptor.identifier() == p || descriptor.model == p)
}

/// Backends a request may try, best first. Never contains a cloud entry
/// unless `consent.cloud_api` is set.
pub fn eligible_chain(
    availability: &ModelAvailability,
    consent: ConsentState,
    preferred: Option<&str>,
) -> Vec<BackendDescriptor> {
    let mut chain: Vec<BackendDescriptor> = availability
        .backends
        .iter()
        .filter(|d| d.kind != BackendKind::Cloud || consent.cloud_api)
        .cloned()
        .collect();

    // Stable sort keeps discovery order within a tier; the preferred model
    // leads its own tier only
    chain.sort_by_key(|d| (d.kind, !is_preferred(d, preferred)));
    chain
}

pub fn select_backend(
    availability: &ModelAvailability,
    consent: ConsentState,
    preferred: Option<&str>,
) -> Selection {
    eligible_chain(availability, consent, preferred)
        .into_iter()
        .next()
        .map(Selection::Backend)
        .unwrap_or(Selection::Template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;

    fn availability(entries: &[(Provider, &str)]) -> ModelAvailability {
        ModelAvailability::new(
            entries
                .iter()
                .map(|(p, m)| BackendDescriptor::new(*p, *m))
                .collect(),
        )
    }

    const YES: ConsentState = ConsentState {
        cloud_api: true,
        data_sharing: false,
    };
    const NO: ConsentState = ConsentState {
        cloud_api: false,
        data_sharing: false,
    };

    #[test]
    fn test_precedence() {
        let all = availability(&[
            (Provider::Anthropic, "default"),
            (Provider::Runtime, "phi-2"),
            (Provider::Ollama, "llama3.2"),
        ]);
        assert_eq!(select_backend(&all, YES, None).identifier(), "ollama:llama3.2");

        let no_server = availability(&[(Provider::Anthropic, "default"), (Provider::Runtime, "phi-2")]);
        assert_eq!(select_backend(&no_server, YES, None).identifier(), "runtime:phi-2");

        let cloud_only = availability(&[(Provider::Google, "default")]);
        assert_eq!(select_backend(&cloud_only, YES, None).identifier(), "google:default");
        assert_eq!(select_backend(&cloud_only, NO, None), Selection::Template);

        assert_eq!(
            select_backend(&ModelAvailability::default(), YES, None),
            Selection::Template
        );
    }

    #[test]
    fn test_preferred_model_wins_within_tier_only() {
        let all = availability(&[
            (Provider::Ollama, "llama3.2"),
            (Provider::LocalApi, "qwen"),
            (Provider::Runtime, "phi-2"),
        ]);
        assert_eq!(
            select_backend(&all, NO, Some("local-api:qwen")).identifier(),
            "local-api:qwen"
        );
        assert_eq!(select_backend(&all, NO, Some("qwen")).identifier(), "local-api:qwen");
        // A preferred in-process model does not outrank a local server
        assert_eq!(
            select_backend(&all, NO, Some("runtime:phi-2")).identifier(),
            "ollama:llama3.2"
        );
        let chain = eligible_chain(&all, NO, Some("runtime:phi-2"));
        assert_eq!(chain.last().unwrap().identifier(), "runtime:phi-2");
    }

    #[test]
    fn test_chain_excludes_cloud_without_consent() {
        let all = availability(&[
            (Provider::Ollama, "llama3.2"),
            (Provider::OpenAI, "default"),
            (Provider::Anthropic, "default"),
        ]);
        let chain = eligible_chain(&all, NO, Some("openai:default"));
        assert_eq!(chain.len(), 1);
        assert!(chain.iter().all(|d| d.kind != BackendKind::Cloud));

        let chain = eligible_chain(&all, YES, None);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].kind, BackendKind::LocalServer);
    }

    #[test]
    fn test_selection_metadata() {
        let cloud = Selection::Backend(BackendDescriptor::new(Provider::Anthropic, "default"));
        assert_eq!(cloud.source(), AdviceSource::CloudModel);
        assert_eq!(cloud.privacy_level(), PrivacyLevel::CloudProcessed);
        assert_eq!(Selection::Template.identifier(), "enhanced-templates");
        assert_eq!(Selection::Template.privacy_level(), PrivacyLevel::TemplateBased);
    }
}
