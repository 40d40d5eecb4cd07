//! Persisted cloud-usage consent

use crate::error::Result;
use crate::storage::Settings;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const PREFERENCES_KEY: &str = "llm_preferences";

/// Both flags default to off; cloud use requires an explicit opt-in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentState {
    #[serde(default, alias = "cloudAPI")]
    pub cloud_api: bool,
    #[serde(default, alias = "dataSharing")]
    pub data_sharing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPreferences {
    #[serde(default)]
    consent: ConsentState,
    #[serde(default)]
    updated_at: String,
}

/// Stored consent; an unreadable entry counts as no consent
pub fn load_consent(settings: &Settings) -> Result<ConsentState> {
    match settings.get::<StoredPreferences>(PREFERENCES_KEY) {
        Ok(Some(prefs)) => Ok(prefs.consent),
        Ok(None) => Ok(ConsentState::default()),
        Err(crate::error::Error::Serialization(e)) => {
            warn!("Ignoring unreadable {}: {}", PREFERENCES_KEY, e);
            Ok(ConsentState::default())
        }
        Err(e) => Err(e),
    }
}

pub fn save_consent(settings: &Settings, consent: &ConsentState) -> Result<()> {
    settings.set(
        PREFERENCES_KEY,
        &StoredPreferences {
            consent: *consent,
            updated_at: chrono::Utc::now().to_rfc3339(),
        },
    )
}
