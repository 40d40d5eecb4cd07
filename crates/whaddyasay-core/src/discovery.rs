//! Backend discovery
//!
//! Every registered backend is probed concurrently under a timeout. A probe
//! that errors or times out only means that backend is unavailable;
//! discovery itself never fails.

use crate::ai::{Backend, BackendDescriptor, BackendKind};
use crate::consent::ConsentState;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Backends found by the last discovery pass, grouped local first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelAvailability {
    pub backends: Vec<BackendDescriptor>,
    pub discovered_at: String,
}

impl ModelAvailability {
    pub fn new(mut backends: Vec<BackendDescriptor>) -> Self {
        // Stable: discovery order is kept inside each tier
        backends.sort_by_key(|d| d.kind);
        Self {
            backends,
            discovered_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn has_kind(&self, kind: BackendKind) -> bool {
        self.backends.iter().any(|d| d.kind == kind)
    }

    pub fn of_kind(&self, kind: BackendKind) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.iter().filter(move |d| d.kind == kind)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.backends.iter().map(|d| d.identifier()).collect()
    }
}

/// Probe all backends. Cloud backends are not contacted without consent.
pub async fn discover(
    backends: &[Arc<dyn Backend>],
    consent: ConsentState,
    probe_timeout: Duration,
) -> ModelAvailability {
    let probes = backends
        .iter()
        .filter(|b| b.kind() != BackendKind::Cloud || consent.cloud_api)
        .map(|backend| async move {
            let provider = backend.provider();
            match tokio::time::timeout(probe_timeout, backend.probe()).await {
                Ok(Ok(found)) => {
                    debug!("{} reported {} model(s)", provider, found.len());
                    found
                }
                Ok(Err(e)) => {
                    debug!("{} unavailable: {}", provider, e);
                    Vec::new()
                }
                Err(_) => {
                    debug!(
                        "{} probe timed out after {}ms",
                        provider,
                        probe_timeout.as_millis()
                    );
                    Vec::new()
                }
            }
        });

    let found: Vec<BackendDescriptor> = join_all(probes).await.into_iter().flatten().collect();
    let availability = ModelAvailability::new(found);
    info!(
        "Discovered {} backend(s): {:?}",
        availability.len(),
        availability.identifiers()
    );
    availability
}
