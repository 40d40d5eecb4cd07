//! Backend invocation with one fallback retry, then templates
//!
//! A request never fails: the worst case is the emergency advice object.

use crate::advice::{AdviceRequest, AdviceResult, AdviceSource};
use crate::ai::{Backend, BackendDescriptor};
use crate::context::AdviceContext;
use crate::error::{Error, Result};
use crate::prompt;
use crate::templates::{self, TEMPLATE_MODEL};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The selected backend plus one retry on the next eligible backend
pub const MAX_BACKEND_ATTEMPTS: usize = 2;

/// Invoke one backend and turn its reply into validated advice
pub async fn invoke_backend(
    backend: &dyn Backend,
    descriptor: &BackendDescriptor,
    request: &AdviceRequest,
    prompt_text: &str,
    timeout: Duration,
) -> Result<AdviceResult> {
    let identifier = descriptor.identifier();

    let reply = tokio::time::timeout(timeout, backend.complete(&descriptor.model, prompt_text))
        .await
        .map_err(|_| Error::Timeout {
            backend: identifier.clone(),
            timeout,
        })??;

    let content = prompt::parse_advice_response(&reply, &request.situation);
    content
        .validate()
        .map_err(|reason| Error::invalid_advice(identifier.clone(), reason))?;

    Ok(AdviceResult::new(
        content,
        descriptor.kind.advice_source(),
        identifier,
    ))
}

/// The selected entry plus the retry target: the first later entry served
/// by a different provider, so a dead server is not asked twice.
pub fn attempt_order(chain: &[BackendDescriptor]) -> Vec<&BackendDescriptor> {
    let Some(first) = chain.first() else {
        return Vec::new();
    };
    let mut attempts = vec![first];
    attempts.extend(chain.iter().find(|d| d.provider != first.provider));
    attempts.truncate(MAX_BACKEND_ATTEMPTS);
    attempts
}

/// Try the head of the eligible chain, retrying once on the next backend.
/// Returns `None` when every attempt failed.
pub async fn try_backends(
    chain: &[BackendDescriptor],
    backends: &[Arc<dyn Backend>],
    request: &AdviceRequest,
    context: &AdviceContext,
    timeout: Duration,
) -> Option<AdviceResult> {
    if chain.is_empty() {
        return None;
    }
    let prompt_text = prompt::build_advice_prompt(request, context);

    for descriptor in attempt_order(chain) {
        let Some(backend) = backends.iter().find(|b| b.provider() == descriptor.provider) else {
            warn!("No backend registered for {}", descriptor.identifier());
            continue;
        };

        debug!("Requesting advice from {}", descriptor.identifier());
        match invoke_backend(backend.as_ref(), descriptor, request, &prompt_text, timeout).await {
            Ok(result) => {
                info!("Advice generated by {}", result.model);
                return Some(result);
            }
            Err(e) => warn!("{} failed, falling back: {}", descriptor.identifier(), e),
        }
    }
    None
}

/// Template advice, or the emergency object if even that is unusable
pub fn fallback_advice(request: &AdviceRequest, context: &AdviceContext) -> AdviceResult {
    let content = templates::generate(request, context);
    match content.validate() {
        Ok(()) => AdviceResult::new(content, AdviceSource::Template, TEMPLATE_MODEL),
        Err(reason) => {
            warn!("Template advice invalid ({}), using emergency advice", reason);
            templates::emergency_advice(request)
        }
    }
}

/// Full generation: backends in chain order, then templates
pub async fn generate(
    chain: &[BackendDescriptor],
    backends: &[Arc<dyn Backend>],
    request: &AdviceRequest,
    context: &AdviceContext,
    timeout: Duration,
) -> AdviceResult {
    match try_backends(chain, backends, request, context, timeout).await {
        Some(result) => result,
        None => {
            if !chain.is_empty() {
                info!("All model backends failed, using templates");
            }
            fallback_advice(request, context)
        }
    }
}
