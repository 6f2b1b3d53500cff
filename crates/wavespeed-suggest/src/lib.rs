pub mod engine;
mod error;
mod extract;
mod parse;
mod prompt;

use std::sync::Arc;
use std::time::Duration;

use wavespeed_core::{AdvisorRequest, AdvisorSettings, ProviderKind, Suggestion};

pub use engine::{ChatProvider, ProviderError, ProviderResult};
pub use error::{AdvisorError, AttemptFailure, ProviderAttempt};
pub use parse::{fallback_suggestions, parse_llm_output};
pub use prompt::{user_message, Composer};

/// Turns a prompt plus context into ranked suggestions. Constructed once by
/// the shell and shared (`Arc<Advisor>`) with whatever needs it; holds no
/// mutable state, so concurrent `improve` calls are independent.
pub struct Advisor {
    composer: Composer,
    providers: Vec<Arc<dyn ChatProvider>>,
    call_timeout: Duration,
}

impl Advisor {
    /// `providers` are tried in the given order.
    pub fn new(
        composer: Composer,
        providers: Vec<Arc<dyn ChatProvider>>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            composer,
            providers,
            call_timeout,
        }
    }

    pub fn from_settings(settings: &AdvisorSettings) -> Self {
        Self::new(
            Composer::builtin(),
            engine::providers_from_settings(settings),
            Duration::from_secs(settings.timeout_secs.max(1)),
        )
    }

    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Ask each provider once, in priority order, and parse the first usable
    /// reply. Returns at most `request.suggestion_count` suggestions, best first.
    pub async fn improve(&self, request: &AdvisorRequest) -> Result<Vec<Suggestion>, AdvisorError> {
        if self.providers.is_empty() {
            return Err(AdvisorError::NoProviderConfigured);
        }

        let system = self
            .composer
            .compose(request.target, request.mode, &request.context)?;
        let user_msg = prompt::user_message(request);

        let mut attempts = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let kind = provider.kind();
            tracing::info!(
                provider = %kind,
                model = provider.model(),
                tab = %request.target,
                mode = ?request.mode,
                "requesting prompt suggestions"
            );

            let outcome =
                tokio::time::timeout(self.call_timeout, provider.complete(&system, &user_msg)).await;

            let failure = match outcome {
                Ok(Ok(result)) if result.ok => {
                    tracing::debug!(provider = %kind, raw = %result.raw_text, "provider reply");
                    let mut suggestions = parse::parse_llm_output(&result.raw_text);
                    rank(&mut suggestions, request.suggestion_count);
                    tracing::info!(provider = %kind, count = suggestions.len(), "parsed suggestions");
                    return Ok(suggestions);
                }
                Ok(Ok(result)) if result.is_content_blocked() => {
                    tracing::warn!(
                        provider = %kind,
                        finish_reason = ?result.finish_reason,
                        "provider blocked the content"
                    );
                    AttemptFailure::Blocked {
                        finish_reason: result.finish_reason,
                    }
                }
                Ok(Ok(result)) => {
                    tracing::warn!(provider = %kind, finish_reason = ?result.finish_reason, "provider sent an empty reply");
                    AttemptFailure::EmptyReply
                }
                Ok(Err(ProviderError::Timeout(_))) | Err(_) => {
                    tracing::warn!(provider = %kind, timeout = ?self.call_timeout, "provider timed out");
                    AttemptFailure::Timeout
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = %kind, error = %e, "provider request failed");
                    AttemptFailure::Transport(e.to_string())
                }
            };
            attempts.push(ProviderAttempt {
                provider: kind,
                failure,
            });
        }

        Err(AdvisorError::AllProvidersFailed { attempts })
    }
}

/// Highest confidence first, keeping reply order among equals.
fn rank(suggestions: &mut Vec<Suggestion>, count: usize) {
    suggestions.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    suggestions.truncate(count.max(1));
}
