use std::fmt;

use wavespeed_core::{ProviderKind, UnknownTarget};

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// Network, HTTP status or decoding failure.
    Transport(String),
    Timeout,
    /// The provider refused or filtered the completion.
    Blocked { finish_reason: Option<String> },
    /// The provider finished normally but sent no text.
    EmptyReply,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport(reason) => write!(f, "request failed ({reason})"),
            AttemptFailure::Timeout => f.write_str("timed out"),
            AttemptFailure::Blocked {
                finish_reason: Some(reason),
            } => write!(f, "content blocked ({reason})"),
            AttemptFailure::Blocked { finish_reason: None } => f.write_str("content blocked"),
            AttemptFailure::EmptyReply => f.write_str("empty reply"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: ProviderKind,
    pub failure: AttemptFailure,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.failure)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdvisorError {
    #[error("no prompt template registered for target {0}")]
    UnknownTarget(String),
    #[error("no AI provider configured")]
    NoProviderConfigured,
    #[error("all AI providers failed: {}", summarize(.attempts))]
    AllProvidersFailed { attempts: Vec<ProviderAttempt> },
    /// The request never finished, e.g. its worker task panicked.
    #[error("advisor request interrupted: {0}")]
    Interrupted(String),
}

fn summarize(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<UnknownTarget> for AdvisorError {
    fn from(err: UnknownTarget) -> Self {
        AdvisorError::UnknownTarget(err.0)
    }
}

impl AdvisorError {
    /// Configuration problems disable the feature; everything else is a transient failure.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AdvisorError::UnknownTarget(_) | AdvisorError::NoProviderConfigured
        )
    }

    /// True when every provider answered but refused the content.
    pub fn is_content_blocked(&self) -> bool {
        match self {
            AdvisorError::AllProvidersFailed { attempts } => {
                !attempts.is_empty()
                    && attempts
                        .iter()
                        .all(|a| matches!(a.failure, AttemptFailure::Blocked { .. }))
            }
            _ => false,
        }
    }

    /// Reason text for the UI.
    pub fn user_message(&self) -> String {
        match self {
            AdvisorError::UnknownTarget(name) => {
                format!("AI suggestions are not available for \"{name}\".")
            }
            AdvisorError::NoProviderConfigured => {
                "No API keys configured. Set ANTHROPIC_API_KEY or OPENAI_API_KEY to enable AI suggestions."
                    .to_string()
            }
            AdvisorError::AllProvidersFailed { attempts } if self.is_content_blocked() => {
                if attempts.len() > 1 {
                    "Every provider blocked this content. Rephrase the prompt and try again.".to_string()
                } else {
                    "The provider blocked this content. Rephrase the prompt or configure the other provider."
                        .to_string()
                }
            }
            AdvisorError::AllProvidersFailed { .. } => {
                "The AI request failed. Check your connection and try again.".to_string()
            }
            AdvisorError::Interrupted(_) => "The AI request stopped unexpectedly. Try again.".to_string(),
        }
    }
}
