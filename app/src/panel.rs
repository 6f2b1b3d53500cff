//! Suggestion panel state, independent of any UI toolkit. The UI thread owns
//! a panel per tab and feeds it replies drained from the dispatcher queue.

use std::fmt;

use wavespeed_core::{Suggestion, Target};
use wavespeed_suggest::{fallback_suggestions, AdvisorError};

/// Identifies one request. Only the newest token of a panel is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub target: Target,
    pub generation: u64,
}

/// A finished request on its way back to the UI thread.
#[derive(Debug)]
pub struct AdvisorReply {
    pub token: RequestToken,
    pub outcome: Result<Vec<Suggestion>, AdvisorError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelState {
    Idle,
    /// The AI button is disabled; the reason is shown instead.
    Unavailable { reason: String },
    Loading { generation: u64 },
    /// `notice` carries a transient status when the list is the fallback set
    /// shown after a failed request.
    Ready {
        suggestions: Vec<Suggestion>,
        notice: Option<String>,
    },
}

/// One rendered line of the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRow {
    pub index: usize,
    pub category: &'static str,
    pub confidence: String,
    pub prompt: String,
    pub explanation: String,
    pub fallback: bool,
}

impl fmt::Display for SuggestionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.index, self.category, self.confidence)?;
        if self.fallback {
            f.write_str(" (built-in)")?;
        }
        write!(f, "\n    {}", self.prompt)?;
        if !self.explanation.is_empty() {
            write!(f, "\n    why: {}", self.explanation)?;
        }
        Ok(())
    }
}

pub struct SuggestionPanel {
    target: Target,
    generation: u64,
    state: PanelState,
}

impl SuggestionPanel {
    pub fn new(target: Target, availability: Availability) -> Self {
        let state = match availability {
            Availability::Available => PanelState::Idle,
            Availability::Unavailable(reason) => PanelState::Unavailable { reason },
        };
        Self {
            target,
            generation: 0,
            state,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, PanelState::Unavailable { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PanelState::Loading { .. })
    }

    /// Start a request. Any reply still in flight becomes stale.
    /// `None` while the panel is disabled.
    pub fn begin_request(&mut self) -> Option<RequestToken> {
        if !self.is_enabled() {
            return None;
        }
        self.generation += 1;
        self.state = PanelState::Loading {
            generation: self.generation,
        };
        Some(RequestToken {
            target: self.target,
            generation: self.generation,
        })
    }

    /// The user edited the prompt; drop whatever is shown or pending.
    pub fn invalidate(&mut self) {
        if !self.is_enabled() {
            return;
        }
        self.generation += 1;
        self.state = PanelState::Idle;
    }

    /// Apply a reply. Returns false (and changes nothing) for stale replies.
    pub fn accept(&mut self, reply: AdvisorReply) -> bool {
        let current = RequestToken {
            target: self.target,
            generation: self.generation,
        };
        if reply.token != current || !self.is_loading() {
            tracing::debug!(
                tab = %reply.token.target,
                generation = reply.token.generation,
                current = self.generation,
                "dropping stale advisor reply"
            );
            return false;
        }

        self.state = match reply.outcome {
            Ok(suggestions) => PanelState::Ready {
                suggestions,
                notice: None,
            },
            Err(e) if e.is_configuration_error() => PanelState::Unavailable {
                reason: e.user_message(),
            },
            Err(e) => {
                tracing::warn!(tab = %self.target, error = %e, "advisor request failed");
                PanelState::Ready {
                    suggestions: fallback_suggestions(),
                    notice: Some(e.user_message()),
                }
            }
        };
        true
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        match &self.state {
            PanelState::Ready { suggestions, .. } => suggestions.as_slice(),
            _ => &[],
        }
    }

    pub fn rows(&self) -> Vec<SuggestionRow> {
        self.suggestions()
            .iter()
            .enumerate()
            .map(|(i, s)| SuggestionRow {
                index: i + 1,
                category: s.category().as_str(),
                confidence: format!("{}%", s.confidence_percent()),
                prompt: s.improved_prompt().to_string(),
                explanation: s.explanation().to_string(),
                fallback: s.is_fallback(),
            })
            .collect()
    }

    /// Suggestion by 1-based row index, for apply or copy.
    pub fn select(&self, index: usize) -> Option<&Suggestion> {
        index.checked_sub(1).and_then(|i| self.suggestions().get(i))
    }

    pub fn status_line(&self) -> String {
        match &self.state {
            PanelState::Idle => "Ask AI for prompt suggestions.".to_string(),
            PanelState::Unavailable { reason } => reason.clone(),
            PanelState::Loading { .. } => format!("Asking AI about your {} prompt...", self.target),
            PanelState::Ready {
                notice: Some(notice),
                ..
            } => format!("{notice} Showing built-in tips instead."),
            PanelState::Ready { suggestions, .. } if suggestions.iter().all(Suggestion::is_fallback) => {
                "The AI reply could not be read. Showing built-in tips instead.".to_string()
            }
            PanelState::Ready { suggestions, .. } => match suggestions.len() {
                1 => "1 suggestion.".to_string(),
                n => format!("{n} suggestions."),
            },
        }
    }
}

/// The prompt text box of a tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptField {
    text: String,
}

impl PromptField {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the prompt with the suggestion's text.
    pub fn apply(&mut self, suggestion: &Suggestion) {
        self.text = suggestion.improved_prompt().to_string();
    }
}
