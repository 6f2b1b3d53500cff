pub mod dispatch;
pub mod panel;

use std::path::Path;
use std::sync::{Arc, Mutex};

use wavespeed_core::tracker::{FeedbackTracker, TrackerError};
use wavespeed_core::{AdvisorRequest, AdvisorSettings, Mode, PromptContext, ProviderKind, Target};
use wavespeed_suggest::{Advisor, AdvisorError};

pub use dispatch::Dispatcher;
pub use panel::{AdvisorReply, Availability, PanelState, PromptField, RequestToken, SuggestionPanel, SuggestionRow};

/// Prompts at or above this success rate are offered to the model as patterns.
pub const PATTERN_MIN_RATE: f64 = 0.6;
pub const MAX_PATTERNS: usize = 3;

/// Process-wide state shared by every tab.
pub struct AppState {
    settings: Mutex<AdvisorSettings>,
    advisor: Arc<Advisor>,
    tracker: Arc<FeedbackTracker>,
}

impl AppState {
    /// Settings from `settings.json` plus the environment, tracker files in the
    /// data directory.
    pub fn load() -> Result<Self, TrackerError> {
        let tracker = FeedbackTracker::open(wavespeed_core::data_dir())?;
        let settings = wavespeed_core::read_settings();
        let advisor = Advisor::from_settings(&settings);
        Ok(Self::new(settings, Arc::new(advisor), Arc::new(tracker)))
    }

    pub fn new(settings: AdvisorSettings, advisor: Arc<Advisor>, tracker: Arc<FeedbackTracker>) -> Self {
        tracing::info!(
            providers = ?advisor.providers(),
            events = %tracker.events_path().display(),
            "advisor state ready"
        );
        Self {
            settings: Mutex::new(settings),
            advisor,
            tracker,
        }
    }

    pub fn advisor(&self) -> &Arc<Advisor> {
        &self.advisor
    }

    pub fn tracker(&self) -> &Arc<FeedbackTracker> {
        &self.tracker
    }

    pub fn settings(&self) -> AdvisorSettings {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn availability(&self) -> Availability {
        if self.advisor.is_available() {
            Availability::Available
        } else {
            Availability::Unavailable(AdvisorError::NoProviderConfigured.user_message())
        }
    }

    /// Settings for display. Keys are reported by presence only.
    pub fn ai_settings_view(&self) -> serde_json::Value {
        self.settings().masked()
    }

    /// Persist a new primary provider. Only the file layer is rewritten, so
    /// values that came from the environment stay out of `settings.json`.
    /// Takes effect for advisors built afterwards.
    pub fn save_primary(&self, dir: &Path, primary: ProviderKind) -> std::io::Result<()> {
        let mut stored = wavespeed_core::read_settings_from(dir);
        stored.primary = primary;
        wavespeed_core::write_settings_to(dir, &stored)?;
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).primary = primary;
        Ok(())
    }

    /// Build a request for `target`, filling prior patterns from the feedback log.
    pub fn build_request(
        &self,
        target: Target,
        prompt: &str,
        mode: Mode,
        image_description: Option<String>,
        count: usize,
    ) -> AdvisorRequest {
        let context = PromptContext {
            image_description: image_description.filter(|d| !d.trim().is_empty()),
            prior_successful_patterns: self.successful_patterns(),
        };
        AdvisorRequest::new(target, prompt)
            .with_mode(mode)
            .with_context(context)
            .with_count(count)
    }

    fn successful_patterns(&self) -> Vec<String> {
        match self.tracker.get_successful_prompts(PATTERN_MIN_RATE) {
            Ok(stats) => stats
                .into_iter()
                .take(MAX_PATTERNS)
                .map(|s| s.prompt)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read prompt history");
                Vec::new()
            }
        }
    }
}
