pub mod templates;
pub mod tracker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// --- Targets ---

/// A generation tab the advisor can write prompts for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    SeedreamV4,
    SeedEdit,
    NanoBananaEditor,
    SeedDance,
    Wan22,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target: {0}")]
pub struct UnknownTarget(pub String);

impl Target {
    pub const ALL: [Target; 5] = [
        Target::SeedreamV4,
        Target::SeedEdit,
        Target::NanoBananaEditor,
        Target::SeedDance,
        Target::Wan22,
    ];

    /// Tab title as shown in the suite.
    pub fn display_name(self) -> &'static str {
        match self {
            Target::SeedreamV4 => "Seedream V4",
            Target::SeedEdit => "SeedEdit",
            Target::NanoBananaEditor => "Nano Banana Editor",
            Target::SeedDance => "SeedDance",
            Target::Wan22 => "Wan 2.2",
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Target::SeedreamV4 => "seedream_v4",
            Target::SeedEdit => "seed_edit",
            Target::NanoBananaEditor => "nano_banana_editor",
            Target::SeedDance => "seed_dance",
            Target::Wan22 => "wan_22",
        }
    }

    /// SeedDance and Wan 2.2 produce video; the other tabs produce still images.
    pub fn is_video(self) -> bool {
        matches!(self, Target::SeedDance | Target::Wan22)
    }

    /// Resolve a tab title or target id. Matching ignores case and surrounding whitespace.
    pub fn from_name(name: &str) -> Result<Target, UnknownTarget> {
        let wanted = name.trim();
        Target::ALL
            .into_iter()
            .find(|t| {
                t.display_name().eq_ignore_ascii_case(wanted) || t.id().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| UnknownTarget(name.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Target {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::from_name(s)
    }
}

// --- Requests ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Normal,
    /// Synthetic variation mode: diverse, policy-compliant prompt variants for dataset building.
    FilterTraining,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "filter_training" | "filter-training" | "training" => Ok(Mode::FilterTraining),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Optional extras that sharpen suggestions. Never required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
    /// Ranked best-first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_successful_patterns: Vec<String>,
}

pub const DEFAULT_SUGGESTION_COUNT: usize = 3;
pub const MAX_SUGGESTION_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorRequest {
    pub current_prompt: String,
    pub target: Target,
    pub mode: Mode,
    pub context: PromptContext,
    pub suggestion_count: usize,
}

impl AdvisorRequest {
    pub fn new(target: Target, current_prompt: impl Into<String>) -> Self {
        Self {
            current_prompt: current_prompt.into(),
            target,
            mode: Mode::Normal,
            context: PromptContext::default(),
            suggestion_count: DEFAULT_SUGGESTION_COUNT,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_context(mut self, context: PromptContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.suggestion_count = count.clamp(1, MAX_SUGGESTION_COUNT);
        self
    }
}

// --- Suggestions ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Clarity,
    Creativity,
    Technical,
    Style,
    Composition,
    Lighting,
    General,
    SubjectVariation,
    StyleVariation,
    SceneVariation,
    EdgeCase,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Clarity => "clarity",
            Category::Creativity => "creativity",
            Category::Technical => "technical",
            Category::Style => "style",
            Category::Composition => "composition",
            Category::Lighting => "lighting",
            Category::General => "general",
            Category::SubjectVariation => "subject_variation",
            Category::StyleVariation => "style_variation",
            Category::SceneVariation => "scene_variation",
            Category::EdgeCase => "edge_case",
        }
    }

    /// Parse a tag as models tend to write it ("Clarity", "style-variation", "edge case").
    pub fn from_tag(tag: &str) -> Option<Category> {
        let tag = tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let category = match tag.as_str() {
            "clarity" => Category::Clarity,
            "creativity" | "creative" => Category::Creativity,
            "technical" => Category::Technical,
            "style" => Category::Style,
            "composition" => Category::Composition,
            "lighting" => Category::Lighting,
            "general" => Category::General,
            "subject_variation" => Category::SubjectVariation,
            "style_variation" => Category::StyleVariation,
            "scene_variation" => Category::SceneVariation,
            "edge_case" => Category::EdgeCase,
            _ => return None,
        };
        Some(category)
    }

    pub fn for_mode(mode: Mode) -> &'static [Category] {
        match mode {
            Mode::Normal => &[
                Category::Clarity,
                Category::Creativity,
                Category::Technical,
                Category::Style,
                Category::Composition,
                Category::Lighting,
            ],
            Mode::FilterTraining => &[
                Category::SubjectVariation,
                Category::StyleVariation,
                Category::SceneVariation,
                Category::EdgeCase,
            ],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Model,
    Fallback,
}

pub const DEFAULT_CONFIDENCE: f64 = 0.75;

/// One candidate prompt. Fields are read-only once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestion {
    category: Category,
    improved_prompt: String,
    explanation: String,
    confidence: f64,
    source: SuggestionSource,
}

impl Suggestion {
    /// Returns `None` when `improved_prompt` is blank. Out-of-range or
    /// non-finite confidence falls back to [`DEFAULT_CONFIDENCE`].
    pub fn new(
        category: Category,
        improved_prompt: impl Into<String>,
        explanation: impl Into<String>,
        confidence: Option<f64>,
        source: SuggestionSource,
    ) -> Option<Self> {
        let improved_prompt = improved_prompt.into().trim().to_string();
        if improved_prompt.is_empty() {
            return None;
        }
        let confidence = confidence
            .filter(|c| c.is_finite() && (0.0..=1.0).contains(c))
            .unwrap_or(DEFAULT_CONFIDENCE);
        Some(Self {
            category,
            improved_prompt,
            explanation: explanation.into().trim().to_string(),
            confidence,
            source,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn improved_prompt(&self) -> &str {
        &self.improved_prompt
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }

    pub fn source(&self) -> SuggestionSource {
        self.source
    }

    pub fn is_fallback(&self) -> bool {
        self.source == SuggestionSource::Fallback
    }
}

// --- Storage ---

/// Resolve the data directory (`$WAVESPEED_DATA_DIR`, else `~/.wavespeed/`).
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("WAVESPEED_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wavespeed")
}

/// Write via temp file + rename so readers never observe a half-written document.
pub fn write_atomic(path: &Path, data: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}

// --- AI Settings ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::OpenAi => "openai",
        }
    }

    pub fn other(self) -> ProviderKind {
        match self {
            ProviderKind::Claude => ProviderKind::OpenAi,
            ProviderKind::OpenAi => ProviderKind::Claude,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Advisor preferences. Persisted to `settings.json` without credentials;
/// API keys only ever come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvisorSettings {
    pub primary: ProviderKind,
    pub claude_model: String,
    pub openai_model: String,
    pub claude_base_url: String,
    pub openai_base_url: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub claude_api_key: Option<String>,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            primary: ProviderKind::Claude,
            claude_model: "claude-sonnet-4-20250514".to_string(),
            openai_model: "gpt-4o".to_string(),
            claude_base_url: "https://api.anthropic.com".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            timeout_secs: 60,
            claude_api_key: None,
            openai_api_key: None,
        }
    }
}

impl AdvisorSettings {
    /// Overlay environment values. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("ANTHROPIC_API_KEY").or_else(|| get("CLAUDE_API_KEY")) {
            self.claude_api_key = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(primary) = get("WAVESPEED_AI_PROVIDER") {
            match primary.parse() {
                Ok(kind) => self.primary = kind,
                Err(e) => tracing::warn!(error = %e, "ignoring WAVESPEED_AI_PROVIDER"),
            }
        }
        if let Some(model) = get("CLAUDE_MODEL") {
            self.claude_model = model;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.openai_model = model;
        }
        if let Some(secs) = get("WAVESPEED_AI_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = secs;
        }
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Claude => self.claude_api_key.as_deref(),
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
        }
    }

    pub fn model(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Claude => &self.claude_model,
            ProviderKind::OpenAi => &self.openai_model,
        }
    }

    pub fn base_url(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Claude => &self.claude_base_url,
            ProviderKind::OpenAi => &self.openai_base_url,
        }
    }

    /// Primary first, then the other provider; providers without a key are skipped.
    pub fn provider_order(&self) -> Vec<ProviderKind> {
        [self.primary, self.primary.other()]
            .into_iter()
            .filter(|kind| self.api_key(*kind).is_some())
            .collect()
    }

    /// Settings view that is safe to show: key presence only.
    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "primary": self.primary,
            "claudeModel": self.claude_model,
            "openaiModel": self.openai_model,
            "timeoutSecs": self.timeout_secs,
            "hasClaudeKey": self.claude_api_key.is_some(),
            "hasOpenaiKey": self.openai_api_key.is_some(),
            "configured": ai_configured(self),
        })
    }
}

pub fn ai_configured(settings: &AdvisorSettings) -> bool {
    !settings.provider_order().is_empty()
}

fn settings_path(dir: &Path) -> PathBuf {
    dir.join("settings.json")
}

/// Read `settings.json` from `dir`. A missing or unreadable file yields defaults.
pub fn read_settings_from(dir: &Path) -> AdvisorSettings {
    let path = settings_path(dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AdvisorSettings::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read settings, using defaults");
            return AdvisorSettings::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
        AdvisorSettings::default()
    })
}

/// File settings overlaid with the process environment.
pub fn read_settings() -> AdvisorSettings {
    let mut settings = read_settings_from(&data_dir());
    settings.apply_env(|key| std::env::var(key).ok());
    settings
}

pub fn write_settings_to(dir: &Path, settings: &AdvisorSettings) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    write_atomic(&settings_path(dir), &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn target_resolves_tab_titles_and_ids() {
        assert_eq!(Target::from_name("Nano Banana Editor"), Ok(Target::NanoBananaEditor));
        assert_eq!(Target::from_name("  wan 2.2 "), Ok(Target::Wan22));
        assert_eq!(Target::from_name("seed_dance"), Ok(Target::SeedDance));
        assert_eq!(
            Target::from_name("Image Upscaler"),
            Err(UnknownTarget("Image Upscaler".to_string()))
        );
    }

    #[test]
    fn suggestion_rejects_blank_prompt_and_defaults_confidence() {
        assert!(Suggestion::new(Category::General, "   ", "", Some(0.5), SuggestionSource::Model).is_none());

        let s = Suggestion::new(Category::Clarity, " X ", "Y", Some(1.7), SuggestionSource::Model).unwrap();
        assert_eq!(s.improved_prompt(), "X");
        assert_eq!(s.confidence(), DEFAULT_CONFIDENCE);

        let s = Suggestion::new(Category::Clarity, "X", "", Some(f64::NAN), SuggestionSource::Model).unwrap();
        assert_eq!(s.confidence(), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn confidence_percent_rounds() {
        let s = Suggestion::new(Category::Clarity, "X", "", Some(0.92), SuggestionSource::Model).unwrap();
        assert_eq!(s.confidence_percent(), 92);
        let s = Suggestion::new(Category::Clarity, "X", "", Some(0.005), SuggestionSource::Model).unwrap();
        assert_eq!(s.confidence_percent(), 1);
    }

    #[test]
    fn category_tags_are_lenient() {
        assert_eq!(Category::from_tag("Clarity"), Some(Category::Clarity));
        assert_eq!(Category::from_tag("style-variation"), Some(Category::StyleVariation));
        assert_eq!(Category::from_tag("edge case"), Some(Category::EdgeCase));
        assert_eq!(Category::from_tag("vibes"), None);
    }

    #[test]
    fn provider_order_skips_missing_keys() {
        let mut settings = AdvisorSettings::default();
        assert!(settings.provider_order().is_empty());
        assert!(!ai_configured(&settings));

        settings.apply_env(env(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(settings.provider_order(), vec![ProviderKind::OpenAi]);

        settings.apply_env(env(&[("CLAUDE_API_KEY", "ant-test")]));
        assert_eq!(
            settings.provider_order(),
            vec![ProviderKind::Claude, ProviderKind::OpenAi]
        );

        settings.apply_env(env(&[("WAVESPEED_AI_PROVIDER", "openai")]));
        assert_eq!(
            settings.provider_order(),
            vec![ProviderKind::OpenAi, ProviderKind::Claude]
        );
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut settings = AdvisorSettings::default();
        settings.apply_env(env(&[("ANTHROPIC_API_KEY", "  "), ("WAVESPEED_AI_TIMEOUT_SECS", "15")]));
        assert_eq!(settings.claude_api_key, None);
        assert_eq!(settings.timeout_secs, 15);
    }

    #[test]
    fn settings_file_never_contains_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AdvisorSettings::default();
        settings.primary = ProviderKind::OpenAi;
        settings.openai_api_key = Some("sk-secret".to_string());

        write_settings_to(dir.path(), &settings).unwrap();
        let raw = fs::read_to_string(dir.path().join("settings.json")).unwrap();
        assert!(!raw.contains("sk-secret"));

        let loaded = read_settings_from(dir.path());
        assert_eq!(loaded.primary, ProviderKind::OpenAi);
        assert_eq!(loaded.openai_api_key, None);
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_settings_from(dir.path()), AdvisorSettings::default());
    }

    #[test]
    fn malformed_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{\"primary\": ").unwrap();
        assert_eq!(read_settings_from(dir.path()), AdvisorSettings::default());
    }

    #[test]
    fn video_targets() {
        let video: Vec<Target> = Target::ALL.into_iter().filter(|t| t.is_video()).collect();
        assert_eq!(video, vec![Target::SeedDance, Target::Wan22]);
    }
}
