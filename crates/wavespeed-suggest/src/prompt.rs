use std::borrow::Cow;
use std::collections::HashMap;

use wavespeed_core::templates::{self, ADVISOR_PREAMBLE, TRAINING_MODE_BLOCK};
use wavespeed_core::{AdvisorRequest, Category, Mode, PromptContext, Target};

use crate::error::AdvisorError;

/// Prior prompts shown as examples, at most.
const MAX_PATTERNS: usize = 3;

/// Builds the advisor's system prompt from a per-target template table.
#[derive(Debug, Clone)]
pub struct Composer {
    templates: HashMap<Target, Cow<'static, str>>,
}

impl Composer {
    /// Table with guidance for every built-in target.
    pub fn builtin() -> Self {
        let mut composer = Self::empty();
        for (target, guidance) in templates::builtin() {
            composer.register(target, guidance);
        }
        composer
    }

    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn register(&mut self, target: Target, template: impl Into<Cow<'static, str>>) {
        self.templates.insert(target, template.into());
    }

    /// Compose the system prompt. Deterministic: no randomness, no I/O.
    pub fn compose(
        &self,
        target: Target,
        mode: Mode,
        context: &PromptContext,
    ) -> Result<String, AdvisorError> {
        let guidance = self
            .templates
            .get(&target)
            .ok_or_else(|| AdvisorError::UnknownTarget(target.display_name().to_string()))?;

        let mut out = String::with_capacity(4096);
        out.push_str(ADVISOR_PREAMBLE);
        out.push_str("\n\n");
        out.push_str(guidance);

        if mode == Mode::FilterTraining {
            out.push_str("\n\n");
            out.push_str(TRAINING_MODE_BLOCK);
        }

        if let Some(description) = context
            .image_description
            .as_deref()
            .map(collapse_whitespace)
            .filter(|d| !d.is_empty())
        {
            out.push_str("\n\n## Reference image\nThe user attached an image described as: \"");
            out.push_str(&description);
            out.push_str(
                "\". Ground every suggestion in concrete visual details from this image \
(named objects, colors, positions, lighting) rather than generic wording.",
            );
        }

        let patterns: Vec<String> = context
            .prior_successful_patterns
            .iter()
            .map(|p| collapse_whitespace(p))
            .filter(|p| !p.is_empty())
            .take(MAX_PATTERNS)
            .collect();
        if !patterns.is_empty() {
            out.push_str(
                "\n\n## Prompts that worked well before\n\
These earlier prompts produced results the user kept. Use them as illustrations \
of phrasing the user likes; they are not templates to copy.\n",
            );
            for (i, pattern) in patterns.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, pattern));
            }
        }

        out.push_str("\n\n");
        out.push_str(&output_contract(mode));
        Ok(out)
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::builtin()
    }
}

fn output_contract(mode: Mode) -> String {
    let categories: Vec<&str> = Category::for_mode(mode).iter().map(|c| c.as_str()).collect();
    format!(
        "## Output format\n\
Output ONLY a JSON object, nothing else: \
{{\"suggestions\":[{{\"category\":\"<{}>\",\"improved_prompt\":\"<the full rewritten prompt>\",\
\"explanation\":\"<one sentence on what changed and why>\",\"confidence\":<number between 0 and 1>}}]}}. \
Order suggestions from most to least promising. \
\"improved_prompt\" must be a complete prompt ready to paste, never a fragment or a diff.",
        categories.join("|")
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The user turn: the prompt to improve and how many suggestions to return.
pub fn user_message(request: &AdvisorRequest) -> String {
    let mut out = String::new();
    out.push_str("Target tab: ");
    out.push_str(request.target.display_name());
    out.push('\n');

    let prompt = request.current_prompt.trim();
    if prompt.is_empty() {
        out.push_str("Current prompt: (empty). Propose fresh prompts suited to this target.\n");
    } else {
        out.push_str("Current prompt: \"");
        out.push_str(prompt);
        out.push_str("\"\n");
    }

    out.push_str(&format!("Return {} suggestions.", request.suggestion_count));
    out
}
