use serde_json::Value;

use wavespeed_core::{Category, Suggestion, SuggestionSource};

use crate::extract;

const FALLBACK_CONFIDENCE: f64 = 0.5;

const FALLBACK: [(Category, &str, &str); 3] = [
    (
        Category::Clarity,
        "A clearly defined main subject in the center of the frame, described by what it is, \
what it wears or is made of, and what it is doing, set against a simple uncluttered background",
        "Lead with one concrete subject and its materials so the model has less to guess.",
    ),
    (
        Category::Lighting,
        "The same scene lit by soft diffused window light from the left, gentle shadows, \
natural color balance, sharp focus on the subject",
        "An explicit light source and focus instruction usually improves realism.",
    ),
    (
        Category::Style,
        "The same scene as a high-resolution photograph, 50mm lens, shallow depth of field, \
muted cohesive color palette",
        "Naming the medium and lens gives the model a consistent visual style to follow.",
    ),
];

/// Built-in suggestions shown when a reply yields nothing usable.
pub fn fallback_suggestions() -> Vec<Suggestion> {
    FALLBACK
        .iter()
        .filter_map(|(category, prompt, why)| {
            Suggestion::new(
                *category,
                *prompt,
                *why,
                Some(FALLBACK_CONFIDENCE),
                SuggestionSource::Fallback,
            )
        })
        .collect()
}

/// Parse raw LLM output into suggestions. Never fails and never returns an
/// empty list: anything unusable degrades to [`fallback_suggestions`].
pub fn parse_llm_output(raw: &str) -> Vec<Suggestion> {
    let suggestions = parse_strict(raw).unwrap_or_else(|| parse_extracted(raw));
    if !suggestions.is_empty() {
        return suggestions;
    }

    tracing::warn!(
        reply_len = raw.len(),
        "no usable suggestions in LLM reply, using fallback set"
    );
    fallback_suggestions()
}

/// Decode the whole reply. `None` when it is not JSON of a known shape.
fn parse_strict(raw: &str) -> Option<Vec<Suggestion>> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    entries(value).map(validate)
}

/// Scan the reply for embedded JSON. A container (`{"suggestions": [...]}` or
/// an array) with valid entries wins; otherwise complete loose suggestion
/// objects are collected, which recovers the finished part of a truncated reply.
fn parse_extracted(raw: &str) -> Vec<Suggestion> {
    let mut loose = Vec::new();

    for block in extract::balanced_blocks(raw) {
        let Ok(value) = serde_json::from_str::<Value>(block) else {
            continue;
        };
        if is_suggestion_object(&value) {
            loose.extend(validate(vec![value]));
            continue;
        }
        if let Some(found) = entries(value).map(validate) {
            if !found.is_empty() {
                return found;
            }
        }
    }

    if !loose.is_empty() {
        tracing::debug!(count = loose.len(), "recovered loose suggestion objects");
    }
    loose
}

fn entries(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("suggestions") {
            Some(Value::Array(items)) => Some(items),
            Some(_) => None,
            None if prompt_field(&map).is_some() => Some(vec![Value::Object(map)]),
            None => None,
        },
        _ => None,
    }
}

fn is_suggestion_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| prompt_field(map).is_some())
}

fn prompt_field(map: &serde_json::Map<String, Value>) -> Option<&Value> {
    map.get("improved_prompt").or_else(|| map.get("improvedPrompt"))
}

/// Keep entries with a non-empty `improved_prompt`; default the rest.
fn validate(items: Vec<Value>) -> Vec<Suggestion> {
    items
        .into_iter()
        .filter_map(|item| {
            let map = item.as_object()?;
            let prompt = prompt_field(map)?.as_str()?;
            let category = map
                .get("category")
                .and_then(Value::as_str)
                .and_then(Category::from_tag)
                .unwrap_or(Category::General);
            let explanation = map.get("explanation").and_then(Value::as_str).unwrap_or("");
            let confidence = map.get("confidence").and_then(Value::as_f64);
            Suggestion::new(category, prompt, explanation, confidence, SuggestionSource::Model)
        })
        .collect()
}
