//! Request-to-panel flow: dispatcher worker, reply queue, UI-side panel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wavespeed_core::tracker::{FeedbackTracker, Rating};
use wavespeed_core::{AdvisorRequest, AdvisorSettings, Mode, ProviderKind, Target};
use wavespeed_lib::{AppState, Availability, Dispatcher, PromptField, SuggestionPanel};
use wavespeed_suggest::{Advisor, AdvisorError, ChatProvider, Composer, ProviderError, ProviderResult};

struct PanickingProvider;

#[async_trait]
impl ChatProvider for PanickingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        "panicking"
    }

    async fn complete(&self, _system: &str, _user_msg: &str) -> Result<ProviderResult, ProviderError> {
        panic!("provider bug");
    }
}

/// Replies with the canned text whose key appears in the user message.
struct ScriptedProvider {
    replies: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, user_msg: &str) -> Result<ProviderResult, ProviderError> {
        let text = self
            .replies
            .iter()
            .find(|(key, _)| user_msg.contains(key))
            .map(|(_, reply)| *reply)
            .unwrap_or("");
        Ok(ProviderResult::completed(text, Some("end_turn".into())))
    }
}

fn advisor(replies: Vec<(&'static str, &'static str)>) -> Arc<Advisor> {
    let provider: Arc<dyn ChatProvider> = Arc::new(ScriptedProvider { replies });
    Arc::new(Advisor::new(
        Composer::builtin(),
        vec![provider],
        Duration::from_secs(5),
    ))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn professional_look_suggestion_reaches_the_panel() {
    let rt = runtime();
    let advisor = advisor(vec![(
        "make it look professional",
        r#"{"suggestions":[{"category":"clarity","improved_prompt":"Make the subject's attire appear formal business wear with neutral studio lighting","confidence":0.92}]}"#,
    )]);
    let (dispatcher, mut replies) = Dispatcher::new(advisor, rt.handle().clone());

    let target = Target::from_name("Nano Banana Editor").unwrap();
    let mut panel = SuggestionPanel::new(target, Availability::Available);
    let mut field = PromptField::new("make it look professional");

    let token = panel.begin_request().unwrap();
    assert!(panel.is_loading());
    dispatcher.submit(token, AdvisorRequest::new(target, field.text()).with_mode(Mode::Normal));

    let reply = replies.blocking_recv().unwrap();
    assert!(panel.accept(reply));

    let rows = panel.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].prompt,
        "Make the subject's attire appear formal business wear with neutral studio lighting"
    );
    assert_eq!(rows[0].confidence, "92%");
    assert_eq!(rows[0].category, "clarity");
    assert!(!rows[0].fallback);

    field.apply(panel.select(1).unwrap());
    assert_eq!(field.text(), rows[0].prompt);
}

#[test]
fn superseded_request_is_ignored_by_the_panel() {
    let rt = runtime();
    let advisor = advisor(vec![
        ("first draft", r#"[{"improved_prompt":"old answer","confidence":0.9}]"#),
        ("second draft", r#"[{"improved_prompt":"new answer","confidence":0.8}]"#),
    ]);
    let (dispatcher, mut replies) = Dispatcher::new(advisor, rt.handle().clone());
    let mut panel = SuggestionPanel::new(Target::SeedreamV4, Availability::Available);

    let first = panel.begin_request().unwrap();
    dispatcher.submit(first, AdvisorRequest::new(Target::SeedreamV4, "first draft"));
    let second = panel.begin_request().unwrap();
    dispatcher.submit(second, AdvisorRequest::new(Target::SeedreamV4, "second draft"));

    let mut accepted = 0;
    for _ in 0..2 {
        if panel.accept(replies.blocking_recv().unwrap()) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(panel.select(1).unwrap().improved_prompt(), "new answer");
}

#[test]
fn unreadable_reply_shows_built_in_tips() {
    let rt = runtime();
    let advisor = advisor(vec![("anything", "I would suggest adding more light.")]);
    let (dispatcher, mut replies) = Dispatcher::new(advisor, rt.handle().clone());
    let mut panel = SuggestionPanel::new(Target::Wan22, Availability::Available);

    let token = panel.begin_request().unwrap();
    dispatcher.submit(token, AdvisorRequest::new(Target::Wan22, "anything"));
    assert!(panel.accept(replies.blocking_recv().unwrap()));

    assert!(!panel.rows().is_empty());
    assert!(panel.rows().iter().all(|r| r.fallback));
    assert!(panel.status_line().contains("built-in tips"));
}

#[test]
fn app_state_without_keys_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Arc::new(FeedbackTracker::open(dir.path()).unwrap());
    let settings = AdvisorSettings::default();
    let advisor = Arc::new(Advisor::from_settings(&settings));
    let state = AppState::new(settings, advisor, tracker);

    let panel = SuggestionPanel::new(Target::SeedEdit, state.availability());
    assert!(!panel.is_enabled());
    assert!(panel.status_line().contains("No API keys configured"));
    assert_eq!(state.ai_settings_view()["configured"], false);
}

#[test]
fn build_request_uses_successful_prompts_as_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Arc::new(FeedbackTracker::open(dir.path()).unwrap());
    tracker.track_result_saved("golden hour street portrait", None).unwrap();
    tracker.track_feedback("golden hour street portrait", Rating::Good).unwrap();
    tracker.track_result_deleted("blurry night scene", None).unwrap();
    tracker.track_generation("untested idea", None, None).unwrap();

    let state = AppState::new(AdvisorSettings::default(), advisor(vec![]), tracker);
    let request = state.build_request(
        Target::SeedreamV4,
        "a portrait",
        Mode::Normal,
        Some("   ".into()),
        2,
    );

    assert_eq!(
        request.context.prior_successful_patterns,
        vec!["golden hour street portrait".to_string()]
    );
    assert_eq!(request.context.image_description, None);
    assert_eq!(request.suggestion_count, 2);
}

#[test]
fn panicking_worker_still_answers_the_panel() {
    let rt = runtime();
    let _guard = rt.enter();
    let provider: Arc<dyn ChatProvider> = Arc::new(PanickingProvider);
    let advisor = Arc::new(Advisor::new(
        Composer::builtin(),
        vec![provider],
        Duration::from_secs(5),
    ));
    let (dispatcher, mut replies) = Dispatcher::new(advisor, rt.handle().clone());
    let mut panel = SuggestionPanel::new(Target::SeedEdit, Availability::Available);

    let token = panel.begin_request().unwrap();
    dispatcher.submit(token, AdvisorRequest::new(Target::SeedEdit, "make it red"));
    drop(dispatcher);

    let reply = rt
        .block_on(tokio::time::timeout(Duration::from_secs(3), replies.recv()))
        .expect("a reply arrives")
        .expect("queue still open for the reply");
    assert!(matches!(reply.outcome, Err(AdvisorError::Interrupted(_))));
    assert!(panel.accept(reply));

    assert!(!panel.is_loading());
    assert!(panel.rows().iter().all(|r| r.fallback));
    assert!(panel.status_line().contains("stopped unexpectedly"));

    // With the dispatcher gone and the worker done, the queue closes.
    let closed = rt.block_on(tokio::time::timeout(Duration::from_secs(3), replies.recv()));
    assert!(matches!(closed, Ok(None)));
}

#[test]
fn save_primary_keeps_environment_values_out_of_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut on_disk = AdvisorSettings::default();
    on_disk.openai_model = "gpt-from-file".into();
    wavespeed_core::write_settings_to(dir.path(), &on_disk).unwrap();

    let tracker = Arc::new(FeedbackTracker::open(dir.path()).unwrap());
    let mut effective = wavespeed_core::read_settings_from(dir.path());
    effective.claude_model = "claude-from-env".into();
    effective.timeout_secs = 5;
    let state = AppState::new(effective, advisor(vec![]), tracker);

    state.save_primary(dir.path(), ProviderKind::OpenAi).unwrap();

    let stored = wavespeed_core::read_settings_from(dir.path());
    assert_eq!(stored.primary, ProviderKind::OpenAi);
    assert_eq!(stored.openai_model, "gpt-from-file");
    assert_eq!(stored.claude_model, AdvisorSettings::default().claude_model);
    assert_eq!(stored.timeout_secs, AdvisorSettings::default().timeout_secs);
    assert_eq!(state.settings().claude_model, "claude-from-env");
}

#[test]
fn save_primary_persists_without_keys() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Arc::new(FeedbackTracker::open(dir.path()).unwrap());
    let mut settings = AdvisorSettings::default();
    settings.claude_api_key = Some("ant-secret".into());
    let state = AppState::new(settings, advisor(vec![]), tracker);

    state.save_primary(dir.path(), ProviderKind::OpenAi).unwrap();

    let raw = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
    assert!(!raw.contains("ant-secret"));
    assert_eq!(wavespeed_core::read_settings_from(dir.path()).primary, ProviderKind::OpenAi);
    assert_eq!(state.settings().primary, ProviderKind::OpenAi);
}
