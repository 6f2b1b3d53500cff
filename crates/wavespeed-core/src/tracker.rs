//! Append-only prompt feedback log.
//!
//! Every user action on a prompt (generated, saved, deleted, rated) becomes
//! one JSON line in `prompt_events.jsonl`. `prompt_stats.json` is derived from
//! that log and can be deleted at any time. Appends fold the new event into
//! it; a cache that no longer matches the log is rebuilt on the next read.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{write_atomic, Target};

pub const EVENTS_FILE: &str = "prompt_events.jsonl";
pub const STATS_FILE: &str = "prompt_stats.json";

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("feedback log I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("feedback record could not be encoded: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Generated,
    Saved,
    Deleted,
    FeedbackGood,
    FeedbackBad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Good,
    Bad,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEvent {
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
    /// Original text as typed. Matching uses [`normalize_prompt`].
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_reference: Option<String>,
}

impl FeedbackEvent {
    pub fn new(event: EventKind, prompt: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            prompt: prompt.into(),
            target: None,
            image_description: None,
            result_reference: None,
        }
    }
}

/// Aggregates for one normalized prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptStats {
    /// Most recently seen original spelling.
    pub prompt: String,
    pub normalized: String,
    pub generations: u32,
    pub saves: u32,
    pub deletions: u32,
    pub good: u32,
    pub bad: u32,
    /// `None` when the prompt has no success or failure signal yet.
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl PromptStats {
    fn empty(prompt: &str) -> Self {
        Self {
            prompt: prompt.trim().to_string(),
            normalized: normalize_prompt(prompt),
            generations: 0,
            saves: 0,
            deletions: 0,
            good: 0,
            bad: 0,
            success_rate: None,
            last_seen: None,
        }
    }

    pub fn successes(&self) -> u32 {
        self.saves + self.good
    }

    pub fn failures(&self) -> u32 {
        self.deletions + self.bad
    }

    fn record(&mut self, event: &FeedbackEvent) {
        match event.event {
            EventKind::Generated => self.generations += 1,
            EventKind::Saved => self.saves += 1,
            EventKind::Deleted => self.deletions += 1,
            EventKind::FeedbackGood => self.good += 1,
            EventKind::FeedbackBad => self.bad += 1,
        }
        if self.last_seen.map_or(true, |seen| event.timestamp >= seen) {
            self.last_seen = Some(event.timestamp);
            self.prompt = event.prompt.trim().to_string();
        }
        let signals = self.successes() + self.failures();
        self.success_rate = (signals > 0).then(|| f64::from(self.successes()) / f64::from(signals));
    }
}

/// Contents of `prompt_stats.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub generated_at: Option<DateTime<Utc>>,
    pub total_events: usize,
    /// Length of the event log this snapshot accounts for.
    #[serde(default)]
    pub log_bytes: u64,
    pub prompts: Vec<PromptStats>,
}

/// Trim and case-fold. Used for matching only; stored records keep the original text.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.trim().to_lowercase()
}

/// Owns the event log and the derived stats file. Appends are serialized by
/// one writer lock held for the whole record write and stats refresh.
pub struct FeedbackTracker {
    events_path: PathBuf,
    stats_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackTracker {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            events_path: dir.join(EVENTS_FILE),
            stats_path: dir.join(STATS_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }

    pub fn track_generation(
        &self,
        prompt: &str,
        target: Option<Target>,
        image_description: Option<&str>,
    ) -> Result<FeedbackEvent, TrackerError> {
        let mut event = FeedbackEvent::new(EventKind::Generated, prompt);
        event.target = target;
        event.image_description = image_description.map(str::to_string);
        self.append(event)
    }

    pub fn track_result_saved(
        &self,
        prompt: &str,
        result_reference: Option<&str>,
    ) -> Result<FeedbackEvent, TrackerError> {
        let mut event = FeedbackEvent::new(EventKind::Saved, prompt);
        event.result_reference = result_reference.map(str::to_string);
        self.append(event)
    }

    pub fn track_result_deleted(
        &self,
        prompt: &str,
        result_reference: Option<&str>,
    ) -> Result<FeedbackEvent, TrackerError> {
        let mut event = FeedbackEvent::new(EventKind::Deleted, prompt);
        event.result_reference = result_reference.map(str::to_string);
        self.append(event)
    }

    pub fn track_feedback(&self, prompt: &str, rating: Rating) -> Result<FeedbackEvent, TrackerError> {
        let kind = match rating {
            Rating::Good => EventKind::FeedbackGood,
            Rating::Bad => EventKind::FeedbackBad,
        };
        self.append(FeedbackEvent::new(kind, prompt))
    }

    /// Append one complete, newline-terminated record, then fold it into the
    /// stats cache. The log is never replayed here.
    pub fn append(&self, event: FeedbackEvent) -> Result<FeedbackEvent, TrackerError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.events_path)?;
        let log_before = file.metadata()?.len();
        // A killed writer can leave a partial last line; start on a fresh one.
        if !ends_with_newline(&mut file)? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())?;
        file.flush()?;
        drop(file);
        let log_after = log_before + line.len() as u64;

        tracing::debug!(event = ?event.event, path = %self.events_path.display(), "feedback event appended");

        // The log is already durable; a cache that cannot be updated is rebuilt on the next read.
        if let Err(e) = self.fold_into_snapshot(&event, log_before, log_after) {
            tracing::warn!(error = %e, "failed to refresh prompt stats");
        }
        Ok(event)
    }

    /// Replay the log. Lines that do not decode (e.g. a torn tail) are skipped.
    pub fn read_events(&self) -> Result<Vec<FeedbackEvent>, TrackerError> {
        let file = match fs::File::open(&self.events_path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping unreadable feedback record"),
            }
        }
        Ok(events)
    }

    /// Aggregates for one prompt. Zero counts and no rate when it was never seen.
    pub fn get_prompt_stats(&self, prompt: &str) -> Result<PromptStats, TrackerError> {
        let normalized = normalize_prompt(prompt);
        let snapshot = self.read_stats_snapshot()?;
        Ok(snapshot
            .prompts
            .into_iter()
            .find(|s| s.normalized == normalized)
            .unwrap_or_else(|| PromptStats::empty(prompt)))
    }

    /// Prompts whose success rate is at least `min_rate`, best first. Prompts
    /// without any signal never qualify.
    pub fn get_successful_prompts(&self, min_rate: f64) -> Result<Vec<PromptStats>, TrackerError> {
        let mut prompts: Vec<PromptStats> = self
            .read_stats_snapshot()?
            .prompts
            .into_iter()
            .filter(|s| s.success_rate.is_some_and(|rate| rate >= min_rate))
            .collect();
        prompts.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (b.successes() + b.failures()).cmp(&(a.successes() + a.failures())))
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        Ok(prompts)
    }

    /// Rebuild `prompt_stats.json` from the log.
    pub fn rebuild_stats(&self) -> Result<StatsSnapshot, TrackerError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_snapshot()
    }

    /// Read the stats cache. A cache that is missing, unreadable, or does not
    /// cover the log as it is on disk now is rebuilt from the log.
    pub fn read_stats_snapshot(&self) -> Result<StatsSnapshot, TrackerError> {
        let log_len = self.log_len()?;
        match self.load_snapshot() {
            Some(snapshot) if snapshot.log_bytes == log_len => Ok(snapshot),
            Some(_) => {
                tracing::debug!(path = %self.stats_path.display(), "prompt stats behind the log, rebuilding");
                self.rebuild_stats()
            }
            None => self.rebuild_stats(),
        }
    }

    fn log_len(&self) -> Result<u64, TrackerError> {
        match fs::metadata(&self.events_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn load_snapshot(&self) -> Option<StatsSnapshot> {
        let raw = fs::read_to_string(&self.stats_path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Caller must hold `write_lock`. Updates the cache in place when it covers
    /// exactly the log up to `log_before`; otherwise drops it for a lazy rebuild.
    fn fold_into_snapshot(
        &self,
        event: &FeedbackEvent,
        log_before: u64,
        log_after: u64,
    ) -> Result<(), TrackerError> {
        let current = match self.load_snapshot() {
            Some(snapshot) if snapshot.log_bytes == log_before => Some(snapshot),
            None if log_before == 0 => Some(StatsSnapshot::default()),
            _ => None,
        };
        let Some(mut snapshot) = current else {
            return match fs::remove_file(&self.stats_path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        };

        let normalized = normalize_prompt(&event.prompt);
        if !normalized.is_empty() {
            match snapshot.prompts.binary_search_by(|s| s.normalized.cmp(&normalized)) {
                Ok(i) => snapshot.prompts[i].record(event),
                Err(i) => {
                    let mut stats = PromptStats::empty(&event.prompt);
                    stats.record(event);
                    snapshot.prompts.insert(i, stats);
                }
            }
        }
        snapshot.total_events += 1;
        snapshot.log_bytes = log_after;
        snapshot.generated_at = Some(Utc::now());
        self.store_snapshot(&snapshot)
    }

    /// Caller must hold `write_lock`.
    fn write_snapshot(&self) -> Result<StatsSnapshot, TrackerError> {
        let log_bytes = self.log_len()?;
        let events = self.read_events()?;
        let mut prompts = aggregate(&events);
        prompts.sort_by(|a, b| a.normalized.cmp(&b.normalized));
        let snapshot = StatsSnapshot {
            generated_at: Some(Utc::now()),
            total_events: events.len(),
            log_bytes,
            prompts,
        };
        self.store_snapshot(&snapshot)?;
        Ok(snapshot)
    }

    fn store_snapshot(&self, snapshot: &StatsSnapshot) -> Result<(), TrackerError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.stats_path, &json)?;
        Ok(())
    }
}

fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn aggregate(events: &[FeedbackEvent]) -> Vec<PromptStats> {
    let mut by_prompt: HashMap<String, PromptStats> = HashMap::new();
    for event in events {
        let key = normalize_prompt(&event.prompt);
        if key.is_empty() {
            continue;
        }
        by_prompt
            .entry(key)
            .or_insert_with(|| PromptStats::empty(&event.prompt))
            .record(event);
    }
    by_prompt.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (tempfile::TempDir, FeedbackTracker) {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FeedbackTracker::open(dir.path()).unwrap();
        (dir, tracker)
    }

    #[test]
    fn saved_and_deleted_give_half_success() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("A red fox", Some("out/1.png")).unwrap();
        tracker.track_result_deleted("a red fox  ", Some("out/2.png")).unwrap();

        let stats = tracker.get_prompt_stats("A RED FOX").unwrap();
        assert_eq!(stats.success_rate, Some(0.5));
        assert_eq!(stats.saves, 1);
        assert_eq!(stats.deletions, 1);
    }

    #[test]
    fn no_events_means_no_data_not_zero() {
        let (_dir, tracker) = tracker();
        let stats = tracker.get_prompt_stats("never seen").unwrap();
        assert_eq!(stats.success_rate, None);

        tracker.track_generation("generated only", None, None).unwrap();
        let stats = tracker.get_prompt_stats("generated only").unwrap();
        assert_eq!(stats.generations, 1);
        assert_eq!(stats.success_rate, None);
    }

    #[test]
    fn bad_feedback_counts_as_failure() {
        let (_dir, tracker) = tracker();
        tracker.track_feedback("moody forest", Rating::Bad).unwrap();
        let stats = tracker.get_prompt_stats("moody forest").unwrap();
        assert_eq!(stats.success_rate, Some(0.0));
    }

    #[test]
    fn original_text_is_preserved_in_the_log() {
        let (_dir, tracker) = tracker();
        tracker
            .track_generation("  Neon City AT Night ", Some(Target::SeedreamV4), Some("a dark street"))
            .unwrap();
        let events = tracker.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prompt, "  Neon City AT Night ");
        assert_eq!(events[0].target, Some(Target::SeedreamV4));
        assert_eq!(events[0].image_description.as_deref(), Some("a dark street"));
    }

    #[test]
    fn successful_prompts_are_filtered_and_ranked() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("great", None).unwrap();
        tracker.track_feedback("great", Rating::Good).unwrap();
        tracker.track_result_saved("okay", None).unwrap();
        tracker.track_result_deleted("okay", None).unwrap();
        tracker.track_result_deleted("poor", None).unwrap();
        tracker.track_generation("unrated", None, None).unwrap();

        let prompts = tracker.get_successful_prompts(0.5).unwrap();
        let names: Vec<&str> = prompts.iter().map(|p| p.prompt.as_str()).collect();
        assert_eq!(names, vec!["great", "okay"]);
    }

    #[test]
    fn torn_tail_is_skipped() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("kept", None).unwrap();
        let mut file = OpenOptions::new().append(true).open(tracker.events_path()).unwrap();
        file.write_all(b"{\"timestamp\":\"2026-01-").unwrap();

        let events = tracker.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prompt, "kept");
    }

    #[test]
    fn append_after_torn_tail_starts_a_new_line() {
        let (_dir, tracker) = tracker();
        fs::write(tracker.events_path(), "{\"timestamp\":").unwrap();
        tracker.track_result_saved("after crash", None).unwrap();

        let events = tracker.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prompt, "after crash");
    }

    #[test]
    fn stats_file_is_rebuilt_when_missing() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("lantern", None).unwrap();
        assert!(tracker.stats_path().exists());

        fs::remove_file(tracker.stats_path()).unwrap();
        let snapshot = tracker.read_stats_snapshot().unwrap();
        assert_eq!(snapshot.total_events, 1);
        assert_eq!(snapshot.prompts[0].success_rate, Some(1.0));
        assert!(tracker.stats_path().exists());
    }

    #[test]
    fn append_updates_the_cache_without_replaying_the_log() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("Harbor", None).unwrap();
        tracker.track_feedback("harbor ", Rating::Bad).unwrap();
        tracker.track_generation("lighthouse", None, None).unwrap();

        let raw = fs::read_to_string(tracker.stats_path()).unwrap();
        let cached: StatsSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(cached.total_events, 3);
        assert_eq!(cached.log_bytes, fs::metadata(tracker.events_path()).unwrap().len());

        let rebuilt = tracker.rebuild_stats().unwrap();
        assert_eq!(cached.prompts, rebuilt.prompts);
        assert_eq!(cached.log_bytes, rebuilt.log_bytes);
    }

    #[test]
    fn deleted_cache_is_not_rebuilt_on_append_but_converges_on_read() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("lantern", None).unwrap();
        fs::remove_file(tracker.stats_path()).unwrap();

        tracker.track_result_deleted("lantern", None).unwrap();
        assert!(!tracker.stats_path().exists());

        let snapshot = tracker.read_stats_snapshot().unwrap();
        assert_eq!(snapshot.total_events, 2);
        assert_eq!(snapshot.prompts[0].success_rate, Some(0.5));

        tracker.track_feedback("lantern", Rating::Good).unwrap();
        let stats = tracker.get_prompt_stats("lantern").unwrap();
        assert_eq!(stats.successes(), 2);
        assert_eq!(stats.failures(), 1);
    }

    #[test]
    fn cache_behind_the_log_is_rebuilt() {
        let (_dir, tracker) = tracker();
        tracker.track_result_saved("lantern", None).unwrap();

        // Another process appended without touching the cache.
        let foreign = FeedbackEvent::new(EventKind::Deleted, "lantern");
        let mut file = OpenOptions::new().append(true).open(tracker.events_path()).unwrap();
        writeln!(file, "{}", serde_json::to_string(&foreign).unwrap()).unwrap();
        drop(file);

        let stats = tracker.get_prompt_stats("lantern").unwrap();
        assert_eq!(stats.deletions, 1);
        assert_eq!(stats.success_rate, Some(0.5));

        // The cache was rebuilt above, so this append folds in again.
        tracker.track_result_saved("lantern", None).unwrap();
        let snapshot = tracker.read_stats_snapshot().unwrap();
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.prompts[0].saves, 2);
    }

    #[test]
    fn corrupt_stats_file_is_replaced() {
        let (_dir, tracker) = tracker();
        tracker.track_feedback("lantern", Rating::Good).unwrap();
        fs::write(tracker.stats_path(), "{not json").unwrap();

        let snapshot = tracker.read_stats_snapshot().unwrap();
        assert_eq!(snapshot.prompts.len(), 1);
    }
}
