//! Per-tab session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::problem::Platform;
use crate::types::{ProblemId, SessionId, TabId};

/// Maximum retained code-history entries per session (oldest evicted first).
pub const MAX_CODE_HISTORY: usize = 20;

/// Capacity of the processed-submission dedup set.
pub const MAX_PROCESSED_SUBMISSIONS: usize = 50;

/// Entries kept (most recent) when the dedup set overflows.
pub const PROCESSED_SUBMISSIONS_KEEP: usize = 25;

/// Number of trailing code-history entries carried on the terminal event.
pub const CODE_EVOLUTION_TAIL: usize = 5;

/// Named activity counters, each monotonically increasing until session end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub runs: u64,
    pub submissions: u64,
    pub keystrokes: u64,
}

/// Line/char/word measurements of a code snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStats {
    pub lines: usize,
    pub chars: usize,
    pub words: usize,
}

impl CodeStats {
    /// Measures a code string.
    #[must_use]
    pub fn measure(code: &str) -> Self {
        Self {
            lines: code.split('\n').count(),
            chars: code.chars().count(),
            words: code.split_whitespace().count(),
        }
    }
}

/// A point-in-time code snapshot kept for post-mortem diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSnapshot {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CodeStats>,
    pub timestamp: i64,
}

/// The tracked lifetime of one tab's engagement with one coding problem.
///
/// Owned exclusively by the [`SessionRegistry`](crate::registry::SessionRegistry);
/// at most one live session exists per tab handle, and `problem_id` never
/// changes once set; navigating to a different problem ends the session.
#[derive(Debug, Clone)]
pub struct Session {
    pub tab: TabId,
    pub session_id: SessionId,
    pub problem_id: ProblemId,
    pub platform: Platform,
    pub url: String,
    /// Resolved asynchronously; placeholders never land here.
    pub problem_title: Option<String>,
    /// Whether `ProblemSessionStarted` has been emitted (deferred until a
    /// real title arrives).
    pub started_emitted: bool,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub last_submission_check: DateTime<Utc>,
    pub last_submit_click: Option<DateTime<Utc>>,
    /// Accumulated focused-and-non-idle milliseconds.
    pub active_ms: i64,
    pub focused: bool,
    pub is_active: bool,
    pub counters: Counters,
    pub current_code: Option<String>,
    pub current_language: Option<String>,
    code_history: Vec<CodeSnapshot>,
    /// `problem:submission` composite keys already reported, most recent last.
    processed_submissions: Vec<String>,
}

impl Session {
    /// Creates a fresh session for a tab pointed at a problem page.
    #[must_use]
    pub fn new(tab: TabId, problem_id: ProblemId, url: &str, now: DateTime<Utc>) -> Self {
        Self {
            tab,
            session_id: SessionId::random(),
            problem_id,
            platform: Platform::from_url(url),
            url: url.to_string(),
            problem_title: None,
            started_emitted: false,
            start_time: now,
            last_activity: now,
            last_heartbeat: now,
            last_submission_check: now,
            last_submit_click: None,
            active_ms: 0,
            focused: true,
            is_active: true,
            counters: Counters::default(),
            current_code: None,
            current_language: None,
            code_history: Vec::new(),
            processed_submissions: Vec::new(),
        }
    }

    /// Wall-clock milliseconds elapsed since the session started.
    #[must_use]
    pub fn wall_clock_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_time).num_milliseconds().max(0)
    }

    /// Updates the latest code/language snapshot without touching history.
    pub fn update_snapshot(&mut self, code: Option<&str>, language: Option<&str>) {
        if let Some(code) = code {
            self.current_code = Some(code.to_string());
        }
        if let Some(language) = language {
            self.current_language = Some(language.to_string());
        }
    }

    /// Records code carried on an activity ping.
    ///
    /// Updates the snapshot when the code differs from the stored one; a
    /// differing snapshot flagged significant is also appended to the bounded
    /// code history. Returns whether the code changed.
    pub fn record_activity_code(
        &mut self,
        code: &str,
        language: Option<&str>,
        stats: Option<CodeStats>,
        significant: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let changed = self.current_code.as_deref() != Some(code);
        self.update_snapshot(Some(code), language);
        if changed && significant {
            self.code_history.push(CodeSnapshot {
                code: code.to_string(),
                language: language.map(str::to_string),
                stats,
                timestamp: now.timestamp_millis(),
            });
            if self.code_history.len() > MAX_CODE_HISTORY {
                let excess = self.code_history.len() - MAX_CODE_HISTORY;
                self.code_history.drain(..excess);
            }
        }
        changed
    }

    /// The retained code history, oldest first.
    #[must_use]
    pub fn code_history(&self) -> &[CodeSnapshot] {
        &self.code_history
    }

    /// The trailing history entries included in the terminal event.
    #[must_use]
    pub fn code_evolution(&self) -> &[CodeSnapshot] {
        let start = self.code_history.len().saturating_sub(CODE_EVOLUTION_TAIL);
        &self.code_history[start..]
    }

    /// Records a submission id as reported, deduplicating repeats.
    ///
    /// Returns `true` when the `(problem, submission)` key is new; exactly
    /// one caller per key ever sees `true`. Overflow trims the set to the
    /// most recent [`PROCESSED_SUBMISSIONS_KEEP`] keys.
    pub fn mark_submission_processed(&mut self, submission_id: &str) -> bool {
        let key = format!("{}:{submission_id}", self.problem_id);
        if self.processed_submissions.contains(&key) {
            return false;
        }
        self.processed_submissions.push(key);
        if self.processed_submissions.len() > MAX_PROCESSED_SUBMISSIONS {
            let excess = self.processed_submissions.len() - PROCESSED_SUBMISSIONS_KEEP;
            self.processed_submissions.drain(..excess);
        }
        true
    }

    /// Number of submission keys currently held for dedup.
    #[must_use]
    pub fn processed_submission_count(&self) -> usize {
        self.processed_submissions.len()
    }
}
