//! Domain events emitted to the collector.
//!
//! Event payloads follow the collector's wire format: camelCase field names
//! under a `data` object, tagged by an `eventType` string. The enum is the
//! single source of truth for the taxonomy:
//! `ProblemSessionStarted`, `ProblemProgress` (heartbeat or click-tagged),
//! `ProblemSubmitted`, `ProblemSessionEnded`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::problem::Platform;
use crate::registry::EndReason;
use crate::session::{CodeSnapshot, CodeStats, Counters, Session};
use crate::types::{ProblemId, SessionId};

/// A lifecycle event for one session, ready for delivery.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    SessionStarted(SessionStartedData),
    Progress(ProgressData),
    Submitted(SubmittedData),
    SessionEnded(SessionEndedData),
}

/// What a `ProblemProgress` event was triggered by. Heartbeats carry no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTrigger {
    RunClicked,
    SubmitClicked,
}

impl ProgressTrigger {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RunClicked => "run_clicked",
            Self::SubmitClicked => "submit_clicked",
        }
    }
}

/// Payload of `ProblemSessionStarted`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedData {
    pub user_id: String,
    pub session_id: SessionId,
    pub platform: Platform,
    pub problem_id: ProblemId,
    pub problem_title: Option<String>,
    pub problem_url: String,
    pub timestamp: i64,
}

/// Payload of `ProblemProgress`: a heartbeat or a run/submit click.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub user_id: String,
    pub session_id: SessionId,
    pub platform: Platform,
    pub problem_id: ProblemId,
    #[serde(rename = "event", skip_serializing_if = "Option::is_none")]
    pub trigger: Option<ProgressTrigger>,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_clock_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_stats: Option<CodeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timestamp: i64,
}

/// Payload of `ProblemSubmitted`.
///
/// `timestamp` is the external feed's original submission timestamp, passed
/// through verbatim, not the time the poll observed it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedData {
    pub user_id: String,
    pub session_id: SessionId,
    pub platform: Platform,
    pub problem_id: ProblemId,
    pub problem_title: Option<String>,
    pub verdict: Option<String>,
    pub runtime: Option<String>,
    pub memory: Option<String>,
    pub language: Option<String>,
    pub submission_id: String,
    pub timestamp: String,
    pub code: Option<String>,
}

/// Payload of `ProblemSessionEnded`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedData {
    pub user_id: String,
    pub session_id: SessionId,
    pub platform: Platform,
    pub problem_id: ProblemId,
    pub total_wall_time: i64,
    pub active_ms: i64,
    pub counters: Counters,
    pub final_code: Option<String>,
    pub final_language: Option<String>,
    pub code_evolution: Vec<CodeSnapshot>,
    pub reason: EndReason,
    pub timestamp: i64,
}

/// A matched external submission, as reported by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub submission_id: String,
    pub verdict: Option<String>,
    pub runtime: Option<String>,
    pub memory: Option<String>,
    pub language: Option<String>,
    /// Original external timestamp, passed through verbatim.
    pub timestamp: String,
}

impl DomainEvent {
    /// The `eventType` tag delivered alongside the payload.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => "ProblemSessionStarted",
            Self::Progress(_) => "ProblemProgress",
            Self::Submitted(_) => "ProblemSubmitted",
            Self::SessionEnded(_) => "ProblemSessionEnded",
        }
    }

    /// Serializes the payload data object.
    pub fn data(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Builds the start event. Callers only do this once a real title is
    /// known; placeholder titles defer emission.
    #[must_use]
    pub fn session_started(user_id: &str, session: &Session, now: DateTime<Utc>) -> Self {
        Self::SessionStarted(SessionStartedData {
            user_id: user_id.to_string(),
            session_id: session.session_id.clone(),
            platform: session.platform,
            problem_id: session.problem_id.clone(),
            problem_title: session.problem_title.clone(),
            problem_url: session.url.clone(),
            timestamp: now.timestamp_millis(),
        })
    }

    /// Builds a heartbeat progress event with the full activity snapshot.
    #[must_use]
    pub fn heartbeat(user_id: &str, session: &Session, now: DateTime<Utc>) -> Self {
        Self::Progress(ProgressData {
            user_id: user_id.to_string(),
            session_id: session.session_id.clone(),
            platform: session.platform,
            problem_id: session.problem_id.clone(),
            trigger: None,
            counters: session.counters,
            active_ms: Some(session.active_ms),
            wall_clock_ms: Some(session.wall_clock_ms(now)),
            focused: Some(session.focused),
            current_code: session.current_code.clone(),
            current_language: session.current_language.clone(),
            code_stats: session.current_code.as_deref().map(CodeStats::measure),
            code: None,
            language: None,
            timestamp: now.timestamp_millis(),
        })
    }

    /// Builds a click-tagged progress event.
    #[must_use]
    pub fn progress_click(
        user_id: &str,
        session: &Session,
        trigger: ProgressTrigger,
        now: DateTime<Utc>,
    ) -> Self {
        Self::Progress(ProgressData {
            user_id: user_id.to_string(),
            session_id: session.session_id.clone(),
            platform: session.platform,
            problem_id: session.problem_id.clone(),
            trigger: Some(trigger),
            counters: session.counters,
            active_ms: None,
            wall_clock_ms: None,
            focused: None,
            current_code: None,
            current_language: None,
            code_stats: None,
            code: session.current_code.clone(),
            language: session.current_language.clone(),
            timestamp: now.timestamp_millis(),
        })
    }

    /// Builds the submitted event for a newly-matched external submission.
    #[must_use]
    pub fn submitted(user_id: &str, session: &Session, outcome: SubmissionOutcome) -> Self {
        Self::Submitted(SubmittedData {
            user_id: user_id.to_string(),
            session_id: session.session_id.clone(),
            platform: session.platform,
            problem_id: session.problem_id.clone(),
            problem_title: session.problem_title.clone(),
            verdict: outcome.verdict,
            runtime: outcome.runtime,
            memory: outcome.memory,
            language: outcome.language,
            submission_id: outcome.submission_id,
            timestamp: outcome.timestamp,
            code: session.current_code.clone(),
        })
    }

    /// Builds the terminal event. Callers flush active time first.
    #[must_use]
    pub fn session_ended(
        user_id: &str,
        session: &Session,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Self {
        Self::SessionEnded(SessionEndedData {
            user_id: user_id.to_string(),
            session_id: session.session_id.clone(),
            platform: session.platform,
            problem_id: session.problem_id.clone(),
            total_wall_time: session.wall_clock_ms(now),
            active_ms: session.active_ms,
            counters: session.counters,
            final_code: session.current_code.clone(),
            final_language: session.current_language.clone(),
            code_evolution: session.code_evolution().to_vec(),
            reason,
            timestamp: now.timestamp_millis(),
        })
    }
}
