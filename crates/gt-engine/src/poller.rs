//! Submission feed polling with per-session deduplication.
//!
//! The external feed lags the judge, so the same submission can be observed
//! by many polls (periodic and post-submit bursts). Matching is by exact
//! slug equality against the session's problem; the session's bounded dedup
//! set guarantees each `(problem, submission)` key is reported exactly once
//! no matter how many polls see it.

use gt_core::event::{DomainEvent, SubmissionOutcome};
use gt_core::problem::slugify_title;
use gt_core::session::Session;
use gt_core::settings::Settings;
use gt_feed::{FeedError, Submission};

/// How many recent submissions each poll requests.
pub const DEFAULT_FETCH_LIMIT: usize = 15;

/// Source of recent external submissions.
///
/// A trait so matching and dedup are testable with scripted feeds; the real
/// implementation is [`gt_feed::Client`].
#[allow(async_fn_in_trait)]
pub trait SubmissionFeed {
    async fn recent(&self, username: &str, limit: usize) -> Result<Vec<Submission>, FeedError>;
}

impl SubmissionFeed for gt_feed::Client {
    async fn recent(&self, username: &str, limit: usize) -> Result<Vec<Submission>, FeedError> {
        self.fetch_recent(username, limit).await
    }
}

/// Polls the feed for a configured user and matches results to sessions.
#[derive(Debug)]
pub struct SubmissionPoller<F> {
    feed: F,
    username: Option<String>,
    limit: usize,
}

impl<F: SubmissionFeed> SubmissionPoller<F> {
    #[must_use]
    pub fn new(feed: F, settings: &Settings) -> Self {
        Self {
            feed,
            username: settings.username().map(str::to_string),
            limit: DEFAULT_FETCH_LIMIT,
        }
    }

    /// Picks up runtime settings changes (username).
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.username = settings.username().map(str::to_string);
    }

    /// The configured feed username, if any. Polling is disabled without one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Fetches the most recent submissions for the configured user.
    ///
    /// A transient feed failure (or no configured user) yields zero
    /// submissions: logged, never raised, so the poll loop cannot crash and
    /// dedup state stays untouched.
    pub async fn fetch(&self) -> Vec<Submission> {
        let Some(username) = self.username.as_deref() else {
            return Vec::new();
        };
        match self.feed.recent(username, self.limit).await {
            Ok(submissions) => submissions,
            Err(err) => {
                tracing::warn!(error = %err, "submission feed fetch failed, treating as empty");
                Vec::new()
            }
        }
    }
}

/// Matches fetched submissions against a session's problem, deduplicating
/// against already-reported ids.
///
/// Returns one `ProblemSubmitted` event per newly-seen match, in feed order,
/// each carrying the feed's original timestamp.
pub fn match_submissions(
    user_id: &str,
    session: &mut Session,
    submissions: &[Submission],
) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    for submission in submissions {
        if slugify_title(&submission.title) != session.problem_id.as_str() {
            continue;
        }
        if !session.mark_submission_processed(&submission.id) {
            continue;
        }
        tracing::debug!(
            problem = %session.problem_id,
            submission = %submission.id,
            verdict = submission.status_display.as_deref().unwrap_or("unknown"),
            "new submission matched"
        );
        events.push(DomainEvent::submitted(
            user_id,
            session,
            SubmissionOutcome {
                submission_id: submission.id.clone(),
                verdict: submission.status_display.clone(),
                runtime: submission.runtime.clone(),
                memory: submission.memory.clone(),
                language: submission.lang.clone(),
                timestamp: submission.timestamp.clone(),
            },
        ));
    }
    events
}

#[cfg(test)]
impl<F> SubmissionPoller<F> {
    pub(crate) fn feed_ref(&self) -> &F {
        &self.feed
    }
}
