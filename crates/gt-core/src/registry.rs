//! Session registry: owns the map of live sessions keyed by tab handle.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accountant::update_active_time;
use crate::event::DomainEvent;
use crate::problem::extract_problem_id;
use crate::session::Session;
use crate::settings::Settings;
use crate::types::TabId;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Navigation,
    TabClosed,
    Unknown,
}

impl EndReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::TabClosed => "tab_closed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`SessionRegistry::ensure_session`].
pub struct Ensured<'a> {
    /// The live session for the tab (existing or freshly created).
    pub session: &'a mut Session,
    /// Terminal event for a previous session on the same tab that pointed at
    /// a different problem. Must be dispatched before the started event.
    pub ended: Option<DomainEvent>,
    /// Whether a new session was created.
    pub created: bool,
}

/// Owns every live [`Session`], keyed by tab handle.
///
/// At most one session exists per tab at any time. A session's problem
/// identity never changes: a URL pointing at a different problem ends the
/// old session (reason `navigation`) before a new one is created.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<TabId, Session>,
    user_id: String,
    idle_threshold_ms: i64,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            sessions: HashMap::new(),
            user_id: settings.user_id.clone(),
            idle_threshold_ms: settings.idle_threshold_ms,
        }
    }

    /// Picks up runtime settings changes (user identity, idle threshold).
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.user_id.clone_from(&settings.user_id);
        self.idle_threshold_ms = settings.idle_threshold_ms;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn contains(&self, tab: &TabId) -> bool {
        self.sessions.contains_key(tab)
    }

    #[must_use]
    pub fn get(&self, tab: &TabId) -> Option<&Session> {
        self.sessions.get(tab)
    }

    #[must_use]
    pub fn get_mut(&mut self, tab: &TabId) -> Option<&mut Session> {
        self.sessions.get_mut(tab)
    }

    /// Snapshot of the live tab handles, for timer iteration.
    #[must_use]
    pub fn tabs(&self) -> Vec<TabId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// The configured idle threshold, for callers flushing active time.
    #[must_use]
    pub const fn idle_threshold_ms(&self) -> i64 {
        self.idle_threshold_ms
    }

    /// Returns the session for `tab`, creating or replacing as needed.
    ///
    /// Same problem as the existing session: refreshes the stored URL and
    /// returns it otherwise unchanged. Different problem: the old session is
    /// ended first with reason `navigation` and its terminal event returned.
    pub fn ensure_session(&mut self, tab: &TabId, url: &str, now: DateTime<Utc>) -> Ensured<'_> {
        let problem_id = extract_problem_id(url);
        let navigated = self
            .sessions
            .get(tab)
            .is_some_and(|session| session.problem_id != problem_id);
        let ended = if navigated {
            self.end_session(tab, EndReason::Navigation, now)
        } else {
            None
        };

        let created = !self.sessions.contains_key(tab);
        if created {
            tracing::debug!(tab = %tab, problem = %problem_id, "session created");
        }
        let session = self
            .sessions
            .entry(tab.clone())
            .or_insert_with(|| Session::new(tab.clone(), problem_id, url, now));
        if !created {
            session.url = url.to_string();
        }
        Ensured { session, ended, created }
    }

    /// Ends the session for `tab`, returning its terminal event.
    ///
    /// Active time is flushed before the totals are read. No-op (`None`) if
    /// the tab has no session.
    pub fn end_session(
        &mut self,
        tab: &TabId,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Option<DomainEvent> {
        let mut session = self.sessions.remove(tab)?;
        update_active_time(&mut session, self.idle_threshold_ms, now);
        tracing::debug!(tab = %tab, problem = %session.problem_id, reason = %reason, "session ended");
        Some(DomainEvent::session_ended(&self.user_id, &session, reason, now))
    }

    /// Ends every live session, returning the terminal events.
    pub fn end_all(&mut self, reason: EndReason, now: DateTime<Utc>) -> Vec<DomainEvent> {
        let tabs = self.tabs();
        tabs.iter()
            .filter_map(|tab| self.end_session(tab, reason, now))
            .collect()
    }

    /// Sets a session's focus flag, flushing time accrued under the previous
    /// state first so it is not misattributed.
    pub fn set_focus(&mut self, tab: &TabId, focused: bool, now: DateTime<Utc>) {
        let Some(session) = self.sessions.get_mut(tab) else {
            return;
        };
        update_active_time(session, self.idle_threshold_ms, now);
        if session.focused != focused {
            tracing::trace!(tab = %tab, focused, "session focus changed");
        }
        session.focused = focused;
    }

    /// Defocuses every currently focused session (whole window lost focus).
    pub fn clear_window_focus(&mut self, now: DateTime<Utc>) {
        for tab in self.tabs() {
            if self.sessions.get(&tab).is_some_and(|session| session.focused) {
                self.set_focus(&tab, false, now);
            }
        }
    }

    /// Focuses `tab` and defocuses every other session (tab switch).
    pub fn focus_only(&mut self, tab: &TabId, now: DateTime<Utc>) {
        for other in self.tabs() {
            let focused = &other == tab;
            self.set_focus(&other, focused, now);
        }
    }
}
