//! Runtime settings for the session engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default feed endpoint for recent-submission lookups.
pub const DEFAULT_FEED_BASE: &str = "https://alfa-leetcode-api.onrender.com";

/// Default idle threshold in milliseconds (30s).
pub const DEFAULT_IDLE_THRESHOLD_MS: i64 = 30_000;

/// Default heartbeat interval in milliseconds (30s).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: i64 = 30_000;

/// Default periodic submission-poll interval in milliseconds (5min).
pub const DEFAULT_SUBMISSION_POLL_INTERVAL_MS: i64 = 300_000;

/// Engine settings, loaded at startup and updatable at runtime.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Opaque user identity attached to every event.
    pub user_id: String,
    /// Username for the submissions feed; empty disables polling.
    pub leetcode_username: String,
    /// Collector base URL. `None` behaves like being offline: every event
    /// queues for retry and nothing is sent.
    pub backend_url: Option<String>,
    /// Optional bearer token for collector calls.
    pub api_key: Option<String>,
    /// Base URL of the submissions feed.
    pub feed_base: String,
    pub idle_threshold_ms: i64,
    pub heartbeat_interval_ms: i64,
    pub submission_poll_interval_ms: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_id: "user123".to_string(),
            leetcode_username: String::new(),
            backend_url: None,
            api_key: None,
            feed_base: DEFAULT_FEED_BASE.to_string(),
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            submission_poll_interval_ms: DEFAULT_SUBMISSION_POLL_INTERVAL_MS,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("user_id", &self.user_id)
            .field("leetcode_username", &self.leetcode_username)
            .field("backend_url", &self.backend_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("feed_base", &self.feed_base)
            .field("idle_threshold_ms", &self.idle_threshold_ms)
            .field("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .field("submission_poll_interval_ms", &self.submission_poll_interval_ms)
            .finish()
    }
}

impl Settings {
    /// The feed username, if one is configured.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        let trimmed = self.leetcode_username.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

/// Partial settings update carried by a `SETTINGS_UPDATED` message.
///
/// Wire field names are camelCase, matching the settings store's persisted
/// keys. Absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub user_id: Option<String>,
    pub leetcode_username: Option<String>,
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub feed_base: Option<String>,
    pub idle_threshold_ms: Option<i64>,
    pub heartbeat_interval_ms: Option<i64>,
    pub submission_poll_interval_ms: Option<i64>,
}

impl SettingsUpdate {
    /// Merges the update into `settings`. Empty strings clear the optional
    /// endpoint/key fields rather than storing unusable blanks.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(user_id) = &self.user_id {
            settings.user_id.clone_from(user_id);
        }
        if let Some(username) = &self.leetcode_username {
            settings.leetcode_username.clone_from(username);
        }
        if let Some(backend_url) = &self.backend_url {
            settings.backend_url = non_empty(backend_url);
        }
        if let Some(api_key) = &self.api_key {
            settings.api_key = non_empty(api_key);
        }
        if let Some(feed_base) = &self.feed_base {
            if !feed_base.trim().is_empty() {
                settings.feed_base.clone_from(feed_base);
            }
        }
        if let Some(idle) = self.idle_threshold_ms {
            settings.idle_threshold_ms = idle;
        }
        if let Some(heartbeat) = self.heartbeat_interval_ms {
            settings.heartbeat_interval_ms = heartbeat;
        }
        if let Some(poll) = self.submission_poll_interval_ms {
            settings.submission_poll_interval_ms = poll;
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
