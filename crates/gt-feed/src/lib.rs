//! HTTP client for the public recent-submissions feed.
//!
//! The feed reports a user's most recent judge results:
//! `GET {base}/{username}/submission?limit=N` returning
//! `{"submission": [{title, statusDisplay, runtime, memory, lang, id,
//! timestamp}, ...]}`. The feed may lag the actual judge by a while, which
//! is why callers poll it repeatedly after a submit.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Default request timeout for feed calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How much response body to keep in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Feed client errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Feed returned a non-success status.
    #[error("feed error: status {status}: {body}")]
    Api { status: u16, body: String },
    /// Failed to parse the response body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One externally-judged submission as the feed reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub title: String,
    #[serde(default)]
    pub status_display: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Epoch timestamp as the feed reports it, kept verbatim.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    #[serde(default)]
    submission: Vec<Submission>,
}

/// Feed API client.
///
/// Safe to clone; clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client against the given feed base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(FeedError::ClientBuild)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetches the user's most recent submissions, newest first.
    pub async fn fetch_recent(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, FeedError> {
        let url = format!(
            "{}/{username}/submission?limit={limit}",
            self.base_url.trim_end_matches('/')
        );
        tracing::debug!(%url, "fetching recent submissions");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FeedError::Api {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let envelope: FeedEnvelope = serde_json::from_str(&body)
            .map_err(|err| FeedError::InvalidResponse(err.to_string()))?;
        Ok(envelope.submission)
    }
}

/// Accepts both string and numeric JSON values, normalizing to a string.
/// The feed is inconsistent about `id` and `timestamp` types.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
        Float(f64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
        StringOrNumber::Float(f) => f.to_string(),
    })
}

fn truncate_body(body: &str) -> String {
    let mut end = body.len().min(ERROR_BODY_LIMIT);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
