//! Event delivery to the collector with an ordered retry queue.
//!
//! Delivery is at-least-once: a payload whose acknowledgement is lost after
//! the collector persisted it will be retried and may be recorded twice
//! downstream. The collector is expected to be idempotent per event
//! identity.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gt_core::event::DomainEvent;
use gt_core::settings::Settings;

/// Pause between successful sends while draining, to avoid bursting the
/// collector.
pub const RETRY_QUEUE_PAUSE: Duration = Duration::from_millis(100);

/// Request timeout for collector calls.
const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(15);

/// A transport-level delivery failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be completed (connect, timeout, body).
    #[error("request failed: {0}")]
    Request(String),
    /// The collector answered with a non-success status.
    #[error("collector returned status {0}")]
    Status(u16),
}

/// Why a `post_event` call did not deliver.
///
/// In every variant except [`PostError::Serialize`] the payload has been
/// appended to the retry queue; callers log and move on.
#[derive(Debug, Error)]
pub enum PostError {
    /// The dispatcher believes it is offline.
    #[error("offline, event queued")]
    Offline,
    /// No collector endpoint is configured; treated the same as offline.
    #[error("no collector endpoint configured, event queued")]
    NoEndpoint,
    /// The event payload could not be serialized. Nothing was queued.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The send failed; the payload was queued for retry.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A delivery payload: event type tag plus data record, timestamped.
/// Immutable once enqueued; removed only on confirmed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: serde_json::Value,
}

impl EventPayload {
    /// Wraps a domain event, stamping a delivery timestamp if the payload
    /// does not already carry one (submitted events keep their original
    /// external timestamp).
    pub fn new(event: &DomainEvent, now: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let mut data = event.data()?;
        if let Some(map) = data.as_object_mut() {
            map.entry("timestamp")
                .or_insert_with(|| serde_json::Value::from(now.timestamp_millis()));
        }
        Ok(Self {
            event_type: event.event_type().to_string(),
            data,
        })
    }
}

/// How a payload physically reaches the collector.
///
/// A trait so the dispatcher's queueing and ordering logic is testable with
/// scripted in-memory transports.
#[allow(async_fn_in_trait)]
pub trait CollectorTransport {
    /// Sends one payload, returning the collector's JSON acknowledgement.
    async fn send(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        payload: &EventPayload,
    ) -> Result<serde_json::Value, TransportError>;
}

/// Real collector transport: `POST {base_url}/events` with a JSON body and
/// an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    http: reqwest::Client,
}

impl HttpCollector {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(COLLECTOR_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self { http })
    }
}

impl CollectorTransport for HttpCollector {
    async fn send(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        payload: &EventPayload,
    ) -> Result<serde_json::Value, TransportError> {
        let endpoint = format!("{}/events", base_url.trim_end_matches('/'));
        let mut request = self.http.post(&endpoint).json(payload);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))
    }
}

/// Serializes domain events and delivers them, queueing failures for retry.
///
/// The queue is strictly FIFO: failed sends are pushed back to the head so
/// relative order is preserved across drains.
#[derive(Debug)]
pub struct EventDispatcher<C> {
    transport: C,
    queue: VecDeque<EventPayload>,
    online: bool,
    /// Guards `process_retry_queue` against concurrent invocation: a second
    /// call while one is in flight is a no-op.
    draining: bool,
    backend_url: Option<String>,
    api_key: Option<String>,
}

impl<C: CollectorTransport> EventDispatcher<C> {
    #[must_use]
    pub fn new(transport: C, settings: &Settings) -> Self {
        Self {
            transport,
            queue: VecDeque::new(),
            online: true,
            draining: false,
            backend_url: settings.backend_url.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Picks up runtime settings changes (endpoint, key).
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.backend_url.clone_from(&settings.backend_url);
        self.api_key.clone_from(&settings.api_key);
    }

    /// Updates the online flag. Returns `true` on a transition to online,
    /// which callers use to trigger a drain.
    pub fn set_online(&mut self, online: bool) -> bool {
        let became_online = online && !self.online;
        self.online = online;
        became_online
    }

    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.online
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Restores payloads saved by a previous run. Intended for startup,
    /// before any new events are posted, so saved order stays first.
    pub fn restore_queue(&mut self, payloads: Vec<EventPayload>) {
        for payload in payloads {
            self.queue.push_back(payload);
        }
    }

    /// The pending payloads, head first, for persistence at shutdown.
    #[must_use]
    pub fn pending(&self) -> Vec<EventPayload> {
        self.queue.iter().cloned().collect()
    }

    /// Attempts immediate delivery of one event.
    ///
    /// Any failure appends the payload to the retry-queue tail and reports
    /// the error; callers do not block or retry themselves.
    pub async fn post_event(
        &mut self,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> Result<serde_json::Value, PostError> {
        let payload = EventPayload::new(event, now)?;

        let Some(base_url) = self.backend_url.clone() else {
            tracing::debug!(event_type = %payload.event_type, "no collector endpoint, queueing event");
            self.queue.push_back(payload);
            return Err(PostError::NoEndpoint);
        };
        if !self.online {
            tracing::debug!(event_type = %payload.event_type, "offline, queueing event");
            self.queue.push_back(payload);
            return Err(PostError::Offline);
        }

        match self
            .transport
            .send(&base_url, self.api_key.as_deref(), &payload)
            .await
        {
            Ok(ack) => {
                tracing::debug!(event_type = %payload.event_type, "event delivered");
                Ok(ack)
            }
            Err(err) => {
                tracing::warn!(
                    event_type = %payload.event_type,
                    error = %err,
                    queued = self.queue.len() + 1,
                    "event delivery failed, queued for retry"
                );
                self.queue.push_back(payload);
                Err(err.into())
            }
        }
    }

    /// Drains the retry queue from the head, stopping at the first failure.
    ///
    /// The failed payload goes back to the head so order is preserved and a
    /// failing collector is not hammered in a hot loop; draining resumes on
    /// the next explicit trigger. Returns the number delivered.
    pub async fn process_retry_queue(&mut self) -> usize {
        if self.draining {
            return 0;
        }
        self.draining = true;

        let mut delivered = 0;
        loop {
            if !self.online {
                break;
            }
            let Some(base_url) = self.backend_url.clone() else {
                break;
            };
            let Some(payload) = self.queue.pop_front() else {
                break;
            };

            match self
                .transport
                .send(&base_url, self.api_key.as_deref(), &payload)
                .await
            {
                Ok(_) => {
                    delivered += 1;
                    if !self.queue.is_empty() {
                        tokio::time::sleep(RETRY_QUEUE_PAUSE).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        event_type = %payload.event_type,
                        error = %err,
                        remaining = self.queue.len() + 1,
                        "retry send failed, stopping drain"
                    );
                    self.queue.push_front(payload);
                    break;
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(delivered, remaining = self.queue.len(), "retry queue drained");
        }
        self.draining = false;
        delivered
    }
}

#[cfg(test)]
impl<C> EventDispatcher<C> {
    pub(crate) fn transport_ref(&self) -> &C {
        &self.transport
    }
}
