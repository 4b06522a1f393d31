//! Session engine for the grind tracker.
//!
//! Wires reporter messages into session bookkeeping and emits the resulting
//! domain events to the collector:
//! - [`dispatch`]: at-least-once event delivery with an ordered retry queue
//! - [`poller`]: submission feed matching and deduplication
//! - [`backup`]: retry-queue persistence across restarts
//! - [`engine`]: the orchestrating actor and its timers

pub mod backup;
pub mod dispatch;
pub mod engine;
pub mod poller;

pub use backup::{BackupError, QueueBackup};
pub use dispatch::{CollectorTransport, EventDispatcher, EventPayload, HttpCollector, PostError, TransportError};
pub use engine::{Engine, EngineClosed, EngineHandle, SessionStatus};
pub use poller::{SubmissionFeed, SubmissionPoller, match_submissions};
