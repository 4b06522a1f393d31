//! Core domain logic for the grind tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Sessions: per-tab tracking of one coding problem's engagement
//! - Active time accounting: focused/non-idle duration accrual
//! - The domain event taxonomy delivered to the collector
//! - The inbound message union validated at the transport boundary

pub mod accountant;
pub mod event;
pub mod message;
pub mod problem;
pub mod registry;
pub mod session;
pub mod settings;
pub mod types;

pub use accountant::update_active_time;
pub use event::{DomainEvent, ProgressTrigger, SubmissionOutcome};
pub use message::{Envelope, Message};
pub use problem::{Platform, extract_problem_id, is_placeholder_title, slugify_title};
pub use registry::{EndReason, SessionRegistry};
pub use session::{CodeSnapshot, CodeStats, Counters, Session};
pub use settings::{Settings, SettingsUpdate};
pub use types::{ProblemId, SessionId, TabId, ValidationError};
