//! The orchestrating actor: wires reporter messages to session bookkeeping
//! and emits the resulting domain events to the dispatcher.
//!
//! One task owns the registry, dispatcher, poller, and settings; the command
//! channel and both timers are multiplexed with `tokio::select!`, so every
//! session mutation goes through the same serialized entry points. Burst
//! timers never touch state directly; they post commands back into the
//! channel, and a command for a session that has since ended is a no-op.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use gt_core::accountant::update_active_time;
use gt_core::event::{DomainEvent, ProgressTrigger};
use gt_core::message::{Envelope, Message};
use gt_core::problem::is_placeholder_title;
use gt_core::registry::{EndReason, SessionRegistry};
use gt_core::settings::Settings;
use gt_core::types::{ProblemId, SessionId, TabId};

use crate::dispatch::{CollectorTransport, EventDispatcher, EventPayload};
use crate::poller::{SubmissionFeed, SubmissionPoller, match_submissions};

/// Scheduler tick driving heartbeat and periodic-poll checks. Decoupled from
/// the heartbeat interval itself, which is a settings value.
pub const SCHEDULER_TICK: Duration = Duration::from_secs(5);

/// How often the retry queue is re-attempted after a failure.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// On-demand poll offsets after a submit click; the feed lags the judge.
pub const SUBMIT_POLL_BURST: [Duration; 3] = [
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

/// Command channel depth.
const COMMAND_BUFFER: usize = 256;

/// Commands processed by the engine actor.
#[derive(Debug)]
pub enum EngineCommand {
    /// A validated reporter message.
    Inbound(Envelope),
    /// Immediate submission poll for one tab (post-submit burst).
    PollNow(TabId),
    /// Session status snapshot request.
    Status(oneshot::Sender<Vec<SessionStatus>>),
    /// End every session and stop.
    Shutdown,
}

/// The engine actor has stopped and no longer accepts commands.
#[derive(Debug, Error)]
#[error("engine is no longer running")]
pub struct EngineClosed;

/// Point-in-time view of one session, for the status query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub tab_id: TabId,
    pub session_id: SessionId,
    pub problem_id: ProblemId,
    pub problem_title: Option<String>,
    pub platform: String,
    pub focused: bool,
    pub active_ms: i64,
    pub wall_clock_ms: i64,
    pub runs: u64,
    pub submissions: u64,
    pub keystrokes: u64,
}

/// Cheap handle for posting into the engine's command channel.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Forwards one reporter envelope.
    pub async fn send(&self, envelope: Envelope) -> Result<(), EngineClosed> {
        self.tx
            .send(EngineCommand::Inbound(envelope))
            .await
            .map_err(|_| EngineClosed)
    }

    /// Snapshot of every live session.
    pub async fn status(&self) -> Result<Vec<SessionStatus>, EngineClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Status(reply_tx))
            .await
            .map_err(|_| EngineClosed)?;
        reply_rx.await.map_err(|_| EngineClosed)
    }

    /// Asks the engine to end all sessions and stop.
    pub async fn shutdown(&self) -> Result<(), EngineClosed> {
        self.tx
            .send(EngineCommand::Shutdown)
            .await
            .map_err(|_| EngineClosed)
    }
}

/// The session engine actor.
pub struct Engine<C, F> {
    settings: Settings,
    registry: SessionRegistry,
    dispatcher: EventDispatcher<C>,
    poller: SubmissionPoller<F>,
    rx: mpsc::Receiver<EngineCommand>,
    tx: mpsc::Sender<EngineCommand>,
}

impl<C: CollectorTransport, F: SubmissionFeed> Engine<C, F> {
    /// Builds an engine and the handle feeding it.
    #[must_use]
    pub fn new(settings: Settings, transport: C, feed: F) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let registry = SessionRegistry::new(&settings);
        let dispatcher = EventDispatcher::new(transport, &settings);
        let poller = SubmissionPoller::new(feed, &settings);
        let engine = Self {
            settings,
            registry,
            dispatcher,
            poller,
            rx,
            tx: tx.clone(),
        };
        (engine, EngineHandle { tx })
    }

    /// Seeds the retry queue with payloads saved by a previous run.
    pub fn restore_queue(&mut self, payloads: Vec<EventPayload>) {
        self.dispatcher.restore_queue(payloads);
    }

    /// Runs the actor until shutdown (or every handle is dropped), then ends
    /// all sessions and returns whatever is still undelivered for backup.
    pub async fn run(mut self) -> Vec<EventPayload> {
        let mut scheduler = tokio::time::interval(SCHEDULER_TICK);
        scheduler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut retry = tokio::time::interval(RETRY_INTERVAL);
        retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("session engine started");
        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    None | Some(EngineCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command, Utc::now()).await,
                },
                _ = scheduler.tick() => self.handle_tick(Utc::now()).await,
                _ = retry.tick() => {
                    if self.dispatcher.queue_len() > 0 {
                        self.dispatcher.process_retry_queue().await;
                    }
                },
            }
        }
        self.shutdown(Utc::now()).await
    }

    async fn handle_command(&mut self, command: EngineCommand, now: DateTime<Utc>) {
        match command {
            EngineCommand::Inbound(envelope) => {
                self.handle_message(envelope.tab_id, envelope.message, now).await;
            }
            EngineCommand::PollNow(tab) => self.poll_session(&tab, now).await,
            EngineCommand::Status(reply) => {
                let _ = reply.send(self.status(now));
            }
            EngineCommand::Shutdown => {}
        }
    }

    async fn handle_message(&mut self, tab: TabId, message: Message, now: DateTime<Utc>) {
        match message {
            Message::SessionStart { problem_url, problem_title } => {
                self.on_session_start(&tab, &problem_url, problem_title.as_deref(), now)
                    .await;
            }
            Message::FocusChange { focused } => {
                self.registry.set_focus(&tab, focused, now);
            }
            Message::ActivityPing { code, language, stats, significant_change, .. } => {
                if let Some(session) = self.registry.get_mut(&tab) {
                    session.counters.keystrokes += 1;
                    update_active_time(session, self.settings.idle_threshold_ms, now);
                    if let Some(code) = code.as_deref() {
                        session.record_activity_code(
                            code,
                            language.as_deref(),
                            stats,
                            significant_change,
                            now,
                        );
                    }
                }
            }
            Message::RunClicked { code, language } => {
                let mut event = None;
                if let Some(session) = self.registry.get_mut(&tab) {
                    session.counters.runs += 1;
                    update_active_time(session, self.settings.idle_threshold_ms, now);
                    session.update_snapshot(code.as_deref(), language.as_deref());
                    event = Some(DomainEvent::progress_click(
                        &self.settings.user_id,
                        session,
                        ProgressTrigger::RunClicked,
                        now,
                    ));
                }
                if let Some(event) = event {
                    self.dispatch(event, now).await;
                }
            }
            Message::SubmitClicked { code, language } => {
                let mut event = None;
                if let Some(session) = self.registry.get_mut(&tab) {
                    session.counters.submissions += 1;
                    update_active_time(session, self.settings.idle_threshold_ms, now);
                    session.update_snapshot(code.as_deref(), language.as_deref());
                    session.last_submit_click = Some(now);
                    event = Some(DomainEvent::progress_click(
                        &self.settings.user_id,
                        session,
                        ProgressTrigger::SubmitClicked,
                        now,
                    ));
                }
                if let Some(event) = event {
                    self.dispatch(event, now).await;
                    self.schedule_submit_burst(tab);
                }
            }
            Message::SettingsUpdated(update) => {
                update.apply(&mut self.settings);
                self.registry.apply_settings(&self.settings);
                self.dispatcher.apply_settings(&self.settings);
                self.poller.apply_settings(&self.settings);
                tracing::info!(settings = ?self.settings, "settings updated");
            }
            Message::TabRemoved => {
                let ended = self.registry.end_session(&tab, EndReason::TabClosed, now);
                if let Some(event) = ended {
                    self.dispatch(event, now).await;
                }
            }
            Message::WindowFocus { focused } => {
                // Per-tab focus arrives separately; only whole-window
                // defocus fans out to every session.
                if !focused {
                    self.registry.clear_window_focus(now);
                }
            }
            Message::TabActivated => {
                self.registry.focus_only(&tab, now);
            }
            Message::Connectivity { online } => {
                let became_online = self.dispatcher.set_online(online);
                tracing::info!(online, "connectivity changed");
                if became_online {
                    self.dispatcher.process_retry_queue().await;
                }
            }
        }
    }

    async fn on_session_start(
        &mut self,
        tab: &TabId,
        url: &str,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let mut out = Vec::new();
        {
            let ensured = self.registry.ensure_session(tab, url, now);
            if let Some(ended) = ensured.ended {
                out.push(ended);
            }
            let session = ensured.session;
            match title.filter(|t| !is_placeholder_title(t)) {
                Some(title) => {
                    session.problem_title = Some(title.to_string());
                    if !session.started_emitted {
                        session.started_emitted = true;
                        out.push(DomainEvent::session_started(&self.settings.user_id, session, now));
                    }
                }
                // Placeholder or missing title: emission stays deferred
                // until a later SESSION_START carries the real one.
                None => {}
            }
        }
        for event in out {
            self.dispatch(event, now).await;
        }
    }

    /// Runs heartbeat and periodic-poll checks for every active session.
    async fn handle_tick(&mut self, now: DateTime<Utc>) {
        let mut heartbeats = Vec::new();
        let mut polls = Vec::new();
        let poll_enabled = self.poller.username().is_some();

        for tab in self.registry.tabs() {
            let Some(session) = self.registry.get_mut(&tab) else {
                continue;
            };
            if !session.is_active {
                continue;
            }
            update_active_time(session, self.settings.idle_threshold_ms, now);

            if poll_enabled
                && (now - session.last_submission_check).num_milliseconds()
                    >= self.settings.submission_poll_interval_ms
            {
                polls.push(tab.clone());
            }

            if (now - session.last_heartbeat).num_milliseconds()
                >= self.settings.heartbeat_interval_ms
            {
                session.last_heartbeat = now;
                heartbeats.push(DomainEvent::heartbeat(&self.settings.user_id, session, now));
            }
        }

        for event in heartbeats {
            self.dispatch(event, now).await;
        }
        for tab in polls {
            self.poll_session(&tab, now).await;
        }
    }

    /// Fetches the feed and reports new matches for one session.
    ///
    /// The fetch happens before the session is re-read: if the session ended
    /// while the call was in flight, the result is dropped as a no-op.
    async fn poll_session(&mut self, tab: &TabId, now: DateTime<Utc>) {
        if self.poller.username().is_none() || !self.registry.contains(tab) {
            return;
        }
        let submissions = self.poller.fetch().await;

        let mut events = Vec::new();
        if let Some(session) = self.registry.get_mut(tab) {
            session.last_submission_check = now;
            events = match_submissions(&self.settings.user_id, session, &submissions);
        }
        for event in events {
            self.dispatch(event, now).await;
        }
    }

    /// Schedules the post-submit poll bursts. Each fires once; a burst for a
    /// session that has since ended is dropped by `poll_session`.
    fn schedule_submit_burst(&self, tab: TabId) {
        for delay in SUBMIT_POLL_BURST {
            let tx = self.tx.clone();
            let tab = tab.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(EngineCommand::PollNow(tab)).await;
            });
        }
    }

    async fn dispatch(&mut self, event: DomainEvent, now: DateTime<Utc>) {
        if let Err(err) = self.dispatcher.post_event(&event, now).await {
            tracing::debug!(error = %err, "event not delivered");
        }
    }

    fn status(&mut self, now: DateTime<Utc>) -> Vec<SessionStatus> {
        // Flush accounting so reported totals are current; the scheduler
        // tick does the same every few seconds anyway.
        for tab in self.registry.tabs() {
            if let Some(session) = self.registry.get_mut(&tab) {
                update_active_time(session, self.settings.idle_threshold_ms, now);
            }
        }
        let mut statuses: Vec<SessionStatus> = self
            .registry
            .iter()
            .map(|session| SessionStatus {
                tab_id: session.tab.clone(),
                session_id: session.session_id.clone(),
                problem_id: session.problem_id.clone(),
                problem_title: session.problem_title.clone(),
                platform: session.platform.to_string(),
                focused: session.focused,
                active_ms: session.active_ms,
                wall_clock_ms: session.wall_clock_ms(now),
                runs: session.counters.runs,
                submissions: session.counters.submissions,
                keystrokes: session.counters.keystrokes,
            })
            .collect();
        statuses.sort_by(|a, b| a.tab_id.as_str().cmp(b.tab_id.as_str()));
        statuses
    }

    /// Ends every session, makes one final drain attempt, and reports what
    /// is still pending.
    async fn shutdown(mut self, now: DateTime<Utc>) -> Vec<EventPayload> {
        let ended = self.registry.end_all(EndReason::Unknown, now);
        for event in ended {
            self.dispatch(event, now).await;
        }
        if self.dispatcher.queue_len() > 0 {
            self.dispatcher.process_retry_queue().await;
        }
        let pending = self.dispatcher.pending();
        tracing::info!(pending = pending.len(), "session engine stopped");
        pending
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use chrono::{Duration as ChronoDuration, TimeZone};
    use gt_core::settings::SettingsUpdate;
    use gt_feed::{FeedError, Submission};

    use super::*;
    use crate::dispatch::TransportError;

    /// Transport recording payloads; outcomes default to success.
    #[derive(Default)]
    struct RecordingTransport {
        outcomes: RefCell<VecDeque<Result<(), TransportError>>>,
        sent: RefCell<Vec<EventPayload>>,
    }

    impl RecordingTransport {
        fn sent_types(&self) -> Vec<String> {
            self.sent.borrow().iter().map(|p| p.event_type.clone()).collect()
        }
    }

    impl CollectorTransport for RecordingTransport {
        async fn send(
            &self,
            _base_url: &str,
            _api_key: Option<&str>,
            payload: &EventPayload,
        ) -> Result<serde_json::Value, TransportError> {
            match self.outcomes.borrow_mut().pop_front() {
                Some(Err(err)) => Err(err),
                _ => {
                    self.sent.borrow_mut().push(payload.clone());
                    Ok(serde_json::json!({"status": "ok"}))
                }
            }
        }
    }

    #[derive(Default)]
    struct ScriptedFeed {
        submissions: RefCell<Vec<Submission>>,
    }

    impl SubmissionFeed for ScriptedFeed {
        async fn recent(&self, _username: &str, _limit: usize) -> Result<Vec<Submission>, FeedError> {
            Ok(self.submissions.borrow().clone())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn ms(offset: i64) -> DateTime<Utc> {
        t0() + ChronoDuration::milliseconds(offset)
    }

    fn tab(id: &str) -> TabId {
        TabId::new(id).unwrap()
    }

    fn test_settings() -> Settings {
        Settings {
            backend_url: Some("http://localhost:8082/api".to_string()),
            leetcode_username: "sami".to_string(),
            ..Settings::default()
        }
    }

    fn engine() -> (Engine<RecordingTransport, ScriptedFeed>, EngineHandle) {
        Engine::new(
            test_settings(),
            RecordingTransport::default(),
            ScriptedFeed::default(),
        )
    }

    fn start_message(title: Option<&str>) -> Message {
        Message::SessionStart {
            problem_url: "https://leetcode.com/problems/two-sum/".to_string(),
            problem_title: title.map(str::to_string),
        }
    }

    fn accepted(id: &str, title: &str) -> Submission {
        Submission {
            title: title.to_string(),
            status_display: Some("Accepted".to_string()),
            runtime: Some("3 ms".to_string()),
            memory: Some("17.4 MB".to_string()),
            lang: Some("python3".to_string()),
            id: id.to_string(),
            timestamp: "1717243200".to_string(),
        }
    }

    #[tokio::test]
    async fn session_start_with_real_title_emits_started() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;

        assert_eq!(engine.dispatcher.queue_len(), 0);
        assert_eq!(
            engine.transport_ref().sent_types(),
            vec!["ProblemSessionStarted"]
        );
    }

    #[tokio::test]
    async fn placeholder_title_defers_started_until_resolved() {
        let (mut engine, _handle) = engine();
        engine
            .handle_message(tab("t1"), start_message(Some("(loading...)")), t0())
            .await;
        assert!(engine.transport_ref().sent_types().is_empty());

        // Re-announcement with the real title emits exactly once.
        engine
            .handle_message(tab("t1"), start_message(Some("Two Sum")), ms(1000))
            .await;
        engine
            .handle_message(tab("t1"), start_message(Some("Two Sum")), ms(2000))
            .await;
        assert_eq!(
            engine.transport_ref().sent_types(),
            vec!["ProblemSessionStarted"]
        );
    }

    #[tokio::test]
    async fn navigation_ends_old_session_before_starting_new() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine
            .handle_message(
                tab("t1"),
                Message::SessionStart {
                    problem_url: "https://leetcode.com/problems/3sum/".to_string(),
                    problem_title: Some("3Sum".to_string()),
                },
                ms(60_000),
            )
            .await;

        assert_eq!(
            engine.transport_ref().sent_types(),
            vec![
                "ProblemSessionStarted",
                "ProblemSessionEnded",
                "ProblemSessionStarted"
            ]
        );
        let sent = engine.transport_ref().sent.borrow();
        assert_eq!(sent[1].data["reason"], "navigation");
        assert_eq!(sent[1].data["problemId"], "two-sum");
        assert_eq!(sent[2].data["problemId"], "3sum");
    }

    #[tokio::test]
    async fn idle_gap_is_not_accrued() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;

        let ping = |code: Option<&str>| Message::ActivityPing {
            code: code.map(str::to_string),
            language: Some("python3".to_string()),
            stats: None,
            code_changed: false,
            significant_change: false,
        };

        engine.handle_message(tab("t1"), ping(Some("x = 1")), ms(1000)).await;
        // 40s idle (over the 30s threshold), then another ping.
        engine.handle_message(tab("t1"), ping(Some("x = 2")), ms(41_000)).await;

        let session = engine.registry.get(&tab("t1")).unwrap();
        assert_eq!(session.active_ms, 1000);
        assert_eq!(session.counters.keystrokes, 2);
    }

    #[tokio::test]
    async fn run_and_submit_clicks_emit_tagged_progress() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine
            .handle_message(
                tab("t1"),
                Message::RunClicked {
                    code: Some("run code".to_string()),
                    language: Some("python3".to_string()),
                },
                ms(5000),
            )
            .await;
        engine
            .handle_message(
                tab("t1"),
                Message::SubmitClicked {
                    code: Some("submit code".to_string()),
                    language: Some("python3".to_string()),
                },
                ms(9000),
            )
            .await;

        let sent = engine.transport_ref().sent.borrow();
        assert_eq!(sent[1].data["event"], "run_clicked");
        assert_eq!(sent[1].data["counters"]["runs"], 1);
        assert_eq!(sent[2].data["event"], "submit_clicked");
        assert_eq!(sent[2].data["counters"]["submissions"], 1);
        assert_eq!(sent[2].data["code"], "submit code");
        drop(sent);

        let session = engine.registry.get(&tab("t1")).unwrap();
        assert_eq!(session.last_submit_click, Some(ms(9000)));
    }

    #[tokio::test]
    async fn clicks_on_unknown_tab_are_ignored() {
        let (mut engine, _handle) = engine();
        engine
            .handle_message(
                tab("ghost"),
                Message::RunClicked { code: None, language: None },
                t0(),
            )
            .await;
        engine.handle_message(tab("ghost"), Message::TabRemoved, t0()).await;
        assert!(engine.transport_ref().sent_types().is_empty());
    }

    #[tokio::test]
    async fn tab_removed_ends_session_once() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine.handle_message(tab("t1"), Message::TabRemoved, ms(10_000)).await;
        engine.handle_message(tab("t1"), Message::TabRemoved, ms(11_000)).await;

        let types = engine.transport_ref().sent_types();
        assert_eq!(types, vec!["ProblemSessionStarted", "ProblemSessionEnded"]);
        let sent = engine.transport_ref().sent.borrow();
        assert_eq!(sent[1].data["reason"], "tab_closed");
        assert_eq!(sent[1].data["totalWallTime"], 10_000);
        drop(sent);
        assert!(engine.registry.is_empty());
    }

    #[tokio::test]
    async fn window_defocus_clears_focus_on_all_sessions() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine
            .handle_message(
                tab("t2"),
                Message::SessionStart {
                    problem_url: "https://leetcode.com/problems/3sum/".to_string(),
                    problem_title: Some("3Sum".to_string()),
                },
                t0(),
            )
            .await;

        engine
            .handle_message(tab("t1"), Message::WindowFocus { focused: false }, ms(1000))
            .await;
        assert!(!engine.registry.get(&tab("t1")).unwrap().focused);
        assert!(!engine.registry.get(&tab("t2")).unwrap().focused);
    }

    #[tokio::test]
    async fn heartbeat_fires_on_interval_not_every_tick() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;

        // 5s tick: under the 30s heartbeat interval, nothing.
        engine.handle_tick(ms(5000)).await;
        assert_eq!(engine.transport_ref().sent_types().len(), 1);

        // Past the interval: one heartbeat with the activity snapshot.
        engine.handle_tick(ms(31_000)).await;
        let sent = engine.transport_ref().sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].event_type, "ProblemProgress");
        assert_eq!(sent[1].data["focused"], true);
        assert_eq!(sent[1].data["wallClockMs"], 31_000);
        drop(sent);

        // Next tick shortly after: the interval has not elapsed again.
        engine.handle_tick(ms(36_000)).await;
        assert_eq!(engine.transport_ref().sent_types().len(), 2);
    }

    #[tokio::test]
    async fn periodic_poll_reports_submission_exactly_once() {
        let (mut engine, _handle) = engine();
        engine.feed_ref().submissions.borrow_mut().push(accepted("987", "Two Sum"));
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;

        // First poll window: one ProblemSubmitted.
        engine.handle_tick(ms(300_000)).await;
        // Later polls observe the same feed entry: no duplicates.
        engine.handle_tick(ms(600_000)).await;
        engine.handle_tick(ms(900_000)).await;

        let submitted: Vec<String> = engine
            .transport_ref()
            .sent
            .borrow()
            .iter()
            .filter(|p| p.event_type == "ProblemSubmitted")
            .map(|p| p.data["submissionId"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(submitted, vec!["987"]);
    }

    #[tokio::test]
    async fn burst_poll_dedups_against_periodic() {
        let (mut engine, _handle) = engine();
        engine.feed_ref().submissions.borrow_mut().push(accepted("987", "Two Sum"));
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;

        // Burst at +10s finds it; burst at +30s sees the same id again.
        engine.poll_session(&tab("t1"), ms(10_000)).await;
        engine.poll_session(&tab("t1"), ms(30_000)).await;

        let submitted: Vec<String> = engine
            .transport_ref()
            .sent
            .borrow()
            .iter()
            .filter(|p| p.event_type == "ProblemSubmitted")
            .map(|p| p.data["submissionId"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(submitted, vec!["987"]);

        let data = engine.transport_ref().sent.borrow();
        let event = data.iter().find(|p| p.event_type == "ProblemSubmitted").unwrap();
        // The event carries the feed's original timestamp, not poll time.
        assert_eq!(event.data["timestamp"], "1717243200");
    }

    #[tokio::test]
    async fn poll_for_ended_session_is_noop() {
        let (mut engine, _handle) = engine();
        engine.feed_ref().submissions.borrow_mut().push(accepted("987", "Two Sum"));
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine.handle_message(tab("t1"), Message::TabRemoved, ms(1000)).await;

        engine.poll_session(&tab("t1"), ms(10_000)).await;
        let types = engine.transport_ref().sent_types();
        assert!(!types.contains(&"ProblemSubmitted".to_string()));
    }

    #[tokio::test]
    async fn offline_events_queue_and_drain_in_order() {
        let (mut engine, _handle) = engine();
        engine
            .handle_message(tab("t1"), Message::Connectivity { online: false }, t0())
            .await;
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine
            .handle_message(
                tab("t1"),
                Message::RunClicked { code: None, language: None },
                ms(1000),
            )
            .await;
        assert_eq!(engine.dispatcher.queue_len(), 2);
        assert!(engine.transport_ref().sent_types().is_empty());

        engine
            .handle_message(tab("t1"), Message::Connectivity { online: true }, ms(2000))
            .await;
        assert_eq!(engine.dispatcher.queue_len(), 0);
        assert_eq!(
            engine.transport_ref().sent_types(),
            vec!["ProblemSessionStarted", "ProblemProgress"]
        );
    }

    #[tokio::test]
    async fn settings_update_rewires_components() {
        let (mut engine, _handle) = engine();
        let update = SettingsUpdate {
            leetcode_username: Some(String::new()),
            user_id: Some("u-9".to_string()),
            ..SettingsUpdate::default()
        };
        engine
            .handle_message(tab("t1"), Message::SettingsUpdated(update), t0())
            .await;

        assert!(engine.poller.username().is_none());
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        let sent = engine.transport_ref().sent.borrow();
        assert_eq!(sent[0].data["userId"], "u-9");
    }

    #[tokio::test]
    async fn status_reports_live_sessions() {
        let (mut engine, _handle) = engine();
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;
        engine
            .handle_message(
                tab("t1"),
                Message::ActivityPing {
                    code: None,
                    language: None,
                    stats: None,
                    code_changed: false,
                    significant_change: false,
                },
                ms(2000),
            )
            .await;

        let statuses = engine.status(ms(4000));
        assert_eq!(statuses.len(), 1);
        let status = &statuses[0];
        assert_eq!(status.problem_id.as_str(), "two-sum");
        assert_eq!(status.problem_title.as_deref(), Some("Two Sum"));
        assert_eq!(status.keystrokes, 1);
        assert_eq!(status.active_ms, 4000);
        assert_eq!(status.wall_clock_ms, 4000);
    }

    #[tokio::test]
    async fn shutdown_ends_sessions_and_returns_pending() {
        let (mut engine, _handle) = engine();
        engine
            .handle_message(tab("t1"), Message::Connectivity { online: false }, t0())
            .await;
        engine.handle_message(tab("t1"), start_message(Some("Two Sum")), t0()).await;

        let pending = engine.shutdown(ms(5000)).await;
        // Started + ended events, both queued while offline.
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].event_type, "ProblemSessionStarted");
        assert_eq!(pending[1].event_type, "ProblemSessionEnded");
        assert_eq!(pending[1].data["reason"], "unknown");
    }

    #[tokio::test]
    async fn run_loop_processes_commands_and_shuts_down() {
        let (engine, handle) = engine();
        // The scripted transport is !Send, so the engine runs on a LocalSet.
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let runner = tokio::task::spawn_local(engine.run());

                handle
                    .send(Envelope {
                        tab_id: tab("t1"),
                        message: start_message(Some("Two Sum")),
                    })
                    .await
                    .unwrap();
                let statuses = handle.status().await.unwrap();
                assert_eq!(statuses.len(), 1);
                assert_eq!(statuses[0].problem_id.as_str(), "two-sum");

                handle.shutdown().await.unwrap();
                let pending = runner.await.unwrap();
                // Everything delivered; nothing left for backup.
                assert!(pending.is_empty());
                assert!(handle.shutdown().await.is_err());
            })
            .await;
    }

    impl Engine<RecordingTransport, ScriptedFeed> {
        fn transport_ref(&self) -> &RecordingTransport {
            self.dispatcher.transport_ref()
        }

        fn feed_ref(&self) -> &ScriptedFeed {
            self.poller.feed_ref()
        }
    }
}
