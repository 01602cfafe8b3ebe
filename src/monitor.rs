//! Monitoring session runtime.
//!
//! A session owns the classifier, the duration timers, the alarm state machine and
//! the session log behind one mutex. A tick task pulls frames at a fixed cadence,
//! a poll task runs only while the alarm is armed, and a dispatcher task delivers
//! alarm events to the notification channel in order. The mutex is never held
//! across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alarm::{AlarmAction, AlarmState, AlarmStateMachine};
use crate::channel::{self, NotificationChannel};
use crate::classifier::{BehaviorClassifier, ClassifierThresholds};
use crate::config::Config;
use crate::error::MonitorError;
use crate::escalator::{DurationEscalator, EscalationThresholds};
use crate::persistence::{JsonFileStore, SessionHandle, SessionStore};
use crate::pose::Pose;
use crate::presentation::MonitorSnapshot;
use crate::session_log::{SessionAggregator, SessionRecord};
use crate::source::PoseSource;
use crate::types::Classification;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
    pub poll_interval: Duration,
    pub notify_timeout: Duration,
    pub classifier: ClassifierThresholds,
    pub escalation: EscalationThresholds,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval,
            poll_interval: config.poll_interval,
            notify_timeout: config.notify_timeout,
            classifier: ClassifierThresholds::default(),
            escalation: EscalationThresholds::default(),
        }
    }
}

/// Result of one classification tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Classified(Classification),
    /// Another tick was still in flight; this one was dropped.
    Skipped,
    /// The pose source has no more frames.
    Ended,
}

/// Per-session state, created at start and dropped at stop.
struct SessionCore {
    classifier: BehaviorClassifier,
    escalator: DurationEscalator,
    alarm: AlarmStateMachine,
    aggregator: SessionAggregator,
    latest: Option<Classification>,
}

impl SessionCore {
    fn process(
        &mut self,
        poses: &[Pose],
        now: Instant,
    ) -> Result<(Classification, Option<AlarmAction>), MonitorError> {
        let observation = self.classifier.classify(poses);
        let classification = self.escalator.escalate(observation, now);
        let action = self.alarm.on_classification(&classification, now);
        self.aggregator.record(&classification, now)?;
        self.latest = Some(classification.clone());
        Ok((classification, action))
    }
}

struct Shared {
    settings: MonitorSettings,
    core: Mutex<SessionCore>,
    in_flight: AtomicBool,
    source: Arc<dyn PoseSource>,
    channel: Arc<dyn NotificationChannel>,
    events: mpsc::UnboundedSender<AlarmAction>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    source_ended: watch::Sender<bool>,
}

struct RunningSession {
    shared: Arc<Shared>,
    tick_task: Option<JoinHandle<()>>,
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
        if let Some(tick) = self.tick_task.take() {
            tick.abort();
        }
        if let Some(poll) = self.shared.poll_task.lock().take() {
            poll.abort();
        }
    }
}

/// Drives monitoring sessions against a notification channel and a session store.
pub struct Monitor {
    settings: MonitorSettings,
    channel: Arc<dyn NotificationChannel>,
    store: Arc<dyn SessionStore>,
    active: Option<RunningSession>,
    /// Finished sessions the store refused, oldest first.
    unflushed: Vec<SessionRecord>,
}

impl Monitor {
    pub fn new(
        settings: MonitorSettings,
        channel: Arc<dyn NotificationChannel>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            settings,
            channel,
            store,
            active: None,
            unflushed: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MonitorSettings::from_config(config),
            channel::channel_from_config(config),
            Arc::new(JsonFileStore::new(config.session_dir.clone())),
        )
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a session and its tick task. Must be called inside a Tokio runtime.
    pub fn start(&mut self, source: Arc<dyn PoseSource>) -> Result<String, MonitorError> {
        if self.active.is_some() {
            return Err(MonitorError::SessionAlreadyActive);
        }

        let mut aggregator = SessionAggregator::new();
        let session_id = aggregator.start(now())?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let (source_ended, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            settings: self.settings.clone(),
            core: Mutex::new(SessionCore {
                classifier: BehaviorClassifier::new(self.settings.classifier),
                escalator: DurationEscalator::new(self.settings.escalation),
                alarm: AlarmStateMachine::new(self.settings.poll_interval),
                aggregator,
                latest: None,
            }),
            in_flight: AtomicBool::new(false),
            source,
            channel: Arc::clone(&self.channel),
            events: events_tx,
            poll_task: Mutex::new(None),
            shutdown,
            source_ended,
        });

        tokio::spawn(dispatch_loop(
            Arc::clone(&self.channel),
            events_rx,
            self.settings.notify_timeout,
        ));
        let tick_task = tokio::spawn(tick_loop(Arc::clone(&shared)));

        tracing::info!(
            session_id = %session_id,
            channel = self.channel.name(),
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            "monitoring started"
        );
        self.active = Some(RunningSession {
            shared,
            tick_task: Some(tick_task),
        });
        Ok(session_id)
    }

    /// Runs one tick immediately, outside the regular cadence.
    pub async fn tick_now(&self) -> Result<TickOutcome, MonitorError> {
        let running = self.active.as_ref().ok_or(MonitorError::SessionNotStarted)?;
        tick(&running.shared).await
    }

    pub fn snapshot(&self) -> Result<MonitorSnapshot, MonitorError> {
        let running = self.active.as_ref().ok_or(MonitorError::SessionNotStarted)?;
        let now = now();
        let core = running.shared.core.lock();

        Ok(MonitorSnapshot {
            session_id: core.aggregator.session_id().map(str::to_string),
            latest: core.latest.clone(),
            alarm: core.alarm.status(now),
            stats: core.aggregator.stats().cloned().unwrap_or_default(),
            logged_entries: core.aggregator.len(),
            live_fps: core.aggregator.live_fps(now),
            timers: core.escalator.timers(now),
        })
    }

    /// Resolves once the pose source reports that it has no more frames.
    /// Returns immediately when no session is running.
    pub async fn source_ended(&self) {
        let Some(running) = self.active.as_ref() else {
            return;
        };
        let mut rx = running.shared.source_ended.subscribe();
        raised(&mut rx).await;
    }

    /// Sessions whose log could not be saved yet.
    pub fn unflushed_sessions(&self) -> &[SessionRecord] {
        &self.unflushed
    }

    /// Stops ticking and polling, drops the alarm without a response event and
    /// hands the session log to the store. A log the store rejects is kept and
    /// retried by [`Monitor::retry_flush`] or the next `stop`.
    pub async fn stop(&mut self) -> Result<SessionHandle, MonitorError> {
        let mut running = self.active.take().ok_or(MonitorError::SessionNotStarted)?;
        let shared = Arc::clone(&running.shared);

        shared.shutdown.send_replace(true);
        if let Some(tick) = running.tick_task.take() {
            if let Err(e) = tick.await {
                tracing::warn!(error = %e, "tick task ended abnormally");
            }
        }
        drop(running);

        let record = {
            let now = now();
            let mut core = shared.core.lock();
            core.alarm.force_idle(now);
            core.aggregator.finish(now)?
        };

        tracing::info!(
            session_id = %record.session_id,
            frames = record.stats.total_frames,
            alerts = record.stats.alerts_triggered,
            average_fps = record.average_fps,
            "monitoring stopped"
        );

        if !self.unflushed.is_empty() {
            if let Err(e) = self.retry_flush().await {
                tracing::warn!(error = %e, "earlier sessions still unsaved");
            }
        }

        match self.store.flush_session(&record).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::error!(
                    session_id = %record.session_id,
                    error = %e,
                    "session save failed, kept for retry"
                );
                self.unflushed.push(record);
                Err(e.into())
            }
        }
    }

    /// Saves every session the store rejected earlier. Stops at the first
    /// failure and keeps the rest.
    pub async fn retry_flush(&mut self) -> Result<Vec<SessionHandle>, MonitorError> {
        let mut pending = std::mem::take(&mut self.unflushed).into_iter();
        let mut handles = Vec::new();

        while let Some(record) = pending.next() {
            match self.store.flush_session(&record).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.unflushed.push(record);
                    self.unflushed.extend(pending);
                    return Err(e.into());
                }
            }
        }
        Ok(handles)
    }
}

/// Wall clock routed through Tokio so paused-time tests drive the timers.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Resolves once the flag is set or its sender is gone.
async fn raised(flag: &mut watch::Receiver<bool>) {
    loop {
        let set = *flag.borrow_and_update();
        if set || flag.changed().await.is_err() {
            return;
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn tick(shared: &Arc<Shared>) -> Result<TickOutcome, MonitorError> {
    if shared.in_flight.swap(true, Ordering::AcqRel) {
        tracing::trace!("tick still in flight, dropping");
        return Ok(TickOutcome::Skipped);
    }
    let _guard = InFlight(&shared.in_flight);

    let Some(poses) = shared.source.latest_poses().await? else {
        shared.source_ended.send_replace(true);
        return Ok(TickOutcome::Ended);
    };

    let (classification, action) = {
        let mut core = shared.core.lock();
        core.process(&poses, now())?
    };

    tracing::debug!(
        activity = %classification.activity,
        tier = %classification.tier,
        confidence = classification.confidence,
        "frame classified"
    );

    if let Some(action) = action {
        match &action {
            AlarmAction::Triggered(payload) => {
                tracing::warn!(
                    activity = %payload.activity,
                    duration = payload.duration,
                    "alarm armed"
                );
                start_poll_loop(shared);
            }
            AlarmAction::Responded => {
                tracing::info!(
                    activity = %classification.activity,
                    "driver responded, alarm cleared"
                );
                if let Some(poll) = shared.poll_task.lock().take() {
                    poll.abort();
                }
            }
        }
        if shared.events.send(action).is_err() {
            tracing::warn!("notification dispatcher is gone, alarm event dropped");
        }
    }

    Ok(TickOutcome::Classified(classification))
}

async fn tick_loop(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = tokio::time::interval(shared.settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = raised(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = raised(&mut shutdown) => break,
            outcome = tick(&shared) => outcome,
        };

        match outcome {
            Ok(TickOutcome::Ended) => {
                tracing::info!("pose source ended");
                break;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "tick failed"),
        }
    }
}

fn start_poll_loop(shared: &Arc<Shared>) {
    let armed_at = match shared.core.lock().alarm.state() {
        AlarmState::Armed { armed_at, .. } => armed_at,
        _ => return,
    };

    let handle = tokio::spawn(poll_loop(Arc::clone(shared), armed_at));
    if let Some(previous) = shared.poll_task.lock().replace(handle) {
        previous.abort();
    }
}

/// Checks delivery every poll interval until the alarm is notified or cleared.
/// A failed check changes nothing; the next interval is the retry.
async fn poll_loop(shared: Arc<Shared>, armed_at: Instant) {
    let period = shared.settings.poll_interval;
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = raised(&mut shutdown) => return,
            _ = ticker.tick() => {}
        }

        {
            let now = now();
            let mut core = shared.core.lock();
            if !is_same_arming(core.alarm.state(), armed_at) {
                return;
            }
            if !core.alarm.poll_due(now) {
                continue;
            }
            core.alarm.mark_polled(now);
        }

        let polled =
            channel::poll_delivery(shared.channel.as_ref(), shared.settings.notify_timeout).await;
        match polled {
            Ok(status) => {
                let mut core = shared.core.lock();
                if !is_same_arming(core.alarm.state(), armed_at) {
                    return;
                }
                if core.alarm.on_delivery_status(status.delivered, now()) {
                    tracing::warn!("external alert delivered, polling stopped");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(
                    channel = shared.channel.name(),
                    error = %e,
                    "delivery status check failed"
                );
            }
        }
    }
}

fn is_same_arming(state: AlarmState, armed_at: Instant) -> bool {
    matches!(state, AlarmState::Armed { armed_at: at, .. } if at == armed_at)
}

async fn dispatch_loop(
    channel: Arc<dyn NotificationChannel>,
    mut events: mpsc::UnboundedReceiver<AlarmAction>,
    timeout: Duration,
) {
    while let Some(action) = events.recv().await {
        channel::deliver_action(Arc::clone(&channel), action, timeout).await;
    }
}
