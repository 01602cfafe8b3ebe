use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::{secs, Activity, AlertTier, Classification};

/// Alarm workflow state for one monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Idle,
    Armed {
        armed_at: Instant,
        last_poll_at: Instant,
    },
    Notified {
        armed_at: Instant,
        notified_at: Instant,
    },
}

impl AlarmState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Idle => "IDLE",
            AlarmState::Armed { .. } => "ARMED",
            AlarmState::Notified { .. } => "NOTIFIED",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, AlarmState::Idle)
    }

    pub fn armed_at(&self) -> Option<Instant> {
        match *self {
            AlarmState::Idle => None,
            AlarmState::Armed { armed_at, .. } | AlarmState::Notified { armed_at, .. } => {
                Some(armed_at)
            }
        }
    }
}

/// Body of the "alarm triggered" event handed to the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub activity: Activity,
    pub confidence: f64,
    /// Seconds the triggering condition had persisted.
    pub duration: f64,
    pub tier: AlertTier,
}

impl AlarmPayload {
    pub fn from_classification(classification: &Classification) -> Self {
        Self {
            activity: classification.activity,
            confidence: classification.confidence,
            duration: classification.details.active_duration(),
            tier: classification.tier,
        }
    }
}

/// Side effect the caller must carry out against the notification channel.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmAction {
    Triggered(AlarmPayload),
    Responded,
}

#[derive(Debug, Clone)]
pub struct AlarmTransition {
    pub from: &'static str,
    pub to: &'static str,
    pub reason: String,
    pub at: Instant,
}

/// Serializable view of the alarm for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmStatus {
    pub state: String,
    pub armed_for_secs: Option<f64>,
    pub notified: bool,
    pub times_armed: u64,
}

const HISTORY_LIMIT: usize = 100;

/// Arms on the first alarm-worthy classification, polls the channel while armed,
/// and disarms when the driver recovers. Transition logic is synchronous; every
/// network side effect is returned to the caller as an [`AlarmAction`].
#[derive(Debug)]
pub struct AlarmStateMachine {
    state: AlarmState,
    poll_interval: Duration,
    history: Vec<AlarmTransition>,
    times_armed: u64,
}

impl AlarmStateMachine {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: AlarmState::Idle,
            poll_interval,
            history: Vec::new(),
            times_armed: 0,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn times_armed(&self) -> u64 {
        self.times_armed
    }

    pub fn history(&self) -> &[AlarmTransition] {
        &self.history
    }

    pub fn status(&self, now: Instant) -> AlarmStatus {
        AlarmStatus {
            state: self.state.as_str().to_string(),
            armed_for_secs: self
                .state
                .armed_at()
                .map(|armed_at| secs(now.saturating_duration_since(armed_at))),
            notified: matches!(self.state, AlarmState::Notified { .. }),
            times_armed: self.times_armed,
        }
    }

    pub fn on_classification(
        &mut self,
        classification: &Classification,
        now: Instant,
    ) -> Option<AlarmAction> {
        if self.state.is_active() && classification.is_recovery() {
            self.transition(
                AlarmState::Idle,
                format!("driver recovered ({})", classification.activity),
                now,
            );
            return Some(AlarmAction::Responded);
        }

        if classification.trigger_alarm && !self.state.is_active() {
            self.transition(
                AlarmState::Armed {
                    armed_at: now,
                    last_poll_at: now,
                },
                format!("{} at {}", classification.activity, classification.tier),
                now,
            );
            self.times_armed = self.times_armed.saturating_add(1);
            return Some(AlarmAction::Triggered(AlarmPayload::from_classification(
                classification,
            )));
        }

        None
    }

    /// True once a full poll interval has passed since the last delivery check.
    pub fn poll_due(&self, now: Instant) -> bool {
        match self.state {
            AlarmState::Armed { last_poll_at, .. } => {
                now.saturating_duration_since(last_poll_at) >= self.poll_interval
            }
            _ => false,
        }
    }

    /// Records that a delivery check went out, whatever its outcome.
    pub fn mark_polled(&mut self, now: Instant) {
        if let AlarmState::Armed { last_poll_at, .. } = &mut self.state {
            *last_poll_at = now;
        }
    }

    /// Applies a poll result. Returns true when the alarm moved to `Notified`.
    pub fn on_delivery_status(&mut self, delivered: bool, now: Instant) -> bool {
        let AlarmState::Armed { armed_at, .. } = self.state else {
            return false;
        };
        if !delivered {
            return false;
        }
        self.transition(
            AlarmState::Notified {
                armed_at,
                notified_at: now,
            },
            "external message delivered",
            now,
        );
        true
    }

    /// Drops back to `Idle` without a response event, used when a session stops.
    pub fn force_idle(&mut self, now: Instant) {
        if self.state.is_active() {
            self.transition(AlarmState::Idle, "session stopped", now);
        }
    }

    fn transition(&mut self, target: AlarmState, reason: impl Into<String>, now: Instant) {
        let transition = AlarmTransition {
            from: self.state.as_str(),
            to: target.as_str(),
            reason: reason.into(),
            at: now,
        };
        tracing::debug!(
            from = transition.from,
            to = transition.to,
            reason = %transition.reason,
            "alarm transition"
        );

        self.state = target;
        self.history.push(transition);
        if self.history.len() > HISTORY_LIMIT {
            let extra = self.history.len() - HISTORY_LIMIT;
            self.history.drain(0..extra);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::ClassificationDetails;

    fn frame(activity: Activity, tier: AlertTier) -> Classification {
        Classification {
            activity,
            confidence: 0.9,
            tier,
            trigger_alarm: tier == AlertTier::Critical,
            details: ClassificationDetails {
                eyes_closed_duration: 5.4,
                ..Default::default()
            },
            timestamp: Utc::now(),
        }
    }

    fn critical() -> Classification {
        frame(Activity::SleepingEyesClosed, AlertTier::Critical)
    }

    fn safe() -> Classification {
        frame(Activity::EyesOnRoad, AlertTier::Safe)
    }

    #[test]
    fn arms_once_across_repeated_critical_frames() {
        let t0 = Instant::now();
        let mut alarm = AlarmStateMachine::new(Duration::from_secs(2));

        let first = alarm.on_classification(&critical(), t0);
        match first {
            Some(AlarmAction::Triggered(payload)) => {
                assert_eq!(payload.activity, Activity::SleepingEyesClosed);
                assert_eq!(payload.tier, AlertTier::Critical);
                assert_eq!(payload.duration, 5.4);
            }
            other => panic!("expected trigger, got {other:?}"),
        }

        for i in 1..=50 {
            let now = t0 + Duration::from_millis(200 * i);
            assert_eq!(alarm.on_classification(&critical(), now), None);
        }
        assert_eq!(alarm.state().armed_at(), Some(t0));
        assert_eq!(alarm.times_armed(), 1);
    }

    #[test]
    fn poll_cadence_and_notification() {
        let t0 = Instant::now();
        let mut alarm = AlarmStateMachine::new(Duration::from_secs(2));
        alarm.on_classification(&critical(), t0);

        assert!(!alarm.poll_due(t0 + Duration::from_millis(1999)));
        let first_poll = t0 + Duration::from_secs(2);
        assert!(alarm.poll_due(first_poll));

        alarm.mark_polled(first_poll);
        assert!(!alarm.on_delivery_status(false, first_poll));
        assert!(!alarm.poll_due(first_poll + Duration::from_secs(1)));

        let second_poll = first_poll + Duration::from_secs(2);
        alarm.mark_polled(second_poll);
        assert!(alarm.on_delivery_status(true, second_poll));
        assert!(matches!(alarm.state(), AlarmState::Notified { .. }));
        assert!(!alarm.poll_due(second_poll + Duration::from_secs(60)));
    }

    #[test]
    fn recovery_disarms_and_next_critical_rearms() {
        let t0 = Instant::now();
        let mut alarm = AlarmStateMachine::new(Duration::from_secs(2));
        alarm.on_classification(&critical(), t0);
        alarm.on_delivery_status(true, t0 + Duration::from_secs(10));

        let later = t0 + Duration::from_secs(11);
        assert_eq!(alarm.on_classification(&safe(), later), Some(AlarmAction::Responded));
        assert_eq!(alarm.state(), AlarmState::Idle);
        assert_eq!(alarm.on_classification(&safe(), later), None);

        let rearm = t0 + Duration::from_secs(20);
        assert!(matches!(
            alarm.on_classification(&critical(), rearm),
            Some(AlarmAction::Triggered(_))
        ));
        assert_eq!(alarm.state().armed_at(), Some(rearm));
        assert_eq!(alarm.times_armed(), 2);
    }

    #[test]
    fn active_activity_disarms_even_without_safe_tier() {
        let t0 = Instant::now();
        let mut alarm = AlarmStateMachine::new(Duration::from_secs(2));
        alarm.on_classification(&critical(), t0);

        let response = frame(Activity::Active, AlertTier::Caution);
        assert_eq!(
            alarm.on_classification(&response, t0 + Duration::from_secs(1)),
            Some(AlarmAction::Responded)
        );
    }

    #[test]
    fn non_critical_frames_leave_idle_alone() {
        let t0 = Instant::now();
        let mut alarm = AlarmStateMachine::new(Duration::from_secs(2));
        let warning = frame(Activity::DrowsyEyesClosing, AlertTier::Warning);
        assert_eq!(alarm.on_classification(&warning, t0), None);
        assert_eq!(alarm.on_classification(&safe(), t0), None);
        assert!(alarm.history().is_empty());
    }

    #[test]
    fn force_idle_emits_nothing() {
        let t0 = Instant::now();
        let mut alarm = AlarmStateMachine::new(Duration::from_secs(2));
        alarm.on_classification(&critical(), t0);
        alarm.force_idle(t0 + Duration::from_secs(1));

        assert_eq!(alarm.state(), AlarmState::Idle);
        let last = alarm.history().last().expect("transition recorded");
        assert_eq!(last.reason, "session stopped");
    }
}
