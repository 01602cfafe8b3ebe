//! Duration-based tier escalation.
//!
//! Each escalatable condition has its own timer. Eyes-closed and looking-down share
//! the Caution → Warning → Critical ladder; looking-away tops out at Warning and never
//! raises the alarm. Any safe frame clears every timer.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::classifier::{Condition, Observation};
use crate::types::{secs, Activity, AlertTier, Classification, ClassificationDetails, Direction};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationThresholds {
    pub warning_after: Duration,
    pub critical_after: Duration,
    /// Looking away becomes a warning only once strictly longer than this.
    pub looking_away_warning_after: Duration,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            warning_after: Duration::from_secs(2),
            critical_after: Duration::from_secs(5),
            looking_away_warning_after: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationTimer {
    start: Option<Instant>,
}

impl DurationTimer {
    /// Starts the timer if idle and returns the time elapsed since it started.
    pub fn observe(&mut self, now: Instant) -> Duration {
        let start = *self.start.get_or_insert(now);
        now.saturating_duration_since(start)
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.start.map(|start| now.saturating_duration_since(start))
    }

    pub fn is_running(&self) -> bool {
        self.start.is_some()
    }

    pub fn clear(&mut self) {
        self.start = None;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimerSnapshot {
    pub eyes_closed: Option<Duration>,
    pub looking_down: Option<Duration>,
    pub looking_away: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct DurationEscalator {
    thresholds: EscalationThresholds,
    eyes_closed: DurationTimer,
    looking_down: DurationTimer,
    looking_away: DurationTimer,
}

impl DurationEscalator {
    pub fn new(thresholds: EscalationThresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn thresholds(&self) -> &EscalationThresholds {
        &self.thresholds
    }

    pub fn timers(&self, now: Instant) -> TimerSnapshot {
        TimerSnapshot {
            eyes_closed: self.eyes_closed.elapsed(now),
            looking_down: self.looking_down.elapsed(now),
            looking_away: self.looking_away.elapsed(now),
        }
    }

    pub fn reset(&mut self) {
        self.eyes_closed.clear();
        self.looking_down.clear();
        self.looking_away.clear();
    }

    pub fn escalate(&mut self, observation: Observation, now: Instant) -> Classification {
        let confidence = observation.confidence;
        let classification = match observation.condition {
            Condition::NoDriver => classification(
                Activity::NoDriverDetected,
                confidence,
                AlertTier::Caution,
                ClassificationDetails::message("No driver detected in frame"),
            ),
            Condition::LowConfidence => classification(
                Activity::LowConfidence,
                confidence,
                AlertTier::Caution,
                ClassificationDetails::message("Driver detection confidence too low"),
            ),
            Condition::EyesClosed => {
                // Eyes-closed and looking-down are exclusive; switching restarts the clock.
                self.looking_down.clear();
                let elapsed = self.eyes_closed.observe(now);
                self.eyes_closed_verdict(elapsed, confidence)
            }
            Condition::LookingDown => {
                // See above.
                self.eyes_closed.clear();
                let elapsed = self.looking_down.observe(now);
                self.looking_down_verdict(elapsed, confidence)
            }
            Condition::LookingAway(direction) => {
                let elapsed = self.looking_away.observe(now);
                self.looking_away_verdict(direction, elapsed, confidence)
            }
            Condition::Safe => {
                self.reset();
                classification(
                    Activity::EyesOnRoad,
                    confidence,
                    AlertTier::Safe,
                    ClassificationDetails::message("Driver is alert and focused"),
                )
            }
        };

        // Holds by construction; catches a match arm that forgets to clear.
        debug_assert!(
            !(self.eyes_closed.is_running() && self.looking_down.is_running()),
            "eyes-closed and looking-down timers must never run together"
        );

        classification
    }

    fn eyes_closed_verdict(&self, elapsed: Duration, confidence: f64) -> Classification {
        let d = secs(elapsed);
        let (activity, tier, message, alarm_reason) = match self.ladder(elapsed) {
            AlertTier::Critical => (
                Activity::SleepingEyesClosed,
                AlertTier::Critical,
                format!("CRITICAL: Eyes closed for {d:.1}s!"),
                Some(format!("Eyes closed for {d:.1} seconds - WAKE UP!")),
            ),
            AlertTier::Warning => (
                Activity::DrowsyEyesClosing,
                AlertTier::Warning,
                format!("WARNING: Eyes closing for {d:.1}s"),
                Some(format!(
                    "Eyes closing - {:.1}s until alarm",
                    self.until_critical(elapsed)
                )),
            ),
            _ => (
                Activity::DrowsyEyesClosing,
                AlertTier::Caution,
                "Eyes closing...".to_string(),
                None,
            ),
        };

        classification(
            activity,
            confidence,
            tier,
            ClassificationDetails {
                message,
                eyes_closed_duration: d,
                alarm_reason,
                ..Default::default()
            },
        )
    }

    fn looking_down_verdict(&self, elapsed: Duration, confidence: f64) -> Classification {
        let d = secs(elapsed);
        let (activity, tier, message, alarm_reason) = match self.ladder(elapsed) {
            AlertTier::Critical => (
                Activity::LookingDownPhone,
                AlertTier::Critical,
                format!("CRITICAL: Looking down for {d:.1}s!"),
                Some(format!("Looking down for {d:.1} seconds - Eyes on road!")),
            ),
            AlertTier::Warning => (
                Activity::LookingDownWarning,
                AlertTier::Warning,
                format!("WARNING: Looking down for {d:.1}s"),
                Some(format!(
                    "Looking down - {:.1}s until alarm",
                    self.until_critical(elapsed)
                )),
            ),
            _ => (
                Activity::LookingDownWarning,
                AlertTier::Caution,
                "Looking down...".to_string(),
                None,
            ),
        };

        classification(
            activity,
            confidence,
            tier,
            ClassificationDetails {
                message,
                looking_down_duration: d,
                alarm_reason,
                ..Default::default()
            },
        )
    }

    fn looking_away_verdict(
        &self,
        direction: Direction,
        elapsed: Duration,
        confidence: f64,
    ) -> Classification {
        let d = secs(elapsed);
        let side = direction.as_str();
        let (tier, message) = if elapsed > self.thresholds.looking_away_warning_after {
            (AlertTier::Warning, format!("Looking {side} for {d:.1}s"))
        } else {
            (AlertTier::Caution, format!("Checking {side} mirror"))
        };

        classification(
            Activity::looking(direction),
            confidence,
            tier,
            ClassificationDetails {
                message,
                looking_away_duration: d,
                ..Default::default()
            },
        )
    }

    fn ladder(&self, elapsed: Duration) -> AlertTier {
        if elapsed >= self.thresholds.critical_after {
            AlertTier::Critical
        } else if elapsed >= self.thresholds.warning_after {
            AlertTier::Warning
        } else {
            AlertTier::Caution
        }
    }

    fn until_critical(&self, elapsed: Duration) -> f64 {
        secs(self.thresholds.critical_after.saturating_sub(elapsed))
    }
}

fn classification(
    activity: Activity,
    confidence: f64,
    tier: AlertTier,
    details: ClassificationDetails,
) -> Classification {
    Classification {
        activity,
        confidence,
        tier,
        trigger_alarm: tier == AlertTier::Critical,
        details,
        timestamp: Utc::now(),
    }
}
