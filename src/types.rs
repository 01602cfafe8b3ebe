//! Core data types shared by the classifier, escalator, alarm and session log.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of the driver's current state. Ordering drives alarm arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertTier {
    Safe,
    Caution,
    Warning,
    Critical,
}

impl AlertTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Caution => "CAUTION",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SAFE" => Some(Self::Safe),
            "CAUTION" => Some(Self::Caution),
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Activity label attached to every classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    NoDriverDetected,
    LowConfidence,
    DrowsyEyesClosing,
    SleepingEyesClosed,
    LookingDownWarning,
    LookingDownPhone,
    LookingLeft,
    LookingRight,
    EyesOnRoad,
    /// Reported by collaborators when the driver visibly reacts to an alarm.
    Active,
}

impl Activity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoDriverDetected => "no_driver_detected",
            Self::LowConfidence => "low_confidence",
            Self::DrowsyEyesClosing => "drowsy_eyes_closing",
            Self::SleepingEyesClosed => "sleeping_eyes_closed",
            Self::LookingDownWarning => "looking_down_warning",
            Self::LookingDownPhone => "looking_down_phone",
            Self::LookingLeft => "looking_left",
            Self::LookingRight => "looking_right",
            Self::EyesOnRoad => "eyes_on_road",
            Self::Active => "active",
        }
    }

    pub const fn looking(direction: Direction) -> Self {
        match direction {
            Direction::Left => Self::LookingLeft,
            Direction::Right => Self::LookingRight,
        }
    }

    /// Activities that count as the driver having responded to an alarm.
    pub const fn is_recovery(self) -> bool {
        matches!(self, Self::EyesOnRoad | Self::Active)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDetails {
    pub message: String,
    /// Seconds, 0 when the condition is not active this frame.
    pub eyes_closed_duration: f64,
    pub looking_down_duration: f64,
    pub looking_away_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_reason: Option<String>,
}

impl ClassificationDetails {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Longest running condition this frame, in seconds.
    pub fn active_duration(&self) -> f64 {
        self.eyes_closed_duration
            .max(self.looking_down_duration)
            .max(self.looking_away_duration)
    }
}

/// One tick's verdict. Consumed by the alarm state machine and the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub activity: Activity,
    pub confidence: f64,
    pub tier: AlertTier,
    pub trigger_alarm: bool,
    pub details: ClassificationDetails,
    pub timestamp: DateTime<Utc>,
}

impl Classification {
    pub fn is_recovery(&self) -> bool {
        self.tier == AlertTier::Safe || self.activity.is_recovery()
    }
}

pub(crate) fn secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}
