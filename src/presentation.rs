use serde::{Deserialize, Serialize};

use crate::alarm::AlarmStatus;
use crate::escalator::TimerSnapshot;
use crate::session_log::SessionStats;
use crate::types::{AlertTier, Classification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierStyle {
    pub color: &'static str,
    pub icon: &'static str,
}

pub const fn tier_style(tier: AlertTier) -> TierStyle {
    match tier {
        AlertTier::Safe => TierStyle {
            color: "#4caf50",
            icon: "✅",
        },
        AlertTier::Caution => TierStyle {
            color: "#ff9800",
            icon: "⚠️",
        },
        AlertTier::Warning => TierStyle {
            color: "#ff5722",
            icon: "⚠️",
        },
        AlertTier::Critical => TierStyle {
            color: "#f44336",
            icon: "🚨",
        },
    }
}

/// `looking_down_phone` -> `Looking Down Phone`
pub fn activity_display(label: &str) -> String {
    label
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Consistent read of a running session, taken under the session lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub session_id: Option<String>,
    pub latest: Option<Classification>,
    pub alarm: AlarmStatus,
    pub stats: SessionStats,
    pub logged_entries: usize,
    pub live_fps: f64,
    #[serde(skip)]
    pub timers: TimerSnapshot,
}

impl MonitorSnapshot {
    pub fn style(&self) -> Option<TierStyle> {
        self.latest.as_ref().map(|c| tier_style(c.tier))
    }

    /// One status line, e.g. `🚨 CRITICAL Sleeping Eyes Closed (92%)`.
    pub fn headline(&self) -> String {
        match &self.latest {
            Some(c) => format!(
                "{} {} {} ({:.0}%)",
                tier_style(c.tier).icon,
                c.tier,
                activity_display(c.activity.as_str()),
                c.confidence * 100.0
            ),
            None => "waiting for first frame".to_string(),
        }
    }
}
