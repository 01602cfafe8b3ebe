use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::types::{secs, Activity, AlertTier, Classification, ClassificationDetails};

pub const LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Seconds since the session started.
    pub relative_time: f64,
    pub activity: Activity,
    pub tier: AlertTier,
    pub confidence: f64,
    pub details: ClassificationDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_frames: u64,
    pub alerts_triggered: u64,
    pub per_activity_counts: BTreeMap<Activity, u64>,
}

/// Everything handed to the session store when monitoring stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub average_fps: f64,
    pub stats: SessionStats,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug)]
struct ActiveSession {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    entries: VecDeque<LogEntry>,
    stats: SessionStats,
}

/// Bounded per-session behavior log plus running counters.
#[derive(Debug)]
pub struct SessionAggregator {
    capacity: usize,
    active: Option<ActiveSession>,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.id.as_str())
    }

    pub fn start(&mut self, now: Instant) -> Result<String, MonitorError> {
        if self.active.is_some() {
            return Err(MonitorError::SessionAlreadyActive);
        }

        let started_at = Utc::now();
        let id = session_id_for(started_at);
        self.active = Some(ActiveSession {
            id: id.clone(),
            started_at,
            started: now,
            entries: VecDeque::with_capacity(self.capacity),
            stats: SessionStats::default(),
        });
        Ok(id)
    }

    pub fn record(
        &mut self,
        classification: &Classification,
        now: Instant,
    ) -> Result<(), MonitorError> {
        let capacity = self.capacity;
        let session = self.active.as_mut().ok_or(MonitorError::SessionNotStarted)?;

        session.stats.total_frames += 1;
        session.entries.push_back(LogEntry {
            timestamp: classification.timestamp,
            relative_time: secs(now.saturating_duration_since(session.started)),
            activity: classification.activity,
            tier: classification.tier,
            confidence: classification.confidence,
            details: classification.details.clone(),
        });
        while session.entries.len() > capacity {
            session.entries.pop_front();
        }

        if classification.trigger_alarm {
            session.stats.alerts_triggered += 1;
        }
        *session
            .stats
            .per_activity_counts
            .entry(classification.activity)
            .or_insert(0) += 1;

        Ok(())
    }

    pub fn stats(&self) -> Option<&SessionStats> {
        self.active.as_ref().map(|s| &s.stats)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.active.iter().flat_map(|s| s.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.active.as_ref().map_or(0, |s| s.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_fps(&self, now: Instant) -> f64 {
        self.active.as_ref().map_or(0.0, |s| {
            fps(s.stats.total_frames, secs(now.saturating_duration_since(s.started)))
        })
    }

    /// Closes the session and returns its record; in-memory state is discarded.
    pub fn finish(&mut self, now: Instant) -> Result<SessionRecord, MonitorError> {
        let session = self.active.take().ok_or(MonitorError::SessionNotStarted)?;
        let duration_secs = secs(now.saturating_duration_since(session.started));

        Ok(SessionRecord {
            session_id: session.id,
            started_at: session.started_at,
            ended_at: Utc::now(),
            duration_secs,
            average_fps: fps(session.stats.total_frames, duration_secs),
            stats: session.stats,
            entries: session.entries.into_iter().collect(),
        })
    }
}

fn fps(frames: u64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        frames as f64 / duration_secs
    } else {
        0.0
    }
}

pub fn session_id_for(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y-%m-%dT%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;

    fn frame(n: usize, tier: AlertTier) -> Classification {
        Classification {
            activity: if tier == AlertTier::Critical {
                Activity::SleepingEyesClosed
            } else {
                Activity::EyesOnRoad
            },
            confidence: n as f64 / 10_000.0,
            tier,
            trigger_alarm: tier == AlertTier::Critical,
            details: ClassificationDetails::message(format!("frame {n}")),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn record_before_start_is_rejected() {
        let mut log = SessionAggregator::new();
        let result = log.record(&frame(0, AlertTier::Safe), Instant::now());
        assert!(matches!(result, Err(MonitorError::SessionNotStarted)));
    }

    #[test]
    fn double_start_is_rejected() {
        let mut log = SessionAggregator::new();
        log.start(Instant::now()).expect("first start");
        assert!(matches!(
            log.start(Instant::now()),
            Err(MonitorError::SessionAlreadyActive)
        ));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let t0 = Instant::now();
        let mut log = SessionAggregator::new();
        log.start(t0).expect("start");

        for n in 1..=1001 {
            log.record(&frame(n, AlertTier::Safe), t0).expect("record");
        }

        assert_eq!(log.len(), 1000);
        let messages: Vec<_> = log.entries().map(|e| e.details.message.clone()).collect();
        assert_eq!(messages.first().map(String::as_str), Some("frame 2"));
        assert_eq!(messages.last().map(String::as_str), Some("frame 1001"));
        assert_eq!(log.stats().map(|s| s.total_frames), Some(1001));
    }

    #[test]
    fn counters_track_alerts_and_activities() {
        let t0 = Instant::now();
        let mut log = SessionAggregator::new();
        log.start(t0).expect("start");

        log.record(&frame(1, AlertTier::Safe), t0).expect("record");
        log.record(&frame(2, AlertTier::Critical), t0).expect("record");
        log.record(&frame(3, AlertTier::Critical), t0).expect("record");

        let stats = log.stats().expect("active");
        assert_eq!(stats.alerts_triggered, 2);
        assert_eq!(stats.per_activity_counts.get(&Activity::SleepingEyesClosed), Some(&2));
        assert_eq!(stats.per_activity_counts.get(&Activity::EyesOnRoad), Some(&1));
    }

    #[test]
    fn finish_reports_average_fps_and_clears_state() {
        let t0 = Instant::now();
        let mut log = SessionAggregator::new();
        log.start(t0).expect("start");
        for n in 0..50 {
            let now = t0 + Duration::from_millis(200 * n as u64);
            log.record(&frame(n, AlertTier::Safe), now).expect("record");
        }

        let record = log.finish(t0 + Duration::from_secs(10)).expect("finish");
        assert_eq!(record.entries.len(), 50);
        assert!((record.average_fps - 5.0).abs() < 1e-9);
        assert!((record.entries[5].relative_time - 1.0).abs() < 1e-9);
        assert!(!log.is_active());
        assert!(matches!(
            log.finish(t0),
            Err(MonitorError::SessionNotStarted)
        ));
    }

    #[test]
    fn session_id_is_filesystem_safe() {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(session_id_for(started), "2024-03-09T14-05-07");
    }

    #[test]
    fn stats_serialize_activity_keys_as_labels() {
        let mut stats = SessionStats::default();
        stats.per_activity_counts.insert(Activity::LookingLeft, 3);
        let value = serde_json::to_value(&stats).expect("serializable");
        assert_eq!(value["per_activity_counts"]["looking_left"], 3);
    }
}
