#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use driver_monitor::{
    AlarmPayload, ChannelError, DeliveryStatus, Keypoint, KeypointName, NotificationChannel,
    Pose, SessionHandle, SessionRecord, SessionStore, StoreError,
};

pub fn attentive() -> Pose {
    Pose::new(0.9)
        .with_keypoint(Keypoint::new(KeypointName::Nose, 320.0, 200.0, 0.95))
        .with_keypoint(Keypoint::new(KeypointName::LeftEye, 340.0, 180.0, 0.9))
        .with_keypoint(Keypoint::new(KeypointName::RightEye, 300.0, 180.0, 0.9))
        .with_keypoint(Keypoint::new(KeypointName::LeftEar, 360.0, 185.0, 0.6))
        .with_keypoint(Keypoint::new(KeypointName::RightEar, 280.0, 185.0, 0.6))
        .with_keypoint(Keypoint::new(KeypointName::LeftShoulder, 400.0, 300.0, 0.9))
        .with_keypoint(Keypoint::new(KeypointName::RightShoulder, 240.0, 300.0, 0.9))
}

pub fn eyes_closed() -> Pose {
    attentive()
        .with_keypoint(Keypoint::new(KeypointName::LeftEye, 340.0, 180.0, 0.1))
        .with_keypoint(Keypoint::new(KeypointName::RightEye, 300.0, 180.0, 0.1))
}

pub fn looking_left() -> Pose {
    attentive()
        .with_keypoint(Keypoint::new(KeypointName::LeftEar, 320.0, 185.0, 0.8))
        .with_keypoint(Keypoint::new(KeypointName::RightEar, 280.0, 185.0, 0.1))
}

/// Notification channel that records every call.
#[derive(Default)]
pub struct RecordingChannel {
    pub triggered: AtomicU32,
    pub responded: AtomicU32,
    pub polls: AtomicU32,
    pub deliver: AtomicBool,
    pub fail_triggers: AtomicBool,
    pub fail_polls: AtomicBool,
    pub payloads: Mutex<Vec<AlarmPayload>>,
}

impl RecordingChannel {
    pub fn triggered(&self) -> u32 {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn responded(&self) -> u32 {
        self.responded.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn alarm_triggered(&self, payload: &AlarmPayload) -> Result<(), ChannelError> {
        if self.fail_triggers.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConfigured("recording channel offline"));
        }
        self.triggered.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().push(payload.clone());
        Ok(())
    }

    async fn driver_responded(&self) -> Result<(), ChannelError> {
        self.responded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn poll_delivery_status(&self) -> Result<DeliveryStatus, ChannelError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_polls.load(Ordering::SeqCst) {
            return Err(ChannelError::Timeout(5_000));
        }
        Ok(DeliveryStatus {
            delivered: self.deliver.load(Ordering::SeqCst),
        })
    }
}

/// Session store that keeps flushed records in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<SessionRecord>>,
    pub fail: AtomicBool,
    pub attempts: AtomicU32,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn flush_session(&self, record: &SessionRecord) -> Result<SessionHandle, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.records.lock().push(record.clone());
        Ok(SessionHandle {
            session_id: record.session_id.clone(),
            log_path: format!("behavior_log_{}.json", record.session_id).into(),
            summary_path: format!("session_summary_{}.json", record.session_id).into(),
        })
    }
}
