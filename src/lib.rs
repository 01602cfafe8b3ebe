//! Driver attentiveness monitoring: per-frame pose classification, duration-based
//! alert escalation, alarm arming with external notification, and per-session
//! behavior logs.

pub mod alarm;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod escalator;
pub mod logging;
pub mod monitor;
pub mod persistence;
pub mod pose;
pub mod presentation;
pub mod session_log;
pub mod source;
pub mod types;

pub use alarm::{AlarmAction, AlarmPayload, AlarmState, AlarmStateMachine, AlarmStatus};
pub use channel::{DeliveryStatus, NotificationChannel};
pub use classifier::{BehaviorClassifier, Condition, Observation};
pub use config::Config;
pub use error::{ChannelError, MonitorError, StoreError};
pub use escalator::DurationEscalator;
pub use monitor::{Monitor, MonitorSettings, TickOutcome};
pub use persistence::{JsonFileStore, SessionHandle, SessionStore};
pub use pose::{Keypoint, KeypointName, Pose};
pub use presentation::MonitorSnapshot;
pub use session_log::{SessionAggregator, SessionRecord};
pub use source::{LiveFeed, LiveSource, PoseSource, ReplaySource};
pub use types::{Activity, AlertTier, Classification, ClassificationDetails};
