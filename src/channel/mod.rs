//! Notification channel seam and the call-site dispatch policy around it.
//!
//! The alarm state machine never talks to a channel directly. The monitoring
//! session spawns these calls as tasks, bounded by a timeout, so a slow or broken
//! channel cannot stall classification.

mod http;
mod responder;

pub use http::HttpChannel;
pub use responder::{
    CallMeBotMessenger, Messenger, MessengerStatus, ResponderStatus, ResponseTimeoutChannel,
    SentAlert,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmAction, AlarmPayload};
use crate::config::{Config, NotifyMode};
use crate::error::ChannelError;

const EMIT_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub delivered: bool,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn alarm_triggered(&self, payload: &AlarmPayload) -> Result<(), ChannelError>;

    async fn driver_responded(&self) -> Result<(), ChannelError>;

    async fn poll_delivery_status(&self) -> Result<DeliveryStatus, ChannelError>;
}

/// Accepts every event and never reports delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledChannel;

#[async_trait]
impl NotificationChannel for DisabledChannel {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn alarm_triggered(&self, _payload: &AlarmPayload) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn driver_responded(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn poll_delivery_status(&self) -> Result<DeliveryStatus, ChannelError> {
        Ok(DeliveryStatus::default())
    }
}

pub fn channel_from_config(config: &Config) -> Arc<dyn NotificationChannel> {
    match config.notify_mode {
        NotifyMode::Http => match &config.notify_base_url {
            Some(base_url) => Arc::new(HttpChannel::new(base_url.clone())),
            None => {
                tracing::warn!("NOTIFY_MODE=http without NOTIFY_BASE_URL, notifications disabled");
                Arc::new(DisabledChannel)
            }
        },
        NotifyMode::Local => {
            let messenger = CallMeBotMessenger::new(
                config.callmebot_phone.clone(),
                config.callmebot_api_key.clone(),
                config.message_cooldown,
            );
            Arc::new(ResponseTimeoutChannel::new(
                config.response_timeout,
                Arc::new(messenger),
            ))
        }
        NotifyMode::Disabled => Arc::new(DisabledChannel),
    }
}

/// Carries out an alarm side effect, retrying with exponential backoff.
/// Failures are logged and dropped; they never reach the classification path.
pub async fn deliver_action(
    channel: Arc<dyn NotificationChannel>,
    action: AlarmAction,
    timeout: Duration,
) -> bool {
    for attempt in 0..EMIT_ATTEMPTS {
        let call = async {
            match &action {
                AlarmAction::Triggered(payload) => channel.alarm_triggered(payload).await,
                AlarmAction::Responded => channel.driver_responded().await,
            }
        };

        match with_timeout(timeout, call).await {
            Ok(()) => {
                tracing::debug!(
                    channel = channel.name(),
                    event = action_name(&action),
                    "notification delivered"
                );
                return true;
            }
            Err(e) => {
                tracing::warn!(
                    channel = channel.name(),
                    event = action_name(&action),
                    attempt = attempt + 1,
                    error = %e,
                    "notification failed"
                );
            }
        }

        if attempt + 1 < EMIT_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS * (1 << attempt))).await;
        }
    }

    tracing::error!(
        channel = channel.name(),
        event = action_name(&action),
        "notification dropped after {EMIT_ATTEMPTS} attempts"
    );
    false
}

/// Single bounded delivery check. The next poll tick is the retry.
pub async fn poll_delivery(
    channel: &dyn NotificationChannel,
    timeout: Duration,
) -> Result<DeliveryStatus, ChannelError> {
    with_timeout(timeout, channel.poll_delivery_status()).await
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ChannelError>
where
    F: std::future::Future<Output = Result<T, ChannelError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout(timeout.as_millis() as u64)),
    }
}

fn action_name(action: &AlarmAction) -> &'static str {
    match action {
        AlarmAction::Triggered(_) => "alarm_triggered",
        AlarmAction::Responded => "driver_responded",
    }
}
