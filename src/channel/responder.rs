use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{DeliveryStatus, NotificationChannel};
use crate::alarm::AlarmPayload;
use crate::error::ChannelError;

const CALLMEBOT_ENDPOINT: &str = "https://api.callmebot.com/whatsapp.php";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HISTORY: usize = 50;

/// Outbound message transport with its own rate limit.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn is_configured(&self) -> bool;

    /// `force` bypasses the cooldown; reserved for test messages.
    async fn send(&self, message: &str, force: bool) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerStatus {
    pub configured: bool,
    pub can_send: bool,
    pub cooldown_remaining_secs: u64,
    pub last_sent: Option<DateTime<Utc>>,
}

/// WhatsApp delivery through the CallMeBot HTTP API.
pub struct CallMeBotMessenger {
    client: reqwest::Client,
    phone: Option<String>,
    api_key: Option<String>,
    cooldown: Duration,
    last_sent: Mutex<Option<(Instant, DateTime<Utc>)>>,
}

impl CallMeBotMessenger {
    pub fn new(phone: Option<String>, api_key: Option<String>, cooldown: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            phone: phone.map(|p| clean_phone(&p)),
            api_key,
            cooldown,
            last_sent: Mutex::new(None),
        }
    }

    fn cooldown_remaining(&self) -> Duration {
        match *self.last_sent.lock() {
            Some((at, _)) => self.cooldown.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn status(&self) -> MessengerStatus {
        let remaining = self.cooldown_remaining();
        MessengerStatus {
            configured: self.is_configured(),
            can_send: self.is_configured() && remaining.is_zero(),
            cooldown_remaining_secs: remaining.as_secs(),
            last_sent: self.last_sent.lock().map(|(_, wall)| wall),
        }
    }
}

#[async_trait]
impl Messenger for CallMeBotMessenger {
    fn is_configured(&self) -> bool {
        self.phone.is_some() && self.api_key.is_some()
    }

    async fn send(&self, message: &str, force: bool) -> Result<(), ChannelError> {
        let (Some(phone), Some(api_key)) = (&self.phone, &self.api_key) else {
            return Err(ChannelError::NotConfigured("messenger credentials missing"));
        };

        if !force {
            let remaining = self.cooldown_remaining();
            if !remaining.is_zero() {
                return Err(ChannelError::RateLimited {
                    remaining_secs: remaining.as_secs(),
                });
            }
        }

        let url = format!(
            "{CALLMEBOT_ENDPOINT}?phone={phone}&text={}&apikey={}",
            urlencoding::encode(message),
            urlencoding::encode(api_key)
        );
        let response = self.client.get(&url).timeout(SEND_TIMEOUT).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::HttpStatus { status, body });
        }

        *self.last_sent.lock() = Some((Instant::now(), Utc::now()));
        Ok(())
    }
}

fn clean_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentAlert {
    pub sent_at: DateTime<Utc>,
    pub payload: AlarmPayload,
    pub unresponsive_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderStatus {
    pub alarm_active: bool,
    pub elapsed_secs: f64,
    pub timeout_secs: f64,
    pub message_sent: bool,
    pub time_until_message_secs: f64,
    pub total_alerts_sent: usize,
}

#[derive(Debug)]
struct PendingAlarm {
    payload: AlarmPayload,
    armed_at: Instant,
    armed_wall: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ResponderState {
    pending: Option<PendingAlarm>,
    message_sent: bool,
    history: VecDeque<SentAlert>,
}

/// In-process notification channel: once an alarm has gone unanswered for
/// `response_timeout`, a single message is sent through the messenger.
pub struct ResponseTimeoutChannel {
    response_timeout: Duration,
    messenger: Arc<dyn Messenger>,
    state: Mutex<ResponderState>,
}

impl ResponseTimeoutChannel {
    pub fn new(response_timeout: Duration, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            response_timeout,
            messenger,
            state: Mutex::new(ResponderState::default()),
        }
    }

    pub fn status(&self) -> ResponderStatus {
        let state = self.state.lock();
        let elapsed = state
            .pending
            .as_ref()
            .map(|p| p.armed_at.elapsed())
            .unwrap_or_default();
        let until = if state.pending.is_some() {
            self.response_timeout.saturating_sub(elapsed)
        } else {
            Duration::ZERO
        };

        ResponderStatus {
            alarm_active: state.pending.is_some(),
            elapsed_secs: elapsed.as_secs_f64(),
            timeout_secs: self.response_timeout.as_secs_f64(),
            message_sent: state.message_sent,
            time_until_message_secs: until.as_secs_f64(),
            total_alerts_sent: state.history.len(),
        }
    }

    /// Most recent first.
    pub fn history(&self, limit: usize) -> Vec<SentAlert> {
        self.state.lock().history.iter().take(limit).cloned().collect()
    }

    pub async fn send_test_message(&self) -> Result<(), ChannelError> {
        self.messenger
            .send(
                "Driver Monitor test message. If you received this, alerts are working.",
                true,
            )
            .await
    }
}

fn unresponsive_message(
    payload: &AlarmPayload,
    unresponsive: Duration,
    armed_wall: DateTime<Utc>,
) -> String {
    format!(
        "CRITICAL ALERT - DRIVER NOT RESPONDING\n\n\
         Driver status: {}\n\
         Condition duration: {:.1} seconds\n\
         Unresponsive for: {:.1} seconds\n\
         Alarm raised at: {}\n\n\
         Please check on the driver immediately.",
        payload.activity,
        payload.duration,
        unresponsive.as_secs_f64(),
        armed_wall.format("%H:%M:%S UTC"),
    )
}

#[async_trait]
impl NotificationChannel for ResponseTimeoutChannel {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn alarm_triggered(&self, payload: &AlarmPayload) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.pending.is_none() {
            state.pending = Some(PendingAlarm {
                payload: payload.clone(),
                armed_at: Instant::now(),
                armed_wall: Utc::now(),
            });
            state.message_sent = false;
            tracing::info!(
                activity = %payload.activity,
                timeout_secs = self.response_timeout.as_secs(),
                "alarm registered, waiting for driver response"
            );
        }
        Ok(())
    }

    async fn driver_responded(&self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.take() {
            tracing::info!(
                after_secs = pending.armed_at.elapsed().as_secs_f64(),
                "driver responded, alarm cancelled"
            );
        }
        state.message_sent = false;
        Ok(())
    }

    async fn poll_delivery_status(&self) -> Result<DeliveryStatus, ChannelError> {
        let (message, payload, unresponsive) = {
            let state = self.state.lock();
            let Some(pending) = state.pending.as_ref() else {
                return Ok(DeliveryStatus::default());
            };
            if state.message_sent {
                return Ok(DeliveryStatus { delivered: true });
            }
            let unresponsive = pending.armed_at.elapsed();
            if unresponsive < self.response_timeout {
                return Ok(DeliveryStatus::default());
            }
            (
                unresponsive_message(&pending.payload, unresponsive, pending.armed_wall),
                pending.payload.clone(),
                unresponsive,
            )
        };

        if !self.messenger.is_configured() {
            return Err(ChannelError::NotConfigured("messenger credentials missing"));
        }

        tracing::warn!(
            unresponsive_secs = unresponsive.as_secs_f64(),
            "driver not responding, sending external alert"
        );
        self.messenger.send(&message, false).await?;

        let mut state = self.state.lock();
        if state.pending.is_none() {
            // Driver responded while the message was in flight.
            return Ok(DeliveryStatus::default());
        }
        state.message_sent = true;
        state.history.push_front(SentAlert {
            sent_at: Utc::now(),
            payload,
            unresponsive_secs: unresponsive.as_secs_f64(),
        });
        while state.history.len() > MAX_HISTORY {
            state.history.pop_back();
        }
        Ok(DeliveryStatus { delivered: true })
    }
}
