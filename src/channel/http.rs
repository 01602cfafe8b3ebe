use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DeliveryStatus, NotificationChannel};
use crate::alarm::AlarmPayload;
use crate::error::ChannelError;

/// Forwards alarm events to a monitoring backend that owns the response timeout
/// and the outbound messaging rate limit.
#[derive(Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct TriggeredBody<'a> {
    activity: &'a str,
    confidence: f64,
    duration: f64,
    tier: &'a str,
    alert_level: &'a str,
}

#[derive(Deserialize)]
struct CheckTimeoutResponse {
    #[serde(default)]
    whatsapp_sent: bool,
}

impl HttpChannel {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(
        &self,
        path: &str,
        body: Option<&TriggeredBody<'_>>,
    ) -> Result<reqwest::Response, ChannelError> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::HttpStatus { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl NotificationChannel for HttpChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn alarm_triggered(&self, payload: &AlarmPayload) -> Result<(), ChannelError> {
        let tier = payload.tier.as_str();
        let body = TriggeredBody {
            activity: payload.activity.as_str(),
            confidence: payload.confidence,
            duration: payload.duration,
            tier,
            alert_level: tier,
        };
        self.post("/api/alert/triggered", Some(&body)).await?;
        tracing::info!(
            activity = %payload.activity,
            url = %self.base_url,
            "alarm registered with backend"
        );
        Ok(())
    }

    async fn driver_responded(&self) -> Result<(), ChannelError> {
        self.post("/api/alert/responded", None).await?;
        Ok(())
    }

    async fn poll_delivery_status(&self) -> Result<DeliveryStatus, ChannelError> {
        let response = self.post("/api/alert/check-timeout", None).await?;
        let parsed: CheckTimeoutResponse = response.json().await?;
        Ok(DeliveryStatus {
            delivered: parsed.whatsapp_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let channel = HttpChannel::new("http://192.168.1.100:8000/");
        assert_eq!(
            channel.url("/api/alert/responded"),
            "http://192.168.1.100:8000/api/alert/responded"
        );
    }

    #[test]
    fn check_timeout_response_defaults_to_not_sent() {
        let parsed: CheckTimeoutResponse =
            serde_json::from_str(r#"{"success":true}"#).expect("valid json");
        assert!(!parsed.whatsapp_sent);

        let parsed: CheckTimeoutResponse =
            serde_json::from_str(r#"{"success":true,"whatsapp_sent":true}"#).expect("valid json");
        assert!(parsed.whatsapp_sent);
    }
}
