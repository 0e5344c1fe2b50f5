//! Outbound SMS gateway.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SmsConfig;
use crate::phone::PhoneKey;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS gateway is not configured")]
    NotConfigured,

    #[error("SMS request failed: {0}")]
    Transport(String),

    #[error("SMS gateway rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, to: &PhoneKey, body: &str) -> Result<(), SmsError>;
}

/// Twilio Programmable Messaging client
#[derive(Debug, Clone)]
pub struct TwilioSms {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

impl TwilioSms {
    pub fn from_config(config: &SmsConfig) -> Result<Self, SmsError> {
        let (Some(account_sid), Some(auth_token), Some(from_number)) = (
            config.account_sid.clone(),
            config.auth_token.clone(),
            config.from_number.clone(),
        ) else {
            return Err(SmsError::NotConfigured);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SmsError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            from_number,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }
}

#[async_trait]
impl SmsGateway for TwilioSms {
    async fn send_sms(&self, to: &PhoneKey, body: &str) -> Result<(), SmsError> {
        let form = [
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("Request to Twilio failed: {}", e);
                SmsError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<TwilioErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            error!("Twilio error ({}): {}", status, message);
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(to = %to, "SMS accepted by Twilio");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSms;

#[async_trait]
impl SmsGateway for ConsoleSms {
    async fn send_sms(&self, to: &PhoneKey, body: &str) -> Result<(), SmsError> {
        info!(to = %to, body = %body, "SMS (console gateway, not sent)");
        Ok(())
    }
}

/// Keeps sent messages in memory and can be switched into a failing mode
#[derive(Debug, Default)]
pub struct MemorySmsGateway {
    sent: Mutex<Vec<(PhoneKey, String)>>,
    failing: AtomicBool,
}

impl MemorySmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(PhoneKey, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_message_to(&self, to: &PhoneKey) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(phone, _)| phone == to)
            .map(|(_, body)| body)
    }
}

#[async_trait]
impl SmsGateway for MemorySmsGateway {
    async fn send_sms(&self, to: &PhoneKey, body: &str) -> Result<(), SmsError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SmsError::Transport("gateway unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.clone(), body.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phone::PhoneNormalizer;

    #[test]
    fn twilio_requires_all_credentials() {
        let config = SmsConfig {
            account_sid: Some("AC123".to_string()),
            auth_token: None,
            from_number: Some("+15550001111".to_string()),
            timeout_secs: 5,
        };
        assert!(matches!(TwilioSms::from_config(&config), Err(SmsError::NotConfigured)));
    }

    #[test]
    fn twilio_messages_url_contains_account() {
        let config = SmsConfig {
            account_sid: Some("AC123".to_string()),
            auth_token: Some("token".to_string()),
            from_number: Some("+15550001111".to_string()),
            timeout_secs: 5,
        };
        let sms = TwilioSms::from_config(&config).unwrap();
        assert_eq!(
            sms.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn memory_gateway_records_and_fails_on_demand() {
        let gateway = MemorySmsGateway::new();
        let phone = PhoneNormalizer::default().normalize("0772207616").unwrap();

        gateway.send_sms(&phone, "hello").await.unwrap();
        assert_eq!(gateway.last_message_to(&phone).as_deref(), Some("hello"));

        gateway.set_failing(true);
        assert!(gateway.send_sms(&phone, "again").await.is_err());
        assert_eq!(gateway.sent().len(), 1);
    }
}
