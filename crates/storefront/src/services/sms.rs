//! Outbound SMS delivery for one-time passcodes.
//!
//! Production uses [`TwilioSmsSender`]. With `SKIP_SMS_SENDING=true` the
//! [`LoggingSmsSender`] is installed instead and codes only reach the logs.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::{SmsConfig, TwilioConfig};

/// Twilio REST API base URL.
const TWILIO_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

/// Errors that can occur when sending a text message.
#[derive(Debug, Error)]
pub enum SmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the message.
    #[error("provider error: {status} - {message}")]
    Provider { status: u16, message: String },
}

/// Something that can deliver a text message to a phone number.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Deliver `body` to `to`.
    ///
    /// # Errors
    ///
    /// Returns `SmsError` if the message could not be handed to the provider.
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

/// Text of the verification message.
#[must_use]
pub fn otp_message(code: &str) -> String {
    format!("你的RyAngel驗證碼為: {code}")
}

/// Build the sender selected by configuration.
///
/// # Errors
///
/// Returns `SmsError::Http` if the HTTP client fails to build.
pub fn from_config(config: &SmsConfig) -> Result<Arc<dyn SmsSender>, SmsError> {
    Ok(match config {
        SmsConfig::LogOnly => Arc::new(LoggingSmsSender),
        SmsConfig::Twilio(twilio) => Arc::new(TwilioSmsSender::new(twilio)?),
    })
}

/// Sends messages through the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioSmsSender {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioSmsSender {
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &TwilioConfig) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{TWILIO_BASE_URL}/Accounts/{}/Messages.json",
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    #[tracing::instrument(skip(self, body))]
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SmsError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!("SMS handed to Twilio");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSmsSender;

#[async_trait]
impl SmsSender for LoggingSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), SmsError> {
        tracing::info!(to = %to, body = %body, "SMS sending disabled, message not sent");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_otp_message() {
        assert_eq!(otp_message("012345"), "你的RyAngel驗證碼為: 012345");
    }

    #[test]
    fn test_messages_url_contains_account() {
        let sender = TwilioSmsSender::new(&TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: SecretString::from("token"),
            from_number: "+85300000000".to_string(),
        })
        .unwrap();

        assert_eq!(
            sender.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn test_logging_sender_always_succeeds() {
        LoggingSmsSender
            .send_sms("+85366666666", "hello")
            .await
            .unwrap();
    }
}
