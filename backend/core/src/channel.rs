//! # Notification Channel
//!
//! One call, one SMS, one recipient. No retries happen here; a failed send comes
//! back as a [`ChannelError`] so the caller can keep going with the next recipient.
//!
//! ## Twilio
//!
//! Messages are created through the REST API with a form-encoded `To`, `From`
//! and `Body`, authenticated with the account SID and auth token. Trial accounts
//! can only reach numbers verified in the console; those sends fail with error
//! code `21608`, surfaced as [`ChannelError::UnverifiedRecipient`].
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::phone::NormalizedAddress;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";
pub const UNVERIFIED_RECIPIENT_CODE: u32 = 21608;
pub const TEST_MESSAGE: &str = "This is a test SMS from SafeHer backend.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Recipient {0} is not verified with the provider")]
    UnverifiedRecipient(String),

    #[error("Delivery failed: {0}")]
    ChannelFailure(String),
}

#[async_trait]
pub trait NotifyChannel: Send + Sync {
    async fn send(
        &self,
        to: &NormalizedAddress,
        message: &str,
    ) -> Result<DeliveryReceipt, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Deserialize)]
struct MessageCreated {
    sid: String,
}

#[derive(Deserialize)]
struct ProviderError {
    code: Option<u32>,
    message: Option<String>,
}

pub struct TwilioChannel {
    client: Client,
    config: TwilioConfig,
    api_base: String,
}

impl TwilioChannel {
    pub fn new(config: TwilioConfig) -> Self {
        Self::with_api_base(config, TWILIO_API_BASE)
    }

    pub fn with_api_base(config: TwilioConfig, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            config,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl NotifyChannel for TwilioChannel {
    async fn send(
        &self,
        to: &NormalizedAddress,
        message: &str,
    ) -> Result<DeliveryReceipt, ChannelError> {
        if message.is_empty() {
            return Err(ChannelError::ChannelFailure(
                "message body is required".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", message),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("Twilio SMS error: {e}");
                ChannelError::ChannelFailure(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let created: MessageCreated = response
                .json()
                .await
                .map_err(|e| ChannelError::ChannelFailure(e.to_string()))?;

            info!("Twilio SMS sent to {to}, SID: {}", created.sid);

            return Ok(DeliveryReceipt {
                message_id: created.sid,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ProviderError>(&body).ok();
        let code = parsed.as_ref().and_then(|p| p.code);
        let message = parsed.and_then(|p| p.message).unwrap_or(body);

        error!("Twilio SMS error ({status}): {message}");

        Err(classify_failure(to, code, &message))
    }
}

/// Used when no provider credentials are configured; every send fails.
pub struct DisabledChannel;

#[async_trait]
impl NotifyChannel for DisabledChannel {
    async fn send(
        &self,
        _to: &NormalizedAddress,
        _message: &str,
    ) -> Result<DeliveryReceipt, ChannelError> {
        Err(ChannelError::ChannelFailure(
            "SMS provider credentials are not configured".to_string(),
        ))
    }
}

pub fn classify_failure(to: &NormalizedAddress, code: Option<u32>, message: &str) -> ChannelError {
    if code == Some(UNVERIFIED_RECIPIENT_CODE) || message.to_lowercase().contains("unverified") {
        ChannelError::UnverifiedRecipient(to.to_string())
    } else {
        ChannelError::ChannelFailure(message.to_string())
    }
}
