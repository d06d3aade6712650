use crate::config::TwilioConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt::Display;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    pub sid: String,
}

/// A channel which forwards the notification to its recipient. Exactly one attempt is made per
/// call.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<MessageReceipt, ChannelError>;
}

/// Sends WhatsApp messages through the Twilio Programmable Messaging REST API.
pub struct TwilioMessagingChannel {
    client: Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioMessagingChannel {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            client: Client::new(),
            messages_url: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                config.api_url.trim_end_matches('/'),
                config.account_sid
            ),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        }
    }
}

#[async_trait]
impl MessagingChannel for TwilioMessagingChannel {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<MessageReceipt, ChannelError> {
        debug!("Sending message to {to} via {}", self.messages_url);
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", from), ("To", to), ("Body", body)])
            .send()
            .await
            .map_err(ChannelError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<TwilioErrorResponse>().await {
                Ok(error) => error.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            };
            return Err(ChannelError::Provider { status, message });
        }

        let created: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        Ok(MessageReceipt { sid: created.sid })
    }
}

#[derive(Deserialize)]
struct TwilioMessageResponse {
    sid: String,
}

#[derive(Deserialize)]
struct TwilioErrorResponse {
    message: String,
}

#[derive(Debug)]
pub enum ChannelError {
    Transport(reqwest::Error),
    Provider { status: StatusCode, message: String },
    InvalidResponse(String),
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Transport(error) => write!(f, "Unable to reach messaging provider: {error}"),
            ChannelError::Provider { status, message } => {
                write!(f, "HTTP {} error: {message}", status.as_u16())
            }
            ChannelError::InvalidResponse(error) => {
                write!(f, "Invalid response from messaging provider: {error}")
            }
        }
    }
}

impl std::error::Error for ChannelError {}
