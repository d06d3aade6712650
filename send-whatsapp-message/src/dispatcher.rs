use crate::{
    auto_reply::{AutoReplySender, EmailError},
    config::{Config, FieldSet},
    messaging::{ChannelError, MessagingChannel},
    submission::{SubmissionInput, ValidatedSubmission, ValidationError},
};
use axum::http::StatusCode;
use serde::Serialize;
use std::{fmt::Display, time::Duration};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// The outcome of one dispatch, as reported back to the form.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub success: bool,
    #[serde(rename = "sid", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_sent: Option<bool>,
    #[serde(rename = "message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DispatchResult {
    fn delivered(message_id: String, email_sent: bool) -> Self {
        Self {
            success: true,
            message_id: Some(message_id),
            email_sent: Some(email_sent),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            email_sent: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Forwards contact form submissions to the messaging channel and acknowledges them by email.
///
/// The messaging send is primary: its failure fails the request and the auto-reply is never
/// attempted. The auto-reply is best-effort and bounded by `email_timeout`; its outcome only
/// shows up as `email_sent`.
pub struct Dispatcher<MessagingChannelT, AutoReplySenderT> {
    messaging_channel: MessagingChannelT,
    auto_reply_sender: Option<AutoReplySenderT>,
    to_address: String,
    from_address: String,
    notification_header: String,
    fields: FieldSet,
    email_timeout: Duration,
}

impl<MessagingChannelT: MessagingChannel, AutoReplySenderT: AutoReplySender>
    Dispatcher<MessagingChannelT, AutoReplySenderT>
{
    pub fn new(
        config: &Config,
        messaging_channel: MessagingChannelT,
        auto_reply_sender: Option<AutoReplySenderT>,
    ) -> Self {
        Self {
            messaging_channel,
            auto_reply_sender,
            to_address: config.twilio.to.clone(),
            from_address: config.twilio.from.clone(),
            notification_header: config.notification_header.clone(),
            fields: config.fields,
            email_timeout: config.email_timeout,
        }
    }

    pub async fn handle(&self, submission: &SubmissionInput) -> (StatusCode, DispatchResult) {
        match self.dispatch(submission).await {
            Ok(result) => (StatusCode::OK, result),
            Err(error) => {
                error.log();
                (error.status(), error.into_result())
            }
        }
    }

    pub async fn dispatch(
        &self,
        submission: &SubmissionInput,
    ) -> Result<DispatchResult, DispatchError> {
        let validated = submission.validate()?;
        let notification = validated.format(&self.notification_header, self.fields);
        let receipt = self
            .messaging_channel
            .send(&self.to_address, &self.from_address, &notification.body)
            .await?;
        info!("Forwarded submission as message {}", receipt.sid);
        let email_sent = self.send_auto_reply(&validated).await;
        Ok(DispatchResult::delivered(receipt.sid, email_sent))
    }

    async fn send_auto_reply(&self, submission: &ValidatedSubmission<'_>) -> bool {
        let Some(sender) = &self.auto_reply_sender else {
            return false;
        };
        let Some(address) = submission.reply_address() else {
            info!("No usable email address in submission, skipping auto-reply");
            return false;
        };
        let result = timeout(
            self.email_timeout,
            sender.send_reply(address, submission.name),
        )
        .await
        .unwrap_or(Err(EmailError::Timeout));
        match result {
            Ok(()) => {
                info!("Sent auto-reply to {address}");
                true
            }
            Err(error) => {
                warn!("Could not send auto-reply to {address}: {error}");
                false
            }
        }
    }
}

#[derive(Debug)]
pub enum DispatchError {
    Validation(ValidationError),
    Channel(ChannelError),
}

impl DispatchError {
    pub fn log(&self) {
        match self {
            DispatchError::Validation(error) => {
                error!("Client error dispatching submission: {error}");
            }
            DispatchError::Channel(error) => {
                error!("Internal error dispatching submission: {error}");
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::Channel(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_result(self) -> DispatchResult {
        DispatchResult::failed(match self {
            DispatchError::Validation(error) => error.to_string(),
            DispatchError::Channel(error) => error.to_string(),
        })
    }
}

impl From<ValidationError> for DispatchError {
    fn from(error: ValidationError) -> Self {
        DispatchError::Validation(error)
    }
}

impl From<ChannelError> for DispatchError {
    fn from(error: ChannelError) -> Self {
        DispatchError::Channel(error)
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Validation(error) => write!(f, "Client error: {error}"),
            DispatchError::Channel(error) => write!(f, "Internal error: {error}"),
        }
    }
}

impl std::error::Error for DispatchError {}
