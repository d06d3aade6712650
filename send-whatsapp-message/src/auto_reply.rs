use crate::config::SmtpConfig;
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::{Credentials, Mechanism},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use std::fmt::Display;
use tinytemplate::{format_unescaped, TinyTemplate};
use tracing::info;

pub const AUTO_REPLY_SUBJECT: &str = "Thank you for contacting us";
const GENERIC_GREETING_NAME: &str = "there";

const AUTO_REPLY_TEMPLATE_NAME_HTML: &str = "auto-reply-html";
const AUTO_REPLY_TEMPLATE_NAME_TEXT: &str = "auto-reply-text";
const AUTO_REPLY_TEMPLATE_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/auto-reply.html"
));
const AUTO_REPLY_TEMPLATE_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/auto-reply.txt"
));

/// Acknowledges a submission to the person who sent it.
#[async_trait]
pub trait AutoReplySender: Send + Sync {
    async fn send_reply(&self, to_email: &str, recipient_name: Option<&str>)
        -> Result<(), EmailError>;
}

pub struct SmtpAutoReplySender {
    config: SmtpConfig,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpAutoReplySender {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            mailer: Default::default(),
        }
    }

    fn construct_email_message(
        &self,
        to_email: &str,
        recipient_name: Option<&str>,
    ) -> Result<Message, EmailError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|_| EmailError::InvalidAddress(self.config.from.clone()))?;
        let address: Address = to_email
            .parse()
            .map_err(|_| EmailError::InvalidAddress(to_email.into()))?;
        let to = Mailbox::new(recipient_name.map(String::from), address);
        let AutoReplyContent { text, html } = render_auto_reply(recipient_name)?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(AUTO_REPLY_SUBJECT)
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(EmailError::Build)
    }

    async fn initialise_mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let smtp_url = self.config.url.as_str();
        info!("initialise_mailer: Connecting to {smtp_url}");
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(smtp_url)
            .map_err(EmailError::Connect)?
            .authentication(vec![Mechanism::Plain]);

        // Credentials never travel over a plaintext connection. A misconfigured environment ends
        // up rejected by the server instead.
        if smtp_url.starts_with("smtps://") {
            if let Some(credentials) = &self.config.credentials {
                builder = builder.credentials(Credentials::new(
                    credentials.username.clone(),
                    credentials.password.clone(),
                ));
            }
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl AutoReplySender for SmtpAutoReplySender {
    async fn send_reply(
        &self,
        to_email: &str,
        recipient_name: Option<&str>,
    ) -> Result<(), EmailError> {
        let email = self.construct_email_message(to_email, recipient_name)?;
        let mailer = self
            .mailer
            .get_or_try_init(self.initialise_mailer())
            .await?;
        mailer.send(email).await.map_err(EmailError::Send)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct Context<'a> {
    greeting_name: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AutoReplyContent {
    pub text: String,
    pub html: String,
}

/// Renders the plain-text and HTML variants of the auto-reply, greeting the recipient by the
/// first word of their name.
pub fn render_auto_reply(recipient_name: Option<&str>) -> Result<AutoReplyContent, EmailError> {
    let context = Context {
        greeting_name: greeting_name(recipient_name),
    };

    let mut html_templates = TinyTemplate::new();
    html_templates
        .add_template(AUTO_REPLY_TEMPLATE_NAME_HTML, AUTO_REPLY_TEMPLATE_HTML)
        .map_err(EmailError::Template)?;

    let mut text_templates = TinyTemplate::new();
    text_templates.set_default_formatter(&format_unescaped);
    text_templates
        .add_template(AUTO_REPLY_TEMPLATE_NAME_TEXT, AUTO_REPLY_TEMPLATE_TEXT)
        .map_err(EmailError::Template)?;

    Ok(AutoReplyContent {
        text: text_templates
            .render(AUTO_REPLY_TEMPLATE_NAME_TEXT, &context)
            .map_err(EmailError::Template)?,
        html: html_templates
            .render(AUTO_REPLY_TEMPLATE_NAME_HTML, &context)
            .map_err(EmailError::Template)?,
    })
}

fn greeting_name(recipient_name: Option<&str>) -> &str {
    recipient_name
        .and_then(|name| name.split_whitespace().next())
        .unwrap_or(GENERIC_GREETING_NAME)
}

#[derive(Debug)]
pub enum EmailError {
    InvalidAddress(String),
    Template(tinytemplate::error::Error),
    Build(lettre::error::Error),
    Connect(lettre::transport::smtp::Error),
    Send(lettre::transport::smtp::Error),
    Timeout,
}

impl Display for EmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailError::InvalidAddress(address) => write!(f, "Invalid email address {address}"),
            EmailError::Template(error) => write!(f, "Error rendering auto-reply: {error}"),
            EmailError::Build(error) => write!(f, "Error building message: {error}"),
            EmailError::Connect(error) => write!(f, "Unable to connect to SMTP server: {error}"),
            EmailError::Send(error) => write!(f, "Error sending message: {error}"),
            EmailError::Timeout => write!(f, "Timed out sending auto-reply"),
        }
    }
}

impl std::error::Error for EmailError {}
