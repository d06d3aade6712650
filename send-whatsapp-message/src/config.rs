//! Process-wide configuration, read once from the environment at startup.

use std::{env, fmt::Display, time::Duration};

const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ALLOWED_ORIGIN: &str = "*";
const DEFAULT_NOTIFICATION_HEADER: &str = "New contact form submission";
const DEFAULT_EMAIL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub twilio: TwilioConfig,
    pub port: u16,
    /// `None` allows any origin.
    pub allowed_origin: Option<String>,
    pub fields: FieldSet,
    pub notification_header: String,
    /// `None` disables the auto-reply.
    pub smtp: Option<SmtpConfig>,
    pub email_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub api_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub url: String,
    pub credentials: Option<SmtpCredentials>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

/// The form fields a deployment collects.
///
/// Name, email and message are always part of the notification. The phone line is rendered
/// whenever a number was submitted, and also (with a placeholder) when `phone` is listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldSet {
    pub phone: bool,
}

impl FieldSet {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        let mut fields = FieldSet::default();
        for field in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match field {
                "name" | "email" | "message" => {}
                "phone" | "number" => fields.phone = true,
                other => {
                    return Err(ConfigError::InvalidValue {
                        var: "CONTACT_FIELDS",
                        reason: format!("Unknown field {other}"),
                    })
                }
            }
        }
        Ok(fields)
    }
}

impl Config {
    /// Loads the configuration, honouring a `.env` file in the working directory if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let twilio = TwilioConfig {
            api_url: optional_var("TWILIO_API_URL")
                .unwrap_or_else(|| DEFAULT_TWILIO_API_URL.into()),
            account_sid: required_var("TWILIO_ACCOUNT_SID")?,
            auth_token: required_var("TWILIO_AUTH_TOKEN")?,
            from: required_var("TWILIO_FROM")?,
            to: required_var("WHATSAPP_TO")?,
        };
        if !twilio.api_url.starts_with("http://") && !twilio.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                var: "TWILIO_API_URL",
                reason: "Must start with http:// or https://".into(),
            });
        }

        let allowed_origin = match optional_var("ALLOWED_ORIGIN") {
            Some(origin) if origin != DEFAULT_ALLOWED_ORIGIN => Some(origin),
            _ => None,
        };

        let fields = match optional_var("CONTACT_FIELDS") {
            Some(value) => FieldSet::parse(&value)?,
            None => FieldSet::default(),
        };

        Ok(Self {
            twilio,
            port: parse_var("PORT", DEFAULT_PORT)?,
            allowed_origin,
            fields,
            notification_header: optional_var("NOTIFICATION_HEADER")
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_HEADER.into()),
            smtp: Self::smtp_from_env()?,
            email_timeout: Self::email_timeout_from_env()?,
        })
    }

    /// A zero timeout would fail every auto-reply before it starts.
    fn email_timeout_from_env() -> Result<Duration, ConfigError> {
        match parse_var("EMAIL_TIMEOUT_SECS", DEFAULT_EMAIL_TIMEOUT_SECS)? {
            0 => Err(ConfigError::InvalidValue {
                var: "EMAIL_TIMEOUT_SECS",
                reason: "Must be a positive number, got: 0".into(),
            }),
            seconds => Ok(Duration::from_secs(seconds)),
        }
    }

    fn smtp_from_env() -> Result<Option<SmtpConfig>, ConfigError> {
        let Some(url) = optional_var("SMTP_URL") else {
            return Ok(None);
        };
        let credentials = match (optional_var("SMTP_USERNAME"), optional_var("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => Some(SmtpCredentials { username, password }),
            _ if url.starts_with("smtps://") => {
                return Err(ConfigError::MissingVar("SMTP_USERNAME/SMTP_PASSWORD"))
            }
            _ => None,
        };
        Ok(Some(SmtpConfig {
            url,
            credentials,
            from: required_var("EMAIL_FROM")?,
        }))
    }
}

fn optional_var(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    optional_var(name).ok_or(ConfigError::MissingVar(name))
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name,
            reason: format!("Must be a positive number, got: {value}"),
        }),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue { var: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable {var}"),
            ConfigError::InvalidValue { var, reason } => {
                write!(f, "Invalid value for {var}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
