use crate::config::FieldSet;
use serde::{Deserialize, Deserializer};
use std::fmt::Display;

pub const NOT_PROVIDED: &str = "Not provided";

/// A contact form submission as it arrives over the wire. Nothing here is trusted.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct SubmissionInput {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(
        rename = "number",
        alias = "phoneNumber",
        default,
        deserialize_with = "string_or_number"
    )]
    pub phone_number: Option<String>,
    pub message: Option<String>,
}

/// Form builders send phone numbers as JSON numbers as often as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::String(value) => value,
            StringOrNumber::Number(value) => value.to_string(),
        }),
    )
}

impl SubmissionInput {
    /// Trims all fields and requires a non-blank message. Blank optional fields count as absent.
    pub fn validate(&self) -> Result<ValidatedSubmission, ValidationError> {
        let Some(message) = trimmed(&self.message) else {
            return Err(ValidationError::MissingMessage);
        };
        Ok(ValidatedSubmission {
            name: trimmed(&self.name),
            email: trimmed(&self.email),
            phone_number: trimmed(&self.phone_number),
            message,
        })
    }
}

fn trimmed(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, PartialEq, Eq)]
pub struct ValidatedSubmission<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub message: &'a str,
}

impl<'a> ValidatedSubmission<'a> {
    /// The email address, if it plausibly is one. Anything without an `@` is not worth an SMTP
    /// round trip.
    pub fn reply_address(&self) -> Option<&'a str> {
        self.email.filter(|email| email.contains('@'))
    }

    /// Renders the notification body. Lines always appear in the order name, email, phone,
    /// message.
    pub fn format(&self, header: &str, fields: FieldSet) -> FormattedNotification {
        let mut body = format!("{header}\n\n");
        body.push_str(&format!("Name: {}\n", self.name.unwrap_or(NOT_PROVIDED)));
        body.push_str(&format!("Email: {}\n", self.email.unwrap_or(NOT_PROVIDED)));
        if fields.phone || self.phone_number.is_some() {
            body.push_str(&format!(
                "Phone: {}\n",
                self.phone_number.unwrap_or(NOT_PROVIDED)
            ));
        }
        body.push_str(&format!("Message: {}", self.message));
        FormattedNotification { body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedNotification {
    pub body: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    MissingMessage,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingMessage => write!(f, "Message is required"),
        }
    }
}

impl std::error::Error for ValidationError {}
