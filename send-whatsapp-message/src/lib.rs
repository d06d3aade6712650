//! Forwards contact form submissions as WhatsApp messages and acknowledges them by email.

pub mod auto_reply;
pub mod config;
pub mod dispatcher;
pub mod messaging;
pub mod routes;
pub mod submission;
