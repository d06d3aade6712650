use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use log::debug;
use serde::Deserialize;
use serde_json::json;
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const MESSAGES_PATH: &str = "/2010-04-01/Accounts/:account_sid/Messages.json";

/// A stand-in for the Twilio messages API. Each instance listens on its own ephemeral port, so
/// tests using it may run in parallel.
#[derive(Clone)]
pub struct FakeTwilio {
    account_sid: Cow<'static, str>,
    message_sid: Cow<'static, str>,
    rejection: Option<(u16, String)>,
    received: Arc<Mutex<Vec<ReceivedMessage>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub from: String,
    pub to: String,
    pub body: String,
    pub authorization: Option<String>,
}

#[derive(Deserialize)]
struct CreateMessagePayload {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "To")]
    to: String,
    #[serde(rename = "Body")]
    body: String,
}

impl FakeTwilio {
    pub fn new(account_sid: impl Into<Cow<'static, str>>) -> Self {
        Self {
            account_sid: account_sid.into(),
            message_sid: "SM00000000000000000000000000000000".into(),
            rejection: None,
            received: Default::default(),
        }
    }

    pub fn with_message_sid(self, message_sid: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message_sid: message_sid.into(),
            ..self
        }
    }

    /// Answers every request with the given status and a Twilio-style error body.
    pub fn reject_with(self, status: u16, message: impl AsRef<str>) -> Self {
        Self {
            rejection: Some((status, message.as_ref().into())),
            ..self
        }
    }

    pub async fn start(self) -> RunningFakeTwilio {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Could not bind fake Twilio");
        let port = listener
            .local_addr()
            .expect("Fake Twilio has no local address")
            .port();
        let received = self.received.clone();
        let app = Router::new()
            .route(MESSAGES_PATH, post(create_message))
            .with_state(self);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        RunningFakeTwilio { port, received }
    }
}

pub struct RunningFakeTwilio {
    port: u16,
    received: Arc<Mutex<Vec<ReceivedMessage>>>,
}

impl RunningFakeTwilio {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn received_messages(&self) -> Vec<ReceivedMessage> {
        self.received.lock().unwrap().clone()
    }
}

async fn create_message(
    State(state): State<FakeTwilio>,
    Path(account_sid): Path<String>,
    headers: HeaderMap,
    Form(payload): Form<CreateMessagePayload>,
) -> Response {
    debug!("Got message for {account_sid}: {}", payload.body);
    state.received.lock().unwrap().push(ReceivedMessage {
        from: payload.from,
        to: payload.to,
        body: payload.body,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from),
    });

    if account_sid != state.account_sid {
        return error_response(StatusCode::NOT_FOUND, 20404, "The requested resource was not found");
    }
    if let Some((status, message)) = &state.rejection {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST);
        return error_response(status, 21211, message);
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "sid": state.message_sid,
            "account_sid": account_sid,
            "status": "queued",
        })),
    )
        .into_response()
}

fn error_response(status: StatusCode, code: u32, message: &str) -> Response {
    (
        status,
        Json(json!({
            "code": code,
            "message": message,
            "status": status.as_u16(),
        })),
    )
        .into_response()
}
