use crate::{
    auto_reply::AutoReplySender,
    dispatcher::{DispatchResult, Dispatcher},
    messaging::MessagingChannel,
    submission::SubmissionInput,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub const SEND_WHATSAPP_PATH: &str = "/send-whatsapp";

/// Builds the router. CORS is applied to every route, error responses included.
pub fn router<MessagingChannelT, AutoReplySenderT>(
    dispatcher: Arc<Dispatcher<MessagingChannelT, AutoReplySenderT>>,
    allowed_origin: Option<&str>,
) -> Router
where
    MessagingChannelT: MessagingChannel + 'static,
    AutoReplySenderT: AutoReplySender + 'static,
{
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route(
            SEND_WHATSAPP_PATH,
            get(status).post(send_whatsapp::<MessagingChannelT, AutoReplySenderT>),
        )
        .with_state(dispatcher)
        .layer(cors_layer(allowed_origin))
        .layer(TraceLayer::new_for_http())
}

pub fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::list([origin]),
        Some(Err(error)) => {
            warn!("Ignoring unusable allowed origin: {error}. Denying cross-origin requests.");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "active" }))
}

async fn send_whatsapp<MessagingChannelT, AutoReplySenderT>(
    State(dispatcher): State<Arc<Dispatcher<MessagingChannelT, AutoReplySenderT>>>,
    body: Bytes,
) -> (StatusCode, Json<DispatchResult>)
where
    MessagingChannelT: MessagingChannel + 'static,
    AutoReplySenderT: AutoReplySender + 'static,
{
    let submission = match parse_submission(&body) {
        Ok(submission) => submission,
        Err(error) => {
            warn!("Client error dispatching submission: invalid JSON body: {error}");
            return (
                StatusCode::BAD_REQUEST,
                Json(DispatchResult::failed("Invalid JSON body")),
            );
        }
    };
    let (status, result) = dispatcher.handle(&submission).await;
    (status, Json(result))
}

/// An empty or `null` body is an empty submission, which then fails validation like any other.
fn parse_submission(body: &[u8]) -> Result<SubmissionInput, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SubmissionInput::default());
    }
    serde_json::from_slice::<Option<SubmissionInput>>(body).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::router;
    use crate::dispatcher::test_support::SentMessage;
    use crate::dispatcher::{
        test_support::{fake_config, FakeAutoReplySender, FakeMessagingChannel},
        Dispatcher,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use googletest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const ORIGIN: &str = "https://example.framer.website";

    fn app(
        messaging_channel: &FakeMessagingChannel,
        auto_reply_sender: &FakeAutoReplySender,
        allowed_origin: Option<&str>,
    ) -> Router {
        router(
            Arc::new(Dispatcher::new(
                &fake_config(),
                messaging_channel.clone(),
                Some(auto_reply_sender.clone()),
            )),
            allowed_origin,
        )
    }

    fn post(body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/send-whatsapp")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, ORIGIN)
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_ok_from_health_endpoint() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            None,
        );

        let response = app.oneshot(get("/health")).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::OK));
        expect_that!(json_body(response).await, eq(json!({"status": "ok"})));
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_active_status_on_get() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            None,
        );

        let response = app.oneshot(get("/send-whatsapp")).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::OK));
        expect_that!(json_body(response).await, eq(json!({"status": "active"})));
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_sid_and_email_status_on_success() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            None,
        );

        let response = app
            .oneshot(post(r#"{"name":"Ana","email":"ana@x.com","message":"Hi"}"#))
            .await
            .unwrap();

        expect_that!(response.status(), eq(StatusCode::OK));
        expect_that!(
            json_body(response).await,
            eq(json!({"success": true, "sid": "SM123", "email_sent": true}))
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_400_when_message_is_blank() {
        let messaging_channel = FakeMessagingChannel::succeeding();
        let app = app(&messaging_channel, &FakeAutoReplySender::succeeding(), None);

        let response = app.oneshot(post(r#"{"message":"  "}"#)).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::BAD_REQUEST));
        expect_that!(
            json_body(response).await,
            eq(json!({"success": false, "message": "Message is required"}))
        );
        expect_that!(messaging_channel.sent(), empty());
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_400_when_body_is_empty() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            None,
        );

        let response = app.oneshot(post("")).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::BAD_REQUEST));
        expect_that!(
            json_body(response).await,
            eq(json!({"success": false, "message": "Message is required"}))
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_400_when_body_is_null() {
        let messaging_channel = FakeMessagingChannel::succeeding();
        let app = app(&messaging_channel, &FakeAutoReplySender::succeeding(), None);

        let response = app.oneshot(post(" null ")).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::BAD_REQUEST));
        expect_that!(
            json_body(response).await,
            eq(json!({"success": false, "message": "Message is required"}))
        );
        expect_that!(messaging_channel.sent(), empty());
    }

    #[googletest::test]
    #[tokio::test]
    async fn accepts_phone_number_sent_as_json_number() {
        let messaging_channel = FakeMessagingChannel::succeeding();
        let app = app(&messaging_channel, &FakeAutoReplySender::succeeding(), None);

        let response = app
            .oneshot(post(r#"{"message":"Hi","number":12345}"#))
            .await
            .unwrap();

        expect_that!(response.status(), eq(StatusCode::OK));
        expect_that!(
            messaging_channel.sent(),
            elements_are![field!(SentMessage.body, contains_substring("Phone: 12345\n"))]
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_400_when_body_is_not_json() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            None,
        );

        let response = app.oneshot(post("message=Hello")).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::BAD_REQUEST));
        expect_that!(
            json_body(response).await,
            eq(json!({"success": false, "message": "Invalid JSON body"}))
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_500_with_cause_when_messaging_fails() {
        let auto_reply_sender = FakeAutoReplySender::succeeding();
        let app = app(
            &FakeMessagingChannel::failing("Authenticate"),
            &auto_reply_sender,
            None,
        );

        let response = app
            .oneshot(post(r#"{"email":"ana@x.com","message":"Hi"}"#))
            .await
            .unwrap();

        expect_that!(response.status(), eq(StatusCode::INTERNAL_SERVER_ERROR));
        expect_that!(
            json_body(response).await,
            eq(json!({"success": false, "message": "HTTP 400 error: Authenticate"}))
        );
        expect_that!(auto_reply_sender.sent(), empty());
    }

    #[googletest::test]
    #[tokio::test]
    async fn sets_cors_header_for_configured_origin_on_error_responses() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            Some(ORIGIN),
        );

        let response = app.oneshot(post(r#"{"message":""}"#)).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::BAD_REQUEST));
        expect_that!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            some(eq(ORIGIN))
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn sets_wildcard_cors_header_without_configured_origin() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            None,
        );

        let response = app.oneshot(post(r#"{"message":"Hi"}"#)).await.unwrap();

        expect_that!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            some(eq("*"))
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn answers_preflight_for_configured_origin() {
        let messaging_channel = FakeMessagingChannel::succeeding();
        let app = app(&messaging_channel, &FakeAutoReplySender::succeeding(), Some(ORIGIN));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/send-whatsapp")
            .header(header::ORIGIN, ORIGIN)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        expect_that!(response.status(), eq(StatusCode::OK));
        expect_that!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            some(eq(ORIGIN))
        );
        expect_that!(messaging_channel.sent(), empty());
    }

    #[googletest::test]
    #[tokio::test]
    async fn omits_cors_header_for_other_origins() {
        let app = app(
            &FakeMessagingChannel::succeeding(),
            &FakeAutoReplySender::succeeding(),
            Some("https://another.example"),
        );

        let response = app.oneshot(post(r#"{"message":"Hi"}"#)).await.unwrap();

        expect_that!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            none()
        );
    }
}
