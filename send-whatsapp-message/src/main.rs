use anyhow::Context;
use send_whatsapp_message::{
    auto_reply::SmtpAutoReplySender, config::Config, dispatcher::Dispatcher,
    messaging::TwilioMessagingChannel, routes::router,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env().context("Could not load configuration")?;
    let messaging_channel = TwilioMessagingChannel::new(&config.twilio);
    let auto_reply_sender = config.smtp.clone().map(SmtpAutoReplySender::new);
    if auto_reply_sender.is_none() {
        info!("SMTP_URL not set, auto-replies are disabled");
    }
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        messaging_channel,
        auto_reply_sender,
    ));
    let app = router(dispatcher, config.allowed_origin.as_deref());

    #[cfg(feature = "lambda")]
    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("Running as AWS Lambda function");
        return lambda_http::run(app)
            .await
            .map_err(|error| anyhow::anyhow!(error));
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Could not bind to port {}", config.port))?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
