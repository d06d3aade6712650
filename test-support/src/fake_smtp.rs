use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{
    net::IpAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::watch::{self, error::RecvError, Receiver, Sender},
    time::timeout,
};

pub const SMTP_PORT: u16 = 4567;
pub const POISONED_SMTP_PORT: u16 = 4568;

const SERVER_NAME: &str = "contact-form.test";

/// Accepts every mail. Clones share the delivery channel and the record of AUTH attempts, since
/// the server clones the handler for each session.
#[derive(Clone)]
struct RecordingHandler {
    buffer: Vec<u8>,
    mails: Arc<Sender<String>>,
    auth_attempted: Arc<AtomicBool>,
}

impl Handler for RecordingHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.buffer.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let content = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        debug!("Received mail of {} bytes", content.len());
        let _ = self.mails.send(content);
        mailin_embedded::response::OK
    }

    fn auth_plain(
        &mut self,
        _authorization_id: &str,
        authentication_id: &str,
        _password: &str,
    ) -> mailin_embedded::Response {
        debug!("Client authenticated as {authentication_id}");
        self.auth_attempted.store(true, Ordering::SeqCst);
        mailin_embedded::response::AUTH_OK
    }
}

/// An SMTP server on [`SMTP_PORT`] which accepts every mail and hands its raw content to the
/// test. There is one port, so tests using it must run serially.
pub struct FakeSmtpServer {
    server: Mutex<Option<Server<RecordingHandler>>>,
    mails: tokio::sync::Mutex<Receiver<String>>,
    auth_attempted: Arc<AtomicBool>,
}

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(String::new());
        let auth_attempted = Arc::new(AtomicBool::new(false));
        let mut server = Server::new(RecordingHandler {
            buffer: Vec::new(),
            mails: Arc::new(sender),
            auth_attempted: auth_attempted.clone(),
        });
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .expect("Could not configure fake SMTP server")
            .with_addr(format!("127.0.0.1:{SMTP_PORT}"))
            .expect("Could not bind fake SMTP server");
        Self {
            server: Mutex::new(Some(server)),
            mails: tokio::sync::Mutex::new(receiver),
            auth_attempted,
        }
    }

    /// Starts serving on a background thread. Later calls are no-ops.
    pub fn start(&self) {
        if let Some(server) = self.server.lock().unwrap().take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
        }
    }

    /// Waits for the next mail to arrive and returns its raw content.
    pub async fn last_mail_content(&self) -> Result<String, RecvError> {
        let mut receiver = self.mails.lock().await;
        receiver.changed().await?;
        let content = receiver.borrow_and_update().clone();
        Ok(content)
    }

    /// Whether any client sent AUTH since the last [`FakeSmtpServer::flush`].
    pub fn auth_attempted(&self) -> bool {
        self.auth_attempted.load(Ordering::SeqCst)
    }

    /// Discards state left over from an earlier test.
    pub async fn flush(&self) {
        let mut receiver = self.mails.lock().await;
        let _ = timeout(Duration::from_millis(100), receiver.changed()).await;
        self.auth_attempted.store(false, Ordering::SeqCst);
    }

    pub fn url() -> String {
        format!("smtp://127.0.0.1:{SMTP_PORT}")
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct PoisonedSmtpHandler;

impl Handler for PoisonedSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts an SMTP server on [`POISONED_SMTP_PORT`] which fails every session. Only the first
/// call per process binds the port.
pub fn start_poisoned_smtp_server() {
    static STARTED: std::sync::Once = std::sync::Once::new();
    STARTED.call_once(|| {
        let mut server = Server::new(PoisonedSmtpHandler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .expect("Could not configure poisoned SMTP server")
            .with_addr(format!("127.0.0.1:{POISONED_SMTP_PORT}"))
            .expect("Could not bind poisoned SMTP server");
        std::thread::spawn(move || {
            let _ = server.serve();
        });
    });
}
