pub mod fake_smtp;
pub mod fake_twilio;

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::sync::Once;

/// Routes `log` output (including the service's `tracing` events) to the terminal. Safe to call
/// from every test.
pub fn setup_logging() {
    static LOGGING: Once = Once::new();
    LOGGING.call_once(|| {
        let _ = TermLogger::init(
            LevelFilter::Debug,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    });
}
