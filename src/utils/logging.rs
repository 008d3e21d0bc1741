use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static ENABLE_LOGGING: AtomicBool = AtomicBool::new(false);

/// Initializes logging based on the QUEUESIM_LOGGING environment variable.
/// - If QUEUESIM_LOGGING=true, a tracing subscriber is installed. RUST_LOG
///   selects the level, `info` by default.
/// - If QUEUESIM_LOGGING=false or not set, logging is disabled.
/// - To enable logging in tests, run: QUEUESIM_LOGGING=true cargo test -- --nocapture
///
/// Safe to call more than once.
pub fn init_logging() {
    match env::var("QUEUESIM_LOGGING") {
        Ok(value) => match value.as_str() {
            "true" => {
                ENABLE_LOGGING.store(true, Ordering::SeqCst);
                let filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info"));
                // Another subscriber may already be installed, e.g. by an earlier call.
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(false)
                    .try_init();
            }
            "false" => ENABLE_LOGGING.store(false, Ordering::SeqCst),
            other => {
                ENABLE_LOGGING.store(false, Ordering::SeqCst);
                eprintln!(
                    "\nWarning: QUEUESIM_LOGGING must be 'true' or 'false', got '{other}'; logging stays off\n\nUse one of:\n  QUEUESIM_LOGGING=true cargo run\n  QUEUESIM_LOGGING=false cargo run\n"
                );
            }
        },
        Err(_) => ENABLE_LOGGING.store(false, Ordering::SeqCst),
    }
}

pub fn is_enabled() -> bool {
    ENABLE_LOGGING.load(Ordering::SeqCst)
}

/// Prints a prefixed console line when logging is enabled.
pub fn log(prefix: &str, message: &str) {
    if is_enabled() {
        println!("  [{}]   {}", prefix, message);
    }
}
