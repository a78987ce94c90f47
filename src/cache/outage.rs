use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Logs a backend outage once instead of on every failed call.
///
/// The first failure after a healthy period is a `warn!`, repeats are
/// `debug!`, and the next success logs the recovery at `info!`.
#[derive(Debug)]
pub struct OutageLog {
    backend: &'static str,
    down: AtomicBool,
}

impl OutageLog {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            down: AtomicBool::new(false),
        }
    }

    pub fn failure(&self, op: &str, error: &dyn Display) {
        if self.down.swap(true, Ordering::SeqCst) {
            debug!(backend = self.backend, op, error = %error, "Cache backend still unavailable");
        } else {
            warn!(backend = self.backend, op, error = %error, "Cache backend unavailable");
        }
    }

    pub fn success(&self) {
        if self.down.swap(false, Ordering::SeqCst) {
            info!(backend = self.backend, "Cache backend recovered");
        }
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}
