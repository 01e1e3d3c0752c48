//! Logging capability injected into the plane orchestrator
//!
//! Plane progress lines go through [`PlaneLogger`] rather than straight to a
//! global subscriber, so callers (and tests) decide where they end up.

use tracing::{info, warn};

/// Sink for plane progress messages
pub trait PlaneLogger: Send + Sync {
    /// Informational progress line
    fn info(&self, message: &str);

    /// Something was skipped or degraded but the operation continues
    fn warn(&self, message: &str);
}

/// Forwards plane messages to `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl PlaneLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "ske::plane", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "ske::plane", "{message}");
    }
}
