//! Analytics hook.
//!
//! The gateway reports one event per dispatched handler. The shipped
//! implementation discards them.

use serde_json::Value;

/// Receives usage events.
pub trait Analytics: Send + Sync {
    /// Record an event with free-form properties.
    fn capture(&self, event: &str, properties: Value);
}

/// Analytics sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

impl Analytics for NoopAnalytics {
    fn capture(&self, event: &str, _properties: Value) {
        tracing::trace!(event, "analytics event dropped");
    }
}
