// ── Runtime simulator configuration ──
//
// Describes *where* the backend lives and how the channel behaves.
// Never touches disk: the CLI builds a `SimulatorConfig` from its
// profile and hands it in.

use std::time::Duration;

use url::Url;

/// Endpoint the reference backend listens on.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

/// Fixed delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Configuration for one simulator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: Url,
    /// Wait after every close before reconnecting. No backoff.
    pub reconnect_delay: Duration,
    /// Telemetry period in milliseconds, sent as `set_interval` on every
    /// open. `None` leaves the backend default alone.
    pub update_interval: Option<u32>,
}

impl SimulatorConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            update_interval: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_update_interval(mut self, millis: Option<u32>) -> Self {
        self.update_interval = millis;
        self
    }
}
