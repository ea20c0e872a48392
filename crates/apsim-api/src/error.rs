use thiserror::Error;

/// Top-level error type for the `apsim-api` crate.
///
/// Covers every failure mode of the wire layer: endpoint parsing,
/// WebSocket transport, and frame encoding/decoding.
/// `apsim-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint is not a `ws://` or `wss://` URL.
    #[error("Unsupported endpoint scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket handshake failed (refused, DNS failure, bad upgrade).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The socket failed after the handshake completed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Frame decoding failed, with the raw text for debugging.
    #[error("Decode error: {message}")]
    Decode { message: String, body: String },

    /// Outbound message could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),
}

impl Error {
    /// Returns `true` if this is a transport error that a reconnect
    /// might resolve.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WebSocketConnect(_) | Self::WebSocket(_))
    }

    /// Returns `true` if this error came from a single bad frame.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}
