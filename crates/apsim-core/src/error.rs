// ── Core error types ──
//
// Errors surfaced to consumers of the core. Transport faults are mapped
// from `apsim_api::Error`; raw frames never leak through here.

use thiserror::Error;

use crate::model::{EntityHandle, EntityKind, ServerId};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to simulator at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Simulator is not running")]
    Disconnected,

    // ── Store errors ─────────────────────────────────────────────────
    #[error("No entity with handle {handle}")]
    EntityNotFound { handle: EntityHandle },

    #[error("{kind} {id} is already committed")]
    DuplicateIdentity { kind: EntityKind, id: ServerId },

    #[error("Entity {handle} is not pending")]
    NotPending { handle: EntityHandle },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<apsim_api::Error> for CoreError {
    fn from(err: apsim_api::Error) -> Self {
        match err {
            apsim_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            apsim_api::Error::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("Unsupported endpoint scheme '{scheme}' (expected ws or wss)"),
            },
            apsim_api::Error::WebSocketConnect(reason) | apsim_api::Error::WebSocket(reason) => {
                CoreError::ConnectionFailed {
                    url: String::new(),
                    reason,
                }
            }
            apsim_api::Error::Decode { message, body: _ } => {
                CoreError::Internal(format!("Decode error: {message}"))
            }
            apsim_api::Error::Encode(message) => {
                CoreError::Internal(format!("Encode error: {message}"))
            }
        }
    }
}
