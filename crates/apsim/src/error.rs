//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use apsim_config::ConfigError;
use apsim_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to simulator backend at {url}: {reason}")]
    #[diagnostic(
        code(apsim::connection_failed),
        help(
            "Check that the backend is running and accepts WebSocket connections.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Simulator is not running")]
    #[diagnostic(code(apsim::disconnected))]
    Disconnected,

    // ── Entities ─────────────────────────────────────────────────────

    #[error("No entity with handle {handle}")]
    #[diagnostic(
        code(apsim::not_found),
        help("Run `list` to see the current handles.")
    )]
    NotFound { handle: String },

    #[error("{message}")]
    #[diagnostic(code(apsim::conflict))]
    Conflict { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(apsim::validation))]
    Validation { field: String, reason: String },

    #[error("Line {line}: {reason}")]
    #[diagnostic(
        code(apsim::script),
        help(
            "Commands: place ap X Y Z | place client [mobile|beacon|tag] X Y Z |\n\
             move #H X Y Z | remove #H | clear | interval MS | wait MS |\n\
             list [all|pending|committed] | quit"
        )
    )]
    Script { line: usize, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(apsim::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: apsim config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(apsim::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(apsim::config))]
    Config(ConfigError),

    // ── Logging ──────────────────────────────────────────────────────

    #[error("Cannot open log file {path}: {reason}")]
    #[diagnostic(code(apsim::log_file))]
    LogFile { path: String, reason: String },

    // ── Internal / IO ────────────────────────────────────────────────

    #[error("Internal error: {0}")]
    #[diagnostic(code(apsim::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Script { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::Disconnected => CliError::Disconnected,
            CoreError::EntityNotFound { handle } => CliError::NotFound {
                handle: handle.to_string(),
            },
            err @ (CoreError::DuplicateIdentity { .. } | CoreError::NotPending { .. }) => {
                CliError::Conflict {
                    message: err.to_string(),
                }
            }
            CoreError::Config { message } => CliError::Validation {
                field: "endpoint".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
