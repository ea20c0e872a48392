//! Clap derive structures for the `apsim` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// apsim -- place simulated access points and clients against a live backend
#[derive(Debug, Parser)]
#[command(
    name = "apsim",
    version,
    about = "Place simulated access points and clients against a live backend",
    long_about = "Drives a wireless placement simulator over WebSocket.\n\n\
        Entities appear locally as soon as they are placed and are reconciled\n\
        with the identities the backend assigns. Telemetry is streamed as it\n\
        arrives.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "APSIM_PROFILE", global = true)]
    pub profile: Option<String>,

    /// WebSocket endpoint (overrides profile)
    #[arg(long, short = 'e', env = "APSIM_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Append the raw payload to every telemetry line
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also write logs to this file
    #[arg(long, env = "APSIM_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and stream telemetry until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Place, move and remove entities from a script or stdin
    #[command(alias = "s")]
    Session(SessionArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Telemetry period in milliseconds (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u32>,

    /// Exit after this many telemetry lines
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Session ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Read commands from this file instead of stdin
    pub script: Option<PathBuf>,

    /// Telemetry period in milliseconds (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u32>,

    /// Keep streaming telemetry after the script ends
    #[arg(long)]
    pub follow: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a starter config file
    Init {
        /// Endpoint for the default profile
        #[arg(long)]
        endpoint: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display current resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
