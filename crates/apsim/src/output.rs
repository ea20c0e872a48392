//! Output formatting: telemetry lines and entity tables.
//!
//! Telemetry goes to stdout one line per message, in arrival order.
//! Entity listings use `tabled`.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use apsim_core::store::LabelMap;
use apsim_core::{Entity, Identity, PositionUpdate, RssiUpdate, TelemetryRecord};
use chrono::Local;
use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::ColorMode;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Everything that shapes a rendered line.
#[derive(Debug, Clone, Copy)]
pub struct LineStyle {
    pub color: bool,
    /// Append the raw payload.
    pub debug: bool,
}

// ── Telemetry ────────────────────────────────────────────────────────

/// `[type] HH:MM:SS: content`, with a human summary for `rssi_update` and
/// `position_update` and the JSON body for everything else.
pub fn telemetry_line(record: &TelemetryRecord, style: LineStyle) -> String {
    let time = record
        .received_at
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string();

    let tag = format!("[{}]", record.kind);
    let (tag, time) = if style.color {
        (tag.blue().to_string(), time.dimmed().to_string())
    } else {
        (tag, time)
    };

    format!("{tag} {time}: {}", telemetry_content(record, style))
}

fn telemetry_content(record: &TelemetryRecord, style: LineStyle) -> String {
    match record.kind.as_str() {
        "rssi_update" => {
            let Some(update) = record.parse::<RssiUpdate>() else {
                return record.payload.to_string();
            };
            let rssi = format!("{} dBm", update.rssi);
            let rssi = if style.color {
                rssi.magenta().bold().to_string()
            } else {
                rssi
            };
            let line = format!("Client {} → AP {}: {rssi}", update.client_id, update.ap_id);
            if style.debug {
                format!("{line} (raw: {})", record.payload)
            } else {
                line
            }
        }
        "position_update" => match record.parse::<PositionUpdate>() {
            Some(update) => {
                let position = update.position().to_string();
                let position = if style.color {
                    position.green().bold().to_string()
                } else {
                    position
                };
                format!("Client {} moved to position: {position}", update.client_id)
            }
            None => record.payload.to_string(),
        },
        _ => record.payload.to_string(),
    }
}

// ── Entity tables ────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Handle")]
    handle: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Position")]
    position: String,
}

fn to_row(entity: &Entity, labels: &LabelMap) -> EntityRow {
    let state = match entity.identity() {
        Identity::Pending(local) => format!("pending ({local})"),
        Identity::Committed(id) => format!("committed ({id})"),
    };
    EntityRow {
        handle: entity.handle().to_string(),
        class: entity.class().to_string(),
        label: labels
            .get(&entity.handle())
            .map(ToString::to_string)
            .unwrap_or_default(),
        state,
        position: entity.position().to_string(),
    }
}

pub fn entity_table(entities: &[Arc<Entity>], labels: &LabelMap) -> String {
    if entities.is_empty() {
        return "no entities".into();
    }
    let rows: Vec<EntityRow> = entities.iter().map(|e| to_row(e, labels)).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
