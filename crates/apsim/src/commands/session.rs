//! `apsim session`: drive the simulator from a script or stdin.
//!
//! One command per line. Lines starting with `#` are comments. Telemetry
//! keeps printing between commands.

use std::path::Path;
use std::time::Duration;

use apsim_core::{
    ClientSubtype, ConnectionState, EntityFilter, EntityHandle, Intent, IntentResult,
    Position, Removal, Simulator,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cli::{GlobalOpts, SessionArgs};
use crate::error::CliError;
use crate::output::{self, LineStyle};

// ── Script grammar ───────────────────────────────────────────────────

/// One parsed script line.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLine {
    Intent(Intent),
    List(ListFilter),
    /// Pause reading; telemetry keeps flowing.
    Wait(Duration),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Pending,
    Committed,
}

impl ListFilter {
    fn to_entity_filter(self) -> EntityFilter {
        match self {
            Self::All => EntityFilter::All,
            Self::Pending => EntityFilter::Pending,
            Self::Committed => EntityFilter::Committed,
        }
    }
}

/// Parse one line. Blank lines and comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<SessionLine>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let parsed = match words.as_slice() {
        ["place", "ap", coords @ ..] => SessionLine::Intent(Intent::PlaceAp {
            position: parse_position(coords)?,
        }),
        ["place", "client", rest @ ..] => {
            let (subtype, coords) = match rest {
                [first, coords @ ..] if first.parse::<f64>().is_err() => {
                    let subtype = first
                        .parse::<ClientSubtype>()
                        .map_err(|_| format!("unknown client type '{first}'"))?;
                    (subtype, coords)
                }
                coords => (ClientSubtype::default(), coords),
            };
            SessionLine::Intent(Intent::PlaceClient {
                subtype,
                position: parse_position(coords)?,
            })
        }
        ["place", other, ..] => return Err(format!("unknown entity kind '{other}'")),
        ["move", handle, coords @ ..] => SessionLine::Intent(Intent::Move {
            handle: parse_handle(handle)?,
            position: parse_position(coords)?,
        }),
        ["remove", handle] => SessionLine::Intent(Intent::Remove {
            handle: parse_handle(handle)?,
        }),
        ["clear"] => SessionLine::Intent(Intent::ClearAll),
        ["interval", millis] => SessionLine::Intent(Intent::SetInterval {
            millis: parse_positive(millis, "interval")?,
        }),
        ["wait", millis] => SessionLine::Wait(Duration::from_millis(u64::from(
            parse_positive(millis, "wait")?,
        ))),
        ["list"] | ["list", "all"] => SessionLine::List(ListFilter::All),
        ["list", "pending"] => SessionLine::List(ListFilter::Pending),
        ["list", "committed"] => SessionLine::List(ListFilter::Committed),
        ["quit" | "exit"] => SessionLine::Quit,
        [command, ..] => return Err(format!("cannot parse '{command}' command: {line}")),
        [] => return Ok(None),
    };
    Ok(Some(parsed))
}

fn parse_position(coords: &[&str]) -> Result<Position, String> {
    let [x, y, z] = coords else {
        return Err(format!("expected X Y Z, got {} values", coords.len()));
    };
    let coord = |raw: &str| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("invalid coordinate '{raw}'"))
    };
    Ok(Position::new(coord(*x)?, coord(*y)?, coord(*z)?))
}

fn parse_handle(raw: &str) -> Result<EntityHandle, String> {
    raw.parse()
        .map_err(|_| format!("invalid handle '{raw}' (expected #N)"))
}

fn parse_positive(raw: &str, what: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("{what} must be a positive number of milliseconds")),
        Ok(v) => Ok(v),
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    sim: &Simulator,
    args: SessionArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let style = LineStyle {
        color: output::should_color(global.color),
        debug: global.debug,
    };
    let reader = open_script(args.script.as_deref()).await?;
    let mut lines = reader.lines();
    let mut telemetry = sim.telemetry();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Commands only make sense once the backend has sent its state.
    let mut state = sim.connection_state();
    info!(endpoint = %sim.config().endpoint, "waiting for backend");
    tokio::select! {
        _ = &mut ctrl_c => return Ok(()),
        connected = state.wait_for(|s| *s == ConnectionState::Connected) => {
            if connected.is_err() {
                return Err(CliError::Disconnected);
            }
        }
    }

    let mut line_no = 0usize;
    let mut paused_until: Option<Instant> = None;
    let mut eof = false;

    loop {
        if eof && paused_until.is_none() && !args.follow {
            break;
        }

        let resume_at = paused_until.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = &mut ctrl_c => break,
            () = tokio::time::sleep_until(resume_at), if paused_until.is_some() => {
                paused_until = None;
            }
            record = telemetry.recv() => match record {
                Ok(record) => {
                    output::print_output(&output::telemetry_line(&record, style), global.quiet);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "telemetry consumer lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if !eof && paused_until.is_none() => {
                let Some(line) = line? else {
                    debug!(lines = line_no, "script finished");
                    eof = true;
                    continue;
                };
                line_no += 1;
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(SessionLine::Quit)) => break,
                    Ok(Some(SessionLine::Wait(duration))) => {
                        paused_until = Some(Instant::now() + duration);
                    }
                    Ok(Some(SessionLine::List(filter))) => {
                        output::print_output(&list(sim, filter), global.quiet);
                    }
                    Ok(Some(SessionLine::Intent(intent))) => {
                        run_intent(sim, intent, global.quiet).await;
                    }
                    Err(reason) => report(CliError::Script { line: line_no, reason }),
                }
            }
        }
    }

    Ok(())
}

async fn open_script(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, CliError> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

async fn run_intent(sim: &Simulator, intent: Intent, quiet: bool) {
    let target = match &intent {
        Intent::Move { handle, .. } | Intent::Remove { handle } => Some(*handle),
        _ => None,
    };

    let message = match sim.execute(intent).await {
        Ok(IntentResult::Placed(handle)) => format!("placed {handle}"),
        Ok(IntentResult::Removal(removal)) => {
            let handle = target.map(|h| h.to_string()).unwrap_or_default();
            match removal {
                Removal::Immediate => format!("removed {handle}"),
                Removal::Requested => format!("removal of {handle} requested"),
                Removal::AlreadyRequested => format!("removal of {handle} already requested"),
            }
        }
        Ok(IntentResult::Ok) => "ok".into(),
        Err(e) => {
            report(e.into());
            return;
        }
    };
    output::print_output(&message, quiet);
}

fn list(sim: &Simulator, filter: ListFilter) -> String {
    let filter = filter.to_entity_filter();
    let mut entities = sim.aps().filtered(&filter);
    entities.extend(sim.clients().filtered(&filter));
    output::entity_table(&entities, &sim.labels_snapshot())
}

/// Print a non-fatal error and keep going.
fn report(err: CliError) {
    eprintln!("{:?}", miette::Report::new(err));
}
