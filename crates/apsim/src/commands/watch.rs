//! `apsim watch`: stream telemetry until interrupted.

use apsim_core::Simulator;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output::{self, LineStyle};

pub async fn handle(sim: &Simulator, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let style = LineStyle {
        color: output::should_color(global.color),
        debug: global.debug,
    };
    let mut telemetry = sim.telemetry();
    let mut state = sim.connection_state();
    let mut printed = 0usize;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                info!(state = %current, "connection state changed");
            }
            record = telemetry.recv() => match record {
                Ok(record) => {
                    output::print_output(&output::telemetry_line(&record, style), global.quiet);
                    printed += 1;
                    if args.count.is_some_and(|limit| printed >= limit) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "telemetry consumer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
