//! Command dispatch: bridges CLI args -> simulator intents -> output.

pub mod config_cmd;
pub mod session;
pub mod watch;

use apsim_core::Simulator;
use clap::CommandFactory;

use crate::cli::{Cli, Command, CompletionsArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        // Config and completions never touch the backend
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            completions(&args);
            Ok(())
        }

        Command::Watch(args) => {
            let sim = start(global, args.interval).await?;
            let result = watch::handle(&sim, args, global).await;
            sim.disconnect().await;
            result
        }
        Command::Session(args) => {
            let sim = start(global, args.interval).await?;
            let result = session::handle(&sim, args, global).await;
            sim.disconnect().await;
            result
        }
    }
}

/// Resolve settings and spawn the simulator's event loop.
async fn start(global: &GlobalOpts, interval: Option<u32>) -> Result<Simulator, CliError> {
    let cfg = config::load_config()?;
    let sim_config = config::resolve_simulator_config(&cfg, global, interval)?;
    let sim = Simulator::new(sim_config);
    sim.connect().await?;
    Ok(sim)
}

fn completions(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "apsim", &mut std::io::stdout());
}
