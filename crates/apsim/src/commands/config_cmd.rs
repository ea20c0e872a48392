//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { endpoint, force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let mut cfg = Config::default();
            if let Some(endpoint) = endpoint {
                apsim_config::parse_endpoint(&endpoint)?;
                cfg.profiles.insert(
                    apsim_config::DEFAULT_PROFILE.into(),
                    Profile {
                        endpoint,
                        ..Profile::default()
                    },
                );
            }

            let written = config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Wrote {}", written.display());
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let active = cfg.active_profile_name(global.profile.as_deref());
            let rendered = toml::to_string_pretty(&cfg).map_err(apsim_config::ConfigError::from)?;
            output::print_output(
                &format!("# active profile: {active}\n{rendered}"),
                global.quiet,
            );
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let active = cfg.active_profile_name(global.profile.as_deref());
            for name in cfg.profile_names() {
                let marker = if name == active { " *" } else { "" };
                println!("{name}{marker}");
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            cfg.profile(&name)?;

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }
    }
}
