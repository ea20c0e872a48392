//! CLI configuration: thin wrapper around `apsim_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (`--profile`, `--endpoint`) and per-command interval overrides.

use apsim_core::SimulatorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use apsim_config::{Config, Profile, config_path, load_config, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Translate the active profile plus flags into a `SimulatorConfig`.
///
/// `--endpoint` alone is enough to run: when the selected profile does not
/// exist and no `--profile` was given, built-in defaults fill in the rest.
pub fn resolve_simulator_config(
    cfg: &Config,
    global: &GlobalOpts,
    interval: Option<u32>,
) -> Result<SimulatorConfig, CliError> {
    let name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match cfg.profile(name) {
        Ok(profile) => profile.clone(),
        Err(_) if global.endpoint.is_some() && global.profile.is_none() => Profile::default(),
        Err(e) => return Err(e.into()),
    };

    // Flag > env > profile
    if let Some(ref endpoint) = global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }
    if interval.is_some() {
        profile.update_interval = interval;
    }

    tracing::debug!(profile = name, endpoint = %profile.endpoint, "resolved profile");
    Ok(apsim_config::profile_to_simulator_config(
        &profile,
        &cfg.defaults,
    )?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cli::ColorMode;

    fn global(profile: Option<&str>, endpoint: Option<&str>) -> GlobalOpts {
        GlobalOpts {
            profile: profile.map(Into::into),
            endpoint: endpoint.map(Into::into),
            color: ColorMode::Never,
            verbose: 0,
            quiet: false,
            debug: false,
            log_file: None,
        }
    }

    fn lab_config() -> Config {
        Config {
            default_profile: Some("lab".into()),
            profiles: HashMap::from([(
                "lab".to_owned(),
                Profile {
                    endpoint: "ws://10.0.0.5:8000/ws".into(),
                    reconnect_delay_ms: Some(1000),
                    update_interval: Some(400),
                },
            )]),
            ..Config::default()
        }
    }

    #[test]
    fn endpoint_flag_overrides_profile_endpoint_only() {
        let sim = resolve_simulator_config(
            &lab_config(),
            &global(None, Some("ws://127.0.0.1:9000/ws")),
            None,
        )
        .unwrap();
        assert_eq!(sim.endpoint.as_str(), "ws://127.0.0.1:9000/ws");
        assert_eq!(sim.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(sim.update_interval, Some(400));
    }

    #[test]
    fn interval_override_wins() {
        let sim = resolve_simulator_config(&lab_config(), &global(None, None), Some(50)).unwrap();
        assert_eq!(sim.update_interval, Some(50));
    }

    #[test]
    fn endpoint_flag_runs_without_profiles() {
        let cfg = Config {
            default_profile: Some("missing".into()),
            profiles: HashMap::new(),
            ..Config::default()
        };
        let sim =
            resolve_simulator_config(&cfg, &global(None, Some("ws://host/ws")), None).unwrap();
        assert_eq!(sim.reconnect_delay, Duration::from_millis(5000));
    }

    #[test]
    fn explicit_missing_profile_is_an_error() {
        let err = resolve_simulator_config(
            &lab_config(),
            &global(Some("bench"), Some("ws://host/ws")),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { .. }));
    }
}
