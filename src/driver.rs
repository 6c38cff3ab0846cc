//! Command-line entry point logic (§6 "Driver command line").
//!
//! Kept separate from `src/bin/race-driver.rs` so the argument parsing and
//! exit-code mapping are unit-testable without spawning a process, the same
//! split the teacher uses between its `main.rs` and the reusable
//! `SystemBuilder` it drives.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::config::{load_universe, parse_property_override, Overrides};
use crate::error::KernelError;
use crate::master::PhaseTimeouts;
use crate::universe::Universe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Normal = 0,
    Configuration = 1,
    ActorFailure = 2,
    RuntimeFatal = 3,
}

#[derive(Debug)]
pub struct DriverArgs {
    pub config_paths: Vec<PathBuf>,
    pub vault_path: Option<PathBuf>,
    pub overrides: Overrides,
    pub log_level: String,
}

#[derive(Debug)]
pub enum ArgsError {
    MissingConfigPath,
    MissingValueFor(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgsError::MissingConfigPath => write!(f, "at least one configuration file path is required"),
            ArgsError::MissingValueFor(flag) => write!(f, "flag '{flag}' requires a value"),
        }
    }
}

/// Parses `--vault <file>`, `-D<key>=<value>`, `--log-level <level>` and one
/// or more positional configuration paths (§6).
pub fn parse_args(args: &[String]) -> Result<DriverArgs, ArgsError> {
    let mut config_paths = Vec::new();
    let mut vault_path = None;
    let mut overrides = Overrides::new();
    let mut log_level = "info".to_string();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--vault" {
            let value = iter.next().ok_or_else(|| ArgsError::MissingValueFor("--vault".into()))?;
            vault_path = Some(PathBuf::from(value));
        } else if arg == "--log-level" {
            let value = iter
                .next()
                .ok_or_else(|| ArgsError::MissingValueFor("--log-level".into()))?;
            log_level = value.clone();
        } else if let Some(pair) = parse_property_override(arg) {
            overrides.push(pair);
        } else {
            config_paths.push(PathBuf::from(arg));
        }
    }

    if config_paths.is_empty() {
        return Err(ArgsError::MissingConfigPath);
    }

    Ok(DriverArgs {
        config_paths,
        vault_path,
        overrides,
        log_level,
    })
}

pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Runs a full CreateActors→Initialize→Start→(await termination) cycle and
/// maps the outcome onto an exit code (§6 "Exit codes").
pub async fn run(args: DriverArgs) -> ExitCode {
    let config = match load_universe(&args.config_paths, args.vault_path.as_deref(), &args.overrides) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::Configuration;
        }
    };

    let mut universe = Universe::new(&config, PhaseTimeouts::default());
    crate::builtin::register_builtin_classes(&mut universe);

    match universe.boot(&config).await {
        Ok(()) => {}
        Err(KernelError::UniverseAborted(_)) => return ExitCode::ActorFailure,
        Err(_) => return ExitCode::ActorFailure,
    }

    let barrier = universe.termination_barrier();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
        _ = barrier.wait() => {}
    }

    match universe.shutdown().await {
        Ok(()) => ExitCode::Normal,
        Err(_) => ExitCode::RuntimeFatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_positional_paths() {
        let args: Vec<String> = vec![
            "universe.toml".into(),
            "--vault".into(),
            "secrets.toml".into(),
            "-Dtime-scale=2.0".into(),
            "--log-level".into(),
            "debug".into(),
        ];
        let parsed = parse_args(&args).unwrap();
        assert_eq!(parsed.config_paths, vec![PathBuf::from("universe.toml")]);
        assert_eq!(parsed.vault_path, Some(PathBuf::from("secrets.toml")));
        assert_eq!(parsed.overrides, vec![("time-scale".to_string(), "2.0".to_string())]);
        assert_eq!(parsed.log_level, "debug");
    }

    #[test]
    fn requires_at_least_one_config_path() {
        let err = parse_args(&["--vault".into(), "secrets.toml".into()]).unwrap_err();
        assert!(matches!(err, ArgsError::MissingConfigPath));
    }
}
