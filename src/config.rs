use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::wire::OutputFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {details}")]
    Parse { path: PathBuf, details: String },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Debug, Parser)]
#[command(
    name = "qkd-telemetry",
    version,
    about = "Emits synthetic QKD testbed telemetry on stdout"
)]
pub struct Cli {
    /// Optional TOML file with an [emitter] table. Flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Seed for a reproducible stream. Drawn from the OS when omitted.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Stop after this many sessions. Runs until killed when omitted.
    #[arg(long)]
    pub sessions: Option<u64>,
    /// Pause between sessions, in milliseconds.
    #[arg(long)]
    pub pause_ms: Option<u64>,
    /// Output format.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Log a telemetry snapshot every N sessions (0 disables).
    #[arg(long)]
    pub report_every: Option<u64>,
    /// Write to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub emitter: EmitterSection,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EmitterSection {
    pub seed: Option<u64>,
    pub sessions: Option<u64>,
    pub pause_ms: Option<u64>,
    pub format: Option<OutputFormat>,
    pub report_every: Option<u64>,
    pub output: Option<PathBuf>,
}

/// Fully resolved settings the emitter runs with.
#[derive(Clone, Debug, PartialEq)]
pub struct EmitterConfig {
    pub seed: Option<u64>,
    pub sessions: Option<u64>,
    pub pause: Duration,
    pub format: OutputFormat,
    pub report_every: u64,
    pub output: Option<PathBuf>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            seed: None,
            sessions: None,
            pause: Duration::ZERO,
            format: OutputFormat::Labeled,
            report_every: 0,
            output: None,
        }
    }
}

impl EmitterConfig {
    /// Layers command-line flags over the file section over defaults.
    pub fn resolve(cli: &Cli, file: &EmitterSection) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            seed: cli.seed.or(file.seed),
            sessions: cli.sessions.or(file.sessions),
            pause: cli
                .pause_ms
                .or(file.pause_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.pause),
            format: cli.format.or(file.format).unwrap_or(defaults.format),
            report_every: cli
                .report_every
                .or(file.report_every)
                .unwrap_or(defaults.report_every),
            output: cli.output.clone().or_else(|| file.output.clone()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions == Some(0) {
            return Err(ConfigError::Validation(
                "sessions must be greater than zero (omit it to run forever)".into(),
            ));
        }
        if let Some(path) = &self.output {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation("output path is empty".into()));
            }
        }
        Ok(())
    }
}

pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Reads the optional config file named on the command line and resolves.
pub fn load(cli: &Cli) -> Result<EmitterConfig, ConfigError> {
    let file = match &cli.config {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };
    EmitterConfig::resolve(cli, &file.emitter)
}
