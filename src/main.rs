use std::fs::{self, File};
use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use qkd_telemetry::config::{self, Cli, EmitterConfig};
use qkd_telemetry::{EmitError, Emitter, TelemetrySource};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries telemetry only.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load(&cli).context("loading emitter configuration")?;

    let source = match config.seed {
        Some(seed) => TelemetrySource::new(seed),
        None => TelemetrySource::from_entropy(),
    };
    let writer = open_output(&config)?;
    let mut emitter = Emitter::from_config(source, writer, &config);

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("emitter", %run_id, seed = emitter.seed());
    span.in_scope(|| {
        tracing::info!(
            sessions = ?config.sessions,
            pause = ?config.pause,
            format = ?config.format,
            "QKD telemetry emitter starting"
        )
    });

    match emitter.run(config.sessions).instrument(span).await {
        Ok(_) => Ok(()),
        Err(EmitError::SinkClosed) => {
            tracing::info!("consumer closed the stream, stopping");
            Ok(())
        }
        Err(err) => Err(err).context("emitting telemetry"),
    }
}

fn open_output(config: &EmitterConfig) -> Result<Box<dyn Write>> {
    match &config.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = File::create(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}
