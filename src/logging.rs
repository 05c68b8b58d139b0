use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging system based on configuration
///
/// Console output always goes to stderr. When a log file is configured a
/// second layer writes to it through a non-blocking worker; the returned
/// guard must be kept alive to flush it.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    // JSON goes to the file when there is one, console stays readable
    if config.json && config.file.is_none() {
        layers.push(console_layer.json().boxed());
    } else {
        layers.push(console_layer.boxed());
    }

    if let Some(log_file) = &config.file {
        let path = Path::new(log_file);
        let (writer, file_guard) = if config.rotation {
            let file_appender = tracing_appender::rolling::daily(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("alt-sni.log"),
            );
            tracing_appender::non_blocking(file_appender)
        } else {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", log_file))?;
            tracing_appender::non_blocking(file)
        };
        guard = Some(file_guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339());

        if config.json {
            layers.push(file_layer.json().boxed());
        } else {
            layers.push(file_layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
