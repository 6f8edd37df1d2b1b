// Logs module - tracing setup for the supervisor's log stream

mod tags;

pub use tags::EventTag;

use crate::config::LoggingConfig;
use crate::error::{ReboundError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber
///
/// Lines always go to stdout; when `config.file` is set they are also
/// appended to that file through a non-blocking writer. The returned guard
/// must be kept alive for the whole process so buffered lines get flushed.
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.level)?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.json)];

    let guard = match config.file {
        Some(ref path) => {
            let (layer, guard) = file_layer(path, config.json)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ReboundError::LogError(format!("Failed to install subscriber: {}", e)))?;

    Ok(guard)
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| {
            ReboundError::LogError(format!("Invalid log level '{}': {}", level, e))
        }),
    }
}

fn console_layer(json: bool) -> BoxedLayer {
    if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    }
}

fn file_layer(path: &Path, json: bool) -> Result<(BoxedLayer, WorkerGuard)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ReboundError::LogError(format!("Invalid log file path: {}", path.display()))
        })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| {
            ReboundError::LogError(format!("Failed to open log file {}: {}", path.display(), e))
        })?;

    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = if json {
        fmt::layer().json().with_writer(writer).with_ansi(false).boxed()
    } else {
        fmt::layer().with_writer(writer).with_ansi(false).boxed()
    };

    Ok((layer, guard))
}
