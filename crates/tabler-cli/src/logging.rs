//! Tracing setup for the `tabler` binary
//!
//! Console output goes to stderr so tables printed on stdout stay clean. The
//! JSON file sink rolls daily under the platform data directory. `RUST_LOG`
//! takes precedence over the preset filter.

use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::settings::LoggingPreset;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Where log records go and how much detail they carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Human-readable records on stderr
    pub console: bool,
    /// Directory for daily `tabler.log` JSON files; `None` disables the file sink
    pub json_dir: Option<PathBuf>,
    /// File and line of each event
    pub include_location: bool,
    /// Span open/close events with timings
    pub span_timings: bool,
    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_preset(LoggingPreset::default())
    }
}

impl LoggingConfig {
    pub fn from_preset(preset: LoggingPreset) -> Self {
        match preset {
            LoggingPreset::Development => Self {
                console: true,
                json_dir: Some(log_directory()),
                include_location: true,
                span_timings: true,
                filter: "info,tabler_cli=debug,tabler_services=debug,tabler_core=debug,tabler_driver_mssql=debug"
                    .to_string(),
            },
            LoggingPreset::Production => Self {
                console: false,
                json_dir: Some(log_directory()),
                include_location: false,
                span_timings: false,
                filter: "warn,tabler_services=info,tabler_driver_mssql=info".to_string(),
            },
            LoggingPreset::Quiet => Self {
                console: true,
                json_dir: None,
                include_location: false,
                span_timings: false,
                filter: "warn".to_string(),
            },
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_timings {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn console_layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(config.span_events())
        .with_filter(config.env_filter())
        .boxed()
}

fn json_layer<S>(config: &LoggingConfig, dir: &Path) -> anyhow::Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "tabler.log"));
    let layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(config.span_events())
        .with_writer(writer)
        .with_filter(config.env_filter())
        .boxed();
    Ok((layer, guard))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit; dropping it flushes the file sink.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let mut layers = Vec::new();
    if config.console {
        layers.push(console_layer(config));
    }

    let mut guard = None;
    if let Some(dir) = &config.json_dir {
        let (layer, file_guard) = json_layer(config, dir)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    tracing::debug!(?config, "logging initialized");
    Ok(guard)
}

/// `<data dir>/tabler/logs`, or `./tabler/logs` when the platform has none
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabler")
        .join("logs")
}
