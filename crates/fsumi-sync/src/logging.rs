//! Run logger: `[timestamp] [LEVEL] message` lines to stdout and to the data directory.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Renders events as `[2024-04-12T10:00:00.000Z] [INFO] message key=value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLineFormat;

impl<S, N> FormatEvent<S, N> for RunLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        write!(writer, "[{timestamp}] [{}] ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Keeps the file writer flushing; drop it only at process exit.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Creates the data directory and opens the non-rotating log file inside it.
pub fn open_log_file(data_dir: &Path, log_file: &str) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating log directory {}", data_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log_file)
        .build(data_dir)
        .with_context(|| format!("opening log file in {}", data_dir.display()))
}

/// Console layer always; file layer only when a file writer is given.
fn run_log_subscriber<W>(console: W, file: Option<NonBlocking>) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(RunLineFormat)
        .with_ansi(false)
        .with_writer(console)
        .with_filter(env_filter());

    let file_layer = file.map(|writer| {
        tracing_subscriber::fmt::layer()
            .event_format(RunLineFormat)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
}

/// Installs the global subscriber. When the log file cannot be opened the
/// console still receives every line and the failure is reported on stderr.
pub fn init_logging(data_dir: &Path, log_file: &str) -> Result<LogGuard> {
    let (file_writer, guard) = match open_log_file(data_dir, log_file) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(err) => {
            eprintln!("file logging unavailable, logging to console only: {err:#}");
            (None, None)
        }
    };

    run_log_subscriber(std::io::stdout, file_writer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}
