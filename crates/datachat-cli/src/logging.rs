use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use datachat_core::config::LoggingSettings;
use datachat_core::constants::defaults::LOG_FILE_PREFIX;

/// Install the file and console layers. Keep the guard alive for the whole run
/// or buffered file output is lost.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&settings.log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&settings.log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.file_level));
    let console_filter = EnvFilter::new(&settings.console_level);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()?;

    tracing::info!("Logging to {}", log_location(&settings.log_dir).display());
    Ok(guard)
}

fn log_location(dir: &Path) -> std::path::PathBuf {
    dir.join(format!("{LOG_FILE_PREFIX}.<date>"))
}
