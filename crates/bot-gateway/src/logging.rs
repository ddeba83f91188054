use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,bot_gateway=debug";
const DEFAULT_FILE_PREFIX: &str = "bot-gateway.log";

/// JSON logs to stdout, plus a daily-rolled file when a directory is set.
/// Keep the returned guard alive for as long as the file writer is needed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true);

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(directory) => {
            let prefix = config.file_prefix.as_deref().unwrap_or(DEFAULT_FILE_PREFIX);
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
