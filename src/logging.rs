use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer flushing; drop it last.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Stdout logging filtered by `log_level` (RUST_LOG syntax). Setting
/// `TRAINER_FILE_LOGS=1` adds a daily-rolling file under
/// `TRAINER_LOG_DIR` (default `./logs`).
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if env_flag("TRAINER_FILE_LOGS") {
        let log_dir = std::env::var("TRAINER_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "trainer.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
                    .init();
                return Some(FileLogGuard { _guard: guard });
            }
            Err(err) => {
                eprintln!("failed to create log directory {log_dir}: {err}");
            }
        }
    }

    registry.init();
    None
}
