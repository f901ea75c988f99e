use tracing_subscriber::fmt::{SubscriberBuilder};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_appender::non_blocking::WorkerGuard;

/*
    @@@
    @logs_tracing();
    . Creates a daily-rotating log file (<log_dir>/instanced.log) and wraps it in a non-blocking writer.
    . An unusable log_dir is reported as an error, not a panic.
    . Installs an INFO-level fmt subscriber on that writer as the global default; the shell keeps the terminal.
    . The returned guard flushes the writer when dropped, so main holds it for the whole run.
*/
pub fn logs_tracing(log_dir: &str) -> anyhow::Result<WorkerGuard> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("instanced.log")
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = SubscriberBuilder::default()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_log_dir_is_an_error() {
        assert!(logs_tracing("/proc/instanced-logs/nested").is_err());
    }
}
