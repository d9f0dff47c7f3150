//! Subscriber setup for the `reelname` binary.
//!
//! Logs always go to stderr so stdout stays free for outcomes and JSON.
//! `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` directives when set, otherwise `level`
pub fn env_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

/// A non-blocking writer to `path`, rotated daily as `<name>.YYYY-MM-DD`.
///
/// Lines are flushed when the returned guard is dropped.
pub fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber: stderr always, plus `log_file` when set.
///
/// Keep the returned guard alive for as long as the file should be written.
pub fn init(level: tracing::Level, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_file_writer_creates_directory_and_file() -> Result<()> {
        let dir = tempdir()?;
        let logs = dir.path().join("logs");

        let (mut writer, guard) = file_writer(&logs.join("reelname.log"))?;
        writer.write_all(b"Renamed a.mkv\n")?;
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(&logs)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("reelname.log"), "{names:?}");

        let written = std::fs::read_to_string(logs.join(&names[0]))?;
        assert!(written.contains("Renamed a.mkv"));
        Ok(())
    }

    #[test]
    fn test_file_writer_rejects_directory_path() {
        assert!(file_writer(Path::new("/")).is_err());
    }
}
