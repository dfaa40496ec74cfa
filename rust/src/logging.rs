use std::path::Path;

const DEFAULT_FILTER: &str = "souk_core=debug,souk_sqlite_storage=info,info";

/// Logging initialization.
///
/// Always logs to stderr through `tracing-subscriber::fmt`, filtered by `RUST_LOG` when
/// set. When `data_dir` is given, a plain-text copy is appended to `<data_dir>/souk.log`
/// so logs survive the process.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging(data_dir: Option<&Path>) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let file_layer = data_dir.and_then(|dir| {
        let _ = std::fs::create_dir_all(dir);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("souk.log"))
            .ok()?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_log_file_and_tolerates_repeat_calls() {
        let dir = tempfile::tempdir().unwrap();
        init_logging(Some(dir.path()));
        init_logging(Some(dir.path()));
        init_logging(None);

        tracing::info!(target: "souk_core", "logging smoke test");
        assert!(dir.path().join("souk.log").is_file());
    }
}
