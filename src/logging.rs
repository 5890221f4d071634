use std::fs::OpenOptions;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// The level comes from `RUST_LOG` (default `info`). Output is appended to
/// `log_path` when it can be opened, otherwise it goes to stderr.
pub fn init_logging(log_path: &Path) {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Ok(file) = OpenOptions::new().create(true).append(true).open(log_path) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(file)
            .init();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    tracing::warn!("Cannot open {}, logging to stderr", log_path.display());
}
