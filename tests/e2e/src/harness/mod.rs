//! Test harness

mod workspace;

pub use workspace::TestWorkspace;

/// Install a fmt subscriber once per test process.
///
/// Later calls (every `TestWorkspace::new`) hit the already-initialized
/// error and are no-ops; `RUST_LOG` controls the filter, defaulting to
/// `info`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
