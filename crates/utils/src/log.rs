use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// `default_directive` applies when `RUST_LOG` is unset or invalid. Calling
/// this more than once is harmless; later calls leave the first subscriber in
/// place.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
