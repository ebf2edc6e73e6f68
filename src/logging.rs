//! Tracing setup
//!
//! `RUST_LOG` wins when set; otherwise `verbose` selects debug or info.

use tracing_subscriber::EnvFilter;

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "arml_bridge=debug,info"
    } else {
        "info"
    }
}

/// Initialize tracing output on stderr
///
/// Call early in main() before any logging occurs. Safe to call twice; the
/// second call is a no-op.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}
