//! CLI command handlers

pub mod commands;

pub use commands::{audit, calculate, sort, validate};

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "cellforge=debug" } else { "cellforge=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
