use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Human-readable logs on stderr; `RUST_LOG` overrides the `info` default.
pub fn init() {
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
