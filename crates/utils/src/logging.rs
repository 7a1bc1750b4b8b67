//! provides logging helpers

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber
///
/// Events go to stderr at INFO unless `RUST_LOG` says otherwise. Calling this
/// twice is harmless; the second subscriber is discarded.
pub fn init() {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter);

    if registry().with(fmt_layer).try_init().is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}
