//! Logging setup
//!
//! Diagnostics go to stderr through `tracing`; status lines and the summary
//! are written to stdout by the reporter and never pass through here.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects `debug` and `quiet`
/// selects `error`; the default is `warn`.
pub fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("emx_conform={}", default_level)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;
    Ok(())
}
