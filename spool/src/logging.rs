//! Log output for binaries and tests.

use tracing_subscriber::EnvFilter;

const VERBOSE: &str = "info,spool=debug,spool_core=debug,spool_codecs=debug,\
                       spool_containers=debug,spool_registry=debug,spool_session=debug";

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise spool crates log at `debug` when
/// `verbose` is set and at `info` when not. Returns `false` if a global
/// subscriber was already installed.
pub fn init_logging(verbose: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(VERBOSE)
        } else {
            EnvFilter::new("info")
        }
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
