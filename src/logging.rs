use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `RUST_LOG` if set, otherwise this crate
/// at `info` (`debug` when verbose). Output goes to stderr so stdout stays
/// free for responses.
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "getman_dispatch=debug,warn"
    } else {
        "getman_dispatch=info,warn"
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}
