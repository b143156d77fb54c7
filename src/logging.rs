//! Logging bootstrap for the binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! front end's job. `RUST_LOG` always takes precedence over the defaults here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "tempo_notes=warn";
const VERBOSE_FILTER: &str = "tempo_notes=debug,info";

/// Install a stderr subscriber. Calling it again is a no-op.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging(false);
        init_logging(true);
        tracing::debug!("still alive");
    }
}
