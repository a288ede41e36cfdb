//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level when it is set.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Build a subscriber filtering at `level` unless `RUST_LOG` says otherwise.
pub fn subscriber(level: &str) -> impl tracing::Subscriber + Send + Sync + use<> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
}

/// Install the subscriber globally.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(level: &str) -> bool {
    subscriber(level).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init("debug");
        assert!(!init("info"));
    }

    #[test]
    fn test_scoped_subscriber() {
        tracing::subscriber::with_default(subscriber("warn"), || {
            tracing::warn!(tenant = "acme", "scoped warning");
        });
    }
}
