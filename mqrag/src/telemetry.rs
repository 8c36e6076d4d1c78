//! Tracing subscriber setup for binaries and examples.
//!
//! The library only emits `tracing` events; nothing is printed unless the
//! application installs a subscriber, for instance with [`init_tracing`].

use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "mqrag=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_tracing() -> bool {
    fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Install a JSON subscriber writing one event per line to stderr.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_json_tracing() -> bool {
    fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let _first = init_tracing();
        assert!(!init_tracing());
        assert!(!init_json_tracing());
    }
}
