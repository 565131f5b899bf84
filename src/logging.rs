//! Tracing subscriber setup for front-ends and tests.
//!
//! The engine itself only emits `tracing` events; installing a subscriber
//! is the caller's decision. `init` is a convenience for binaries that
//! want the standard format with `RUST_LOG` filtering.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info` when `RUST_LOG` is unset. Safe to call more than
/// once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
