//! Process-wide `tracing` subscriber setup.
//!
//! Every event from the accumulator carries an `accumulator` field, and
//! events emitted inside a batch cycle also carry `cycle`.

use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "BATCHLINE_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install a fmt subscriber filtered by [`env_filter`].
///
/// Returns `false` when a global subscriber is already set, so hosts that
/// embed the accumulator and test binaries can call it more than once.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}

/// `BATCHLINE_LOG`, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_does_not_panic() {
        let _ = init_tracing();
        assert!(!init_tracing());
    }
}
