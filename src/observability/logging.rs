//! Logging setup
//!
//! The crate only emits `tracing` events: engine open/close and GC runs at
//! `info`, commits, aborts and GC chunks at `debug`, failed GC runs at
//! `warn`. With the `logging` feature these helpers install a fmt
//! subscriber for them; without it they do nothing.

#[cfg(feature = "logging")]
use tracing_subscriber::{fmt, EnvFilter};

/// Engine lifecycle and one line per GC run.
pub const DEFAULT_DIRECTIVE: &str = "permstore=info";

/// Every transaction and GC chunk.
pub const TEST_DIRECTIVE: &str = "permstore=debug";

/// Installs a global subscriber filtered by `RUST_LOG`, or by `directive`
/// when it is unset.
///
/// Returns false if a subscriber was already installed.
#[cfg(feature = "logging")]
pub fn init(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Debug output routed through the test harness, so it only shows for
/// failing tests. Safe to call from every test.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(TEST_DIRECTIVE))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init(_directive: &str) -> bool {
    false
}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_refused() {
        init_test();
        init_test();
        assert!(!init(DEFAULT_DIRECTIVE));
    }
}
