//! Common test utilities.
//!
//! Set `RUST_LOG` (e.g. `wavl_rank=trace`) to see every rebalancing step of a failing test.

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize a tracing subscriber that writes through the test harness.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Builds a map from `keys`, valuing each key at ten times itself.
pub fn map_of(keys: &[i64]) -> wavl_rank::WavlMap<i64, i64> {
    let mut map = wavl_rank::WavlMap::new();

    for &key in keys {
        map.insert(key, key * 10).expect("duplicate key");
        map.assert_invariants();
    }

    map
}
