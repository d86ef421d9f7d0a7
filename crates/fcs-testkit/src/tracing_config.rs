//! Tracing configuration for test output.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "info,fcs_executors=debug,fcs_manifest=debug";

/// Initialize tracing for tests.
///
/// Safe to call from every test; only the first call installs the
/// subscriber. Honours `RUST_LOG`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .compact(),
            )
            .try_init();
    });
}
