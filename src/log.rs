use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `tokenizers_ffi=debug`.
pub const LOG_ENV: &str = "TOKENIZERS_FFI_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Installs a stderr subscriber filtered by [`LOG_ENV`].
///
/// Only the first call has any effect, and nothing happens if the host has
/// already installed a global subscriber.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[test]
fn test_init_twice() {
    init();
    init();
    tracing::warn!("logging initialized");
}
