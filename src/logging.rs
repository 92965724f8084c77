//! Diagnostic logging setup.
//!
//! Logs go to stderr through `tracing-subscriber`, leaving stdout for
//! command output. The `RUST_LOG` environment variable takes precedence
//! over the `[logging]` config section:
//!
//! ```bash
//! RUST_LOG=docrag=debug docrag sync
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Install the global subscriber. Only the first call has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_filter(filter);

        // A subscriber may already be installed by an embedding application.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
