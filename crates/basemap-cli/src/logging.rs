//! Logging and optional chrome-trace profiling for the CLI
//!
//! Without the `profiling` feature only a `fmt` layer is installed. With it, a
//! `tracing-chrome` layer records every span (including `profiling::scope!` markers) to a
//! `trace-*.json` file in the working directory, flushed when the returned guard drops.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` used in debug builds when none is set
const DEBUG_FILTER: &str = "debug,hyper_util=info,reqwest::connect=info,rustls=info";

/// `RUST_LOG` used in release builds when none is set
const RELEASE_FILTER: &str = "info";

/// Must be held for the life of `main`; dropping it flushes the trace file
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _flush: tracing_chrome::FlushGuard,
}

fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        DEBUG_FILTER
    } else {
        RELEASE_FILTER
    }
}

/// Initialize the global subscriber. Logs go to stderr so stdout stays clean.
pub fn setup_logging_and_profiling() -> LoggingGuard {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", default_filter());
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());

    #[cfg(feature = "profiling")]
    {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
        tracing_subscriber::registry()
            .with(chrome_layer)
            .with(fmt_layer)
            .init();
        tracing::info!("Tracing initialized with chrome profiling layer");
        LoggingGuard { _flush: guard }
    }
    #[cfg(not(feature = "profiling"))]
    {
        tracing_subscriber::registry().with(fmt_layer).init();
        tracing::info!("Logging initialized (profiling disabled in this build)");
        LoggingGuard {}
    }
}
