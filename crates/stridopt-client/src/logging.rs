use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "stridopt_client=debug,stridopt_sync=debug,stridopt_store=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
