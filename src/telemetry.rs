//! Process-wide tracing setup

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// `RUST_LOG` wins over the CLI level when set
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing_once(level: &str, once: &OnceLock<()>) {
    let _ = once.get_or_init(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(build_filter(level))
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Install the stderr subscriber; later calls are no-ops
pub fn init_tracing(level: &str) {
    init_tracing_once(level, &TRACING_INIT);
}
