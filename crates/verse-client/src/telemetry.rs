//! Tracing setup for binaries and tests embedding the client.

use tracing_subscriber::{fmt, EnvFilter};

use verse_shared::constants::APP_NAME;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "verse_client=debug,verse_store=info,warn";

/// Install a global `fmt` subscriber honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_ok() {
        tracing::info!(app = APP_NAME, "Client tracing initialised");
    }
}
