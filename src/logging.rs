//! Tracing setup for binaries and tests embedding the writer.
//!
//! Library code only emits through `tracing` macros; installing a
//! subscriber is left to the caller.
//!
//! - `RUST_LOG`: filter directives (default: `info`)
//! - `STAGEWRITE_LOG_FORMAT`: `json` for JSON lines, anything else for text

use tracing_subscriber::EnvFilter;

/// Install a global subscriber. Returns false if one was already set.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("STAGEWRITE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
