//! Structured logging init, using the teacher's declared-but-unused
//! `tracing`/`tracing-subscriber` stack (see DESIGN.md) rather than the
//! HMAC/ed25519-signed JSON log engine actually written in the teacher's
//! `cli/src/nonosctl/logging.rs`.

use tracing_subscriber::EnvFilter;

/// Installs a process-wide `fmt` subscriber. `verbose` raises the default
/// level from `info` to `debug` when no `RUST_LOG` override is set.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
