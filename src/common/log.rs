//! Logging setup and helpers shared by every domain.
//!
//! Events are emitted through `tracing` with the fields `ev`, `code` and
//! `dur_ms` so that a JSON formatter downstream produces the same line
//! schema regardless of which domain logged.

use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `filter` (e.g. `info`,
/// `defect_predict=debug`). `AppCfg` rejects malformed filters; one reaching
/// here anyway falls back to `info`. Returns `false` if a subscriber was
/// already set.
pub fn init(filter: &str) -> bool {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Milliseconds elapsed since `start`, saturating at `u64::MAX`.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
