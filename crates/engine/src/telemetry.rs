//! Tracing setup for host binaries.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! the host's decision, made once at startup.

use tracing::Level;

/// Installs the global fmt subscriber at the given level. Safe to call more
/// than once; later calls are no-ops.
pub fn init(level: Level) {
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}
