//! Process-wide tracing/logging setup shared by the binaries.

pub mod subscriber;

pub use subscriber::{LogFormat, LogSettings};

/// Initialize logging from the environment (`RUST_LOG`, `PLATFORM_LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(&LogSettings::from_env());
}
