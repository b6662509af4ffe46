//! Common utilities shared between the CLI and the debugging session

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Current wall-clock time in milliseconds since the Unix epoch
///
/// All step timestamps (`start_at`, `end_at`, `paused_at`) use this clock so
/// they can be compared with browser event timestamps (`Date.now()`).
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
