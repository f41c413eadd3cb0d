//! Platform-agnostic time utilities
//!
//! Provides wall-clock milliseconds since the Unix epoch on both targets.

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}

#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
