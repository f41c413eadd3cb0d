//! Election results live feed
//!
//! Keeps one Server-Sent-Events subscription to the results backend and
//! exposes the latest event plus a connectivity flag to the dashboard:
//! - `core`: connection state machine, backoff, SSE decoding, dashboard state
//! - `live_native`: tokio driver over HTTP (feature `cli`)
//! - `live_wasm`: browser `EventSource` driver (feature `wasm`)

pub mod config;
pub mod core;
pub mod error;
pub mod time;

#[cfg(all(feature = "cli", not(target_arch = "wasm32")))]
pub mod live_native;
#[cfg(all(feature = "cli", not(target_arch = "wasm32")))]
pub mod source;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod live_wasm;

pub use config::LiveConfig;
pub use crate::core::{
    Backoff, Banner, Chime, ConnectionState, DashboardState, EventKind, LiveConnection, LiveEvent,
    Phase, Reaction, ScrapeCountdown, CHIME_DURATION, CHIME_GAIN,
};
pub use error::TransportError;

#[cfg(all(feature = "cli", not(target_arch = "wasm32")))]
pub use live_native::LiveEventClient;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();

    // Initialize tracing for browser console
    tracing_wasm::set_as_global_default();
}
