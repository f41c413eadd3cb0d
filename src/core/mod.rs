//! Platform-agnostic core module - shared between WASM client and CLI

pub mod backoff;
pub mod connection;
pub mod countdown;
pub mod dashboard;
pub mod events;
pub mod parser;
pub mod sse;

pub use backoff::Backoff;
pub use connection::{Command, ConnectionState, LiveConnection, Phase, SubscriptionId};
pub use countdown::ScrapeCountdown;
pub use dashboard::{Banner, Chime, DashboardState, Reaction, CHIME_DURATION, CHIME_GAIN};
pub use events::{EventKind, LiveEvent};
pub use parser::parse_event;
pub use sse::SseDecoder;
