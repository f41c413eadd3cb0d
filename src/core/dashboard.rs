//! Dashboard application state
//!
//! Owned by the application root and fed with connection snapshots. Decides
//! how the UI reacts to feed events (data revalidation, alert chimes) and
//! which connection banner to show.

use super::{ConnectionState, EventKind};
use std::time::Duration;
use tracing::debug;

/// Length of every alert tone
pub const CHIME_DURATION: Duration = Duration::from_millis(150);
/// Output gain of every alert tone
pub const CHIME_GAIN: f32 = 0.1;

/// Short alert tones
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chime {
    Update,
    Error,
    Milestone,
}

impl Chime {
    /// Sine frequency of the tone
    pub fn frequency_hz(self) -> f32 {
        match self {
            Chime::Update => 520.0,
            Chime::Error => 300.0,
            Chime::Milestone => 800.0,
        }
    }
}

/// What the application layer should do in response to a feed event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reaction {
    /// Refetch every API-backed view
    Revalidate,
    Chime(Chime),
}

/// Connection banner shown above the dashboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Banner {
    Offline,
    Reconnecting,
}

impl Banner {
    pub fn message(self) -> &'static str {
        match self {
            Banner::Offline => "NETWORK OFFLINE - Check internet connection",
            Banner::Reconnecting => "RECONNECTING TO SERVER...",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DashboardState {
    pub fullscreen: bool,
    pub muted: bool,
    pub online: bool,
    pub sse_connected: bool,
    /// Wall-clock ms of the last completed scrape seen on the feed
    pub last_data_update: Option<u64>,
    /// Sequence of the last feed event reacted to
    last_sequence: u64,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            fullscreen: false,
            muted: false,
            online: true,
            sse_connected: true,
            last_data_update: None,
            last_sequence: 0,
        }
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Sync with a connection snapshot and react to its event, once
    pub fn observe(&mut self, state: &ConnectionState, now_ms: u64) -> Vec<Reaction> {
        self.sse_connected = state.connected;

        let Some(event) = state.last_event.as_ref() else {
            return Vec::new();
        };
        if event.sequence < self.last_sequence {
            // Sequences restart with a new connection handle
            debug!(sequence = event.sequence, last = self.last_sequence, "Feed sequence restarted");
            self.last_sequence = 0;
        }
        if event.sequence <= self.last_sequence {
            return Vec::new();
        }
        self.last_sequence = event.sequence;

        let mut reactions = Vec::new();
        match event.kind() {
            EventKind::ScrapeComplete => {
                self.last_data_update = Some(now_ms);
                reactions.push(Reaction::Revalidate);
                if !self.muted {
                    reactions.push(Reaction::Chime(Chime::Update));
                }
            }
            EventKind::ScrapeError => {
                if !self.muted {
                    reactions.push(Reaction::Chime(Chime::Error));
                }
            }
            _ => {}
        }
        debug!(event = %event.event, sequence = event.sequence, ?reactions, "Dashboard observed event");
        reactions
    }

    pub fn banner(&self) -> Option<Banner> {
        if !self.online {
            Some(Banner::Offline)
        } else if !self.sse_connected {
            Some(Banner::Reconnecting)
        } else {
            None
        }
    }
}
