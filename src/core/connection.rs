//! Live event connection state machine
//!
//! `LiveConnection` owns the logical subscription to the feed but performs no
//! I/O itself. Drivers report transport callbacks (open, message, error,
//! retry timer, teardown) and execute the `Command`s handed back. The same
//! machine backs the tokio driver and the browser `EventSource` driver.
//!
//! ```text
//! Idle -> Connecting -> Open -> Errored -> Connecting (retry) -> ...
//!                  \______________/
//! any state -- teardown --> Closed
//! ```

use super::{parse_event, Backoff, LiveEvent};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Identifies one subscription handle; stale ids are ignored
pub type SubscriptionId = u64;

/// Named states of the connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Not started, or no url configured
    #[default]
    Idle,
    Connecting,
    Open,
    /// Last attempt failed, retry scheduled
    Errored,
    /// Torn down; terminal
    Closed,
}

/// Observable connection state
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionState {
    /// Latest successfully parsed message (overwritten, never queued)
    pub last_event: Option<LiveEvent>,
    /// Starts true so the UI does not flash "disconnected" before the first
    /// handshake
    pub connected: bool,
    /// Failures since the last successful open
    pub retry_count: u32,
    pub phase: Phase,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            last_event: None,
            connected: true,
            retry_count: 0,
            phase: Phase::Idle,
        }
    }
}

/// Side effects requested from the driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Open a new subscription handle
    Open { id: SubscriptionId, url: String },
    /// Close a subscription handle and detach its listeners
    Close { id: SubscriptionId },
    /// Call `on_retry_timer(after)` once `delay` has elapsed
    ScheduleRetry {
        after: SubscriptionId,
        delay: Duration,
    },
}

pub struct LiveConnection {
    url: String,
    backoff: Backoff,
    state: ConnectionState,
    /// Live subscription handle, if any
    current: Option<SubscriptionId>,
    next_id: SubscriptionId,
    /// Failed subscription whose retry timer is still armed
    retry_after: Option<SubscriptionId>,
    /// Cleared by teardown; checked at every transition
    active: bool,
    delivered: u64,
}

impl LiveConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_backoff(url, Backoff::default())
    }

    pub fn with_backoff(url: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            url: url.into(),
            backoff,
            state: ConnectionState::default(),
            current: None,
            next_id: 1,
            retry_after: None,
            active: true,
            delivered: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Live subscription handle, if any
    pub fn current(&self) -> Option<SubscriptionId> {
        self.current
    }

    /// (Re)establish the subscription
    ///
    /// Closes the previous handle first. Does nothing once torn down or when
    /// no url is configured.
    pub fn connect(&mut self) -> Vec<Command> {
        if !self.active {
            return Vec::new();
        }
        if self.url.trim().is_empty() {
            debug!("No feed url configured, staying idle");
            return Vec::new();
        }

        let mut commands = Vec::with_capacity(2);
        if let Some(id) = self.current.take() {
            commands.push(Command::Close { id });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(id);
        self.retry_after = None;
        self.state.phase = Phase::Connecting;

        info!(url = %self.url, id, retry_count = self.state.retry_count, "Connecting to live feed");
        commands.push(Command::Open {
            id,
            url: self.url.clone(),
        });
        commands
    }

    /// Point the subscription at `url` and (re)connect
    pub fn connect_to(&mut self, url: impl Into<String>) -> Vec<Command> {
        if !self.active {
            return Vec::new();
        }
        self.url = url.into();
        self.connect()
    }

    /// The handle `id` finished its handshake
    ///
    /// Returns false if the callback was stale and ignored.
    pub fn on_open(&mut self, id: SubscriptionId) -> bool {
        if !self.accepts(id) {
            return false;
        }
        info!(id, "Live feed connected");
        self.state.connected = true;
        self.state.retry_count = 0;
        self.state.phase = Phase::Open;
        true
    }

    /// A text frame arrived on handle `id`
    ///
    /// Returns the event now held as `last_event`, or None if the frame was
    /// dropped.
    pub fn on_message(&mut self, id: SubscriptionId, data: &str) -> Option<&LiveEvent> {
        if !self.accepts(id) {
            return None;
        }
        let mut event = parse_event(data)?;
        self.delivered += 1;
        event.sequence = self.delivered;
        trace!(event = %event.event, sequence = event.sequence, "Live event");
        self.state.last_event = Some(event);
        self.state.last_event.as_ref()
    }

    /// Handle `id` failed: opening, mid-stream, or closed by the server
    pub fn on_error(&mut self, id: SubscriptionId) -> Vec<Command> {
        if !self.accepts(id) {
            return Vec::new();
        }
        self.current = None;

        // Only report "disconnected" once a failure follows an earlier one.
        if self.state.retry_count > 0 {
            self.state.connected = false;
        }
        let delay = self.backoff.delay(self.state.retry_count);
        self.state.retry_count = self.state.retry_count.saturating_add(1);
        self.state.phase = Phase::Errored;
        self.retry_after = Some(id);

        warn!(
            id,
            retry_count = self.state.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Live feed error, scheduling reconnect"
        );
        vec![
            Command::Close { id },
            Command::ScheduleRetry { after: id, delay },
        ]
    }

    /// The retry timer armed after handle `after` failed has fired
    pub fn on_retry_timer(&mut self, after: SubscriptionId) -> Vec<Command> {
        if !self.active || self.retry_after != Some(after) {
            trace!(after, "Ignoring stale retry timer");
            return Vec::new();
        }
        self.connect()
    }

    /// Stop for good: close the live handle, cancel any armed retry
    pub fn teardown(&mut self) -> Vec<Command> {
        if !self.active {
            return Vec::new();
        }
        self.active = false;
        self.retry_after = None;
        self.state.phase = Phase::Closed;
        info!(url = %self.url, "Live feed closed");
        match self.current.take() {
            Some(id) => vec![Command::Close { id }],
            None => Vec::new(),
        }
    }

    fn accepts(&self, id: SubscriptionId) -> bool {
        if !self.active || self.current != Some(id) {
            trace!(id, current = ?self.current, "Ignoring callback from stale subscription");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "http://localhost:5050/api/events";

    /// Runs commands against a virtual clock and records what the driver did
    struct Harness {
        conn: LiveConnection,
        now_ms: u64,
        timers: Vec<(u64, SubscriptionId)>,
        opened: Vec<SubscriptionId>,
        log: Vec<Command>,
    }

    impl Harness {
        fn new(url: &str) -> Self {
            Self {
                conn: LiveConnection::new(url),
                now_ms: 0,
                timers: Vec::new(),
                opened: Vec::new(),
                log: Vec::new(),
            }
        }

        fn apply(&mut self, commands: Vec<Command>) {
            for command in commands {
                match &command {
                    Command::Open { id, .. } => self.opened.push(*id),
                    Command::Close { .. } => {}
                    Command::ScheduleRetry { after, delay } => {
                        self.timers
                            .push((self.now_ms + delay.as_millis() as u64, *after));
                    }
                }
                self.log.push(command);
            }
        }

        fn start(&mut self) {
            let commands = self.conn.connect();
            self.apply(commands);
        }

        fn open(&mut self) {
            let id = self.conn.current().expect("no live subscription");
            assert!(self.conn.on_open(id));
        }

        fn fail(&mut self) {
            let id = self.conn.current().expect("no live subscription");
            let commands = self.conn.on_error(id);
            self.apply(commands);
        }

        fn advance(&mut self, ms: u64) {
            self.now_ms += ms;
            let now = self.now_ms;
            let (due, pending): (Vec<_>, Vec<_>) =
                self.timers.drain(..).partition(|(at, _)| *at <= now);
            self.timers = pending;
            for (_, after) in due {
                let commands = self.conn.on_retry_timer(after);
                self.apply(commands);
            }
        }

        fn last_retry_delay(&self) -> Option<u64> {
            self.log.iter().rev().find_map(|c| match c {
                Command::ScheduleRetry { delay, .. } => Some(delay.as_millis() as u64),
                _ => None,
            })
        }
    }

    #[test]
    fn test_connect_twice_closes_previous_first() {
        let mut conn = LiveConnection::new(URL);
        let first = conn.connect();
        assert_eq!(
            first,
            vec![Command::Open {
                id: 1,
                url: URL.to_string()
            }]
        );

        let second = conn.connect();
        assert_eq!(
            second,
            vec![
                Command::Close { id: 1 },
                Command::Open {
                    id: 2,
                    url: URL.to_string()
                },
            ]
        );
        assert_eq!(conn.current(), Some(2));
    }

    #[test]
    fn test_connect_to_switches_endpoint() {
        let mut conn = LiveConnection::new("");
        let other = "http://127.0.0.1:5050/api/events";
        assert_eq!(
            conn.connect_to(other),
            vec![Command::Open {
                id: 1,
                url: other.to_string()
            }]
        );
        assert_eq!(conn.url(), other);

        // An empty url is a no-op; the live handle is left alone.
        assert!(conn.connect_to("").is_empty());
        assert_eq!(conn.current(), Some(1));
    }

    #[test]
    fn test_empty_url_stays_idle() {
        let mut conn = LiveConnection::new("");
        assert!(conn.connect().is_empty());
        let mut conn = LiveConnection::new("   ");
        assert!(conn.connect().is_empty());
        assert_eq!(conn.state().phase, Phase::Idle);
        assert!(conn.state().connected);
        assert_eq!(conn.current(), None);
    }

    #[test]
    fn test_first_error_keeps_connected() {
        let mut h = Harness::new(URL);
        h.start();
        h.fail();
        assert!(h.conn.state().connected);
        assert_eq!(h.conn.state().retry_count, 1);
        assert_eq!(h.conn.state().phase, Phase::Errored);

        h.advance(1000);
        h.fail();
        assert!(!h.conn.state().connected);
        assert_eq!(h.conn.state().retry_count, 2);
    }

    #[test]
    fn test_open_resets_retry_count() {
        let mut h = Harness::new(URL);
        h.start();
        h.fail();
        h.advance(1000);
        h.fail();
        h.advance(2000);
        h.fail();
        assert_eq!(h.conn.state().retry_count, 3);
        assert!(!h.conn.state().connected);

        h.advance(4000);
        h.open();
        assert_eq!(h.conn.state().retry_count, 0);
        assert!(h.conn.state().connected);
        assert_eq!(h.conn.state().phase, Phase::Open);

        // Back to the first-failure rule after a success.
        h.fail();
        assert!(h.conn.state().connected);
        assert_eq!(h.last_retry_delay(), Some(1000));
    }

    #[test]
    fn test_retry_delay_sequence() {
        let mut h = Harness::new(URL);
        h.start();
        let mut delays = Vec::new();
        for _ in 0..8 {
            h.fail();
            let delay = h.last_retry_delay().unwrap();
            delays.push(delay);
            h.advance(delay);
        }
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(h.opened.len(), 9);
    }

    #[test]
    fn test_messages_replace_last_event() {
        let mut conn = LiveConnection::new(URL);
        conn.connect();
        let id = conn.current().unwrap();
        conn.on_open(id);

        let event = conn
            .on_message(id, r#"{"event":"scrape_complete","foo":1}"#)
            .cloned()
            .unwrap();
        assert_eq!(event.event, "scrape_complete");
        assert_eq!(event.get("foo"), Some(&json!(1)));
        assert_eq!(event.sequence, 1);

        assert!(conn.on_message(id, "not json").is_none());
        assert_eq!(conn.state().last_event.as_ref(), Some(&event));

        conn.on_message(id, r#"{"event":"scrape_error","error":"timeout"}"#);
        let last = conn.state().last_event.as_ref().unwrap();
        assert_eq!(last.event, "scrape_error");
        assert_eq!(last.sequence, 2);
    }

    #[test]
    fn test_last_event_survives_reconnect() {
        let mut h = Harness::new(URL);
        h.start();
        h.open();
        let id = h.conn.current().unwrap();
        h.conn.on_message(id, r#"{"event":"connected"}"#);
        h.fail();
        h.advance(1000);
        h.open();
        assert_eq!(h.conn.state().last_event.as_ref().unwrap().event, "connected");
    }

    #[test]
    fn test_stale_callbacks_ignored() {
        let mut conn = LiveConnection::new(URL);
        conn.connect();
        conn.connect();
        assert!(!conn.on_open(1));
        assert!(conn.on_message(1, r#"{"event":"connected"}"#).is_none());
        assert!(conn.on_error(1).is_empty());
        assert_eq!(conn.state().retry_count, 0);
        assert_eq!(conn.state().phase, Phase::Connecting);
    }

    #[test]
    fn test_explicit_connect_disarms_retry_timer() {
        let mut h = Harness::new(URL);
        h.start();
        h.fail();
        let commands = h.conn.connect();
        h.apply(commands);
        assert_eq!(h.opened.len(), 2);
        h.advance(1000);
        assert_eq!(h.opened.len(), 2);
    }

    #[test]
    fn test_teardown_cancels_scheduled_retry() {
        let mut h = Harness::new(URL);
        h.start();
        h.open();
        h.fail();
        assert_eq!(h.timers.len(), 1);

        let commands = h.conn.teardown();
        assert!(commands.is_empty());
        assert_eq!(h.conn.state().phase, Phase::Closed);

        h.advance(60_000);
        assert_eq!(h.opened.len(), 1);
        assert!(h.conn.connect().is_empty());
    }

    #[test]
    fn test_teardown_closes_live_handle() {
        let mut h = Harness::new(URL);
        h.start();
        h.open();
        assert_eq!(h.conn.teardown(), vec![Command::Close { id: 1 }]);
        assert!(!h.conn.on_open(1));
        assert!(h.conn.on_error(1).is_empty());
        assert!(h.conn.teardown().is_empty());
        assert!(!h.conn.is_active());
    }

    #[test]
    fn test_end_to_end_reconnect_scenario() {
        let mut h = Harness::new(URL);
        h.start();
        h.open();
        assert!(h.conn.state().connected);
        assert_eq!(h.conn.state().retry_count, 0);

        h.fail();
        assert_eq!(
            &h.log[1..],
            &[
                Command::Close { id: 1 },
                Command::ScheduleRetry {
                    after: 1,
                    delay: Duration::from_millis(1000)
                },
            ]
        );
        assert!(h.conn.state().connected);
        assert_eq!(h.conn.current(), None);

        h.advance(999);
        assert_eq!(h.opened, vec![1]);
        h.advance(1);
        assert_eq!(h.opened, vec![1, 2]);
        assert_eq!(h.conn.state().phase, Phase::Connecting);

        h.fail();
        assert!(!h.conn.state().connected);
        assert_eq!(h.last_retry_delay(), Some(2000));
    }
}
