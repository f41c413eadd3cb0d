//! Live event records pushed by the results backend
//!
//! Every frame on the feed is a JSON object carrying an `event` discriminator
//! plus free-form fields. Only the discriminator is typed here; the rest is
//! kept as an opaque map for the consumers that care about it.

use serde::Serialize;
use serde_json::{Map, Value};

/// Known event discriminators emitted by the scraper backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Initial status frame sent when a subscriber attaches
    Connected,
    /// A manual scrape was triggered
    ScrapeStart,
    /// A scrape cycle finished and fresh data is available
    ScrapeComplete,
    /// A scrape cycle failed
    ScrapeError,
    /// A batch of result sheets went through OCR
    OcrComplete,
    /// Anything else
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Connected,
        EventKind::ScrapeStart,
        EventKind::ScrapeComplete,
        EventKind::ScrapeError,
        EventKind::OcrComplete,
    ];

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "connected" => EventKind::Connected,
            "scrape_start" => EventKind::ScrapeStart,
            "scrape_complete" => EventKind::ScrapeComplete,
            "scrape_error" => EventKind::ScrapeError,
            "ocr_complete" => EventKind::OcrComplete,
            _ => EventKind::Other,
        }
    }

    /// Wire name of the discriminator ("" for `Other`)
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::ScrapeStart => "scrape_start",
            EventKind::ScrapeComplete => "scrape_complete",
            EventKind::ScrapeError => "scrape_error",
            EventKind::OcrComplete => "ocr_complete",
            EventKind::Other => "",
        }
    }
}

/// A parsed feed message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveEvent {
    /// Discriminator taken from the `event` field
    pub event: String,
    /// Every other field of the message, untouched
    pub payload: Map<String, Value>,
    /// 1-based arrival number, assigned by the connection when delivered
    pub sequence: u64,
}

impl LiveEvent {
    pub fn new(event: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event: event.into(),
            payload,
            sequence: 0,
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_tag(&self.event)
    }

    pub fn is(&self, kind: EventKind) -> bool {
        self.kind() == kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Rebuild the message as it appeared on the wire
    pub fn to_json(&self) -> Value {
        let mut map = self.payload.clone();
        map.insert("event".to_string(), Value::String(self.event.clone()));
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(EventKind::from_tag("scrape_complete"), EventKind::ScrapeComplete);
        assert_eq!(EventKind::from_tag("scrape_error"), EventKind::ScrapeError);
        assert_eq!(EventKind::from_tag("connected"), EventKind::Connected);
        assert_eq!(EventKind::from_tag("SCRAPE_COMPLETE"), EventKind::Other);
        assert_eq!(EventKind::from_tag(""), EventKind::Other);
    }

    #[test]
    fn test_tag_matches_from_tag() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_tag(kind.tag()), kind);
        }
    }

    #[test]
    fn test_to_json_restores_discriminator() {
        let mut payload = Map::new();
        payload.insert("scrape_count".into(), json!(7));
        let event = LiveEvent::new("scrape_complete", payload);

        assert!(event.is(EventKind::ScrapeComplete));
        assert_eq!(event.get("scrape_count"), Some(&json!(7)));
        assert_eq!(
            event.to_json(),
            json!({"event": "scrape_complete", "scrape_count": 7})
        );
    }
}
