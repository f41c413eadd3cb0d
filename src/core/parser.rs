//! Decoder for feed message payloads
//!
//! A payload is accepted only if it is a JSON object whose `event` field is a
//! string. Anything else is dropped; decode failures never surface as errors.

use super::LiveEvent;
use serde_json::Value;
use tracing::trace;

/// Parse one message payload
///
/// Returns None for non-JSON text, non-object JSON, or a missing/non-string
/// `event` field. The returned event has `sequence == 0`.
pub fn parse_event(msg: &str) -> Option<LiveEvent> {
    trace!(len = msg.len(), "Parsing message");

    let json: Value = serde_json::from_str(msg)
        .map_err(|e| {
            trace!(error = %e, "Dropping non-JSON message");
        })
        .ok()?;

    let Value::Object(mut payload) = json else {
        trace!("Dropping non-object message");
        return None;
    };

    match payload.remove("event") {
        Some(Value::String(event)) => Some(LiveEvent::new(event, payload)),
        other => {
            trace!(event = ?other, "Dropping message without string discriminator");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;
    use serde_json::json;

    #[test]
    fn test_parse_scrape_complete() {
        let event = parse_event(r#"{"event":"scrape_complete","foo":1}"#).unwrap();
        assert_eq!(event.event, "scrape_complete");
        assert_eq!(event.get("foo"), Some(&json!(1)));
        assert!(event.get("event").is_none());
        assert_eq!(event.sequence, 0);
    }

    #[test]
    fn test_parse_connected_status() {
        let msg = r#"{
            "event": "connected",
            "last_scrape": null,
            "status": "idle",
            "error": null,
            "scrape_count": 0,
            "message": ""
        }"#;

        let event = parse_event(msg).unwrap();
        assert!(event.is(EventKind::Connected));
        assert_eq!(event.payload.len(), 5);
        assert_eq!(event.get("status"), Some(&json!("idle")));
    }

    #[test]
    fn test_ignore_non_json() {
        assert!(parse_event("not json").is_none());
        assert!(parse_event("").is_none());
        assert!(parse_event("{\"event\":").is_none());
    }

    #[test]
    fn test_ignore_non_object() {
        assert!(parse_event(r#""scrape_complete""#).is_none());
        assert!(parse_event(r#"["scrape_complete"]"#).is_none());
        assert!(parse_event("42").is_none());
    }

    #[test]
    fn test_ignore_missing_or_mistyped_discriminator() {
        assert!(parse_event(r#"{"foo":1}"#).is_none());
        assert!(parse_event(r#"{"event":1}"#).is_none());
        assert!(parse_event(r#"{"event":null}"#).is_none());
    }
}
