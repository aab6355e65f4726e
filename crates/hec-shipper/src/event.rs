//! Producer input and wire-level event types.
//!
//! A [`LogLine`] is what the host application hands to the shipper; a
//! [`HecEvent`] is the JSON object the collector receives. The conversion
//! between the two lives in the processor, which owns the per-stream
//! envelope (host, source, sourcetype, index).

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::value::RawValue;

/// A single raw log line captured by the host application.
///
/// The timestamp is taken when the line is captured, not when it is sent,
/// so delivery delays never skew event times.
#[derive(Clone, Debug)]
pub struct LogLine {
    /// Raw line bytes, without a trailing newline.
    pub line: Vec<u8>,
    /// Origin stream of the line, e.g. `stdout` or `stderr`.
    pub source: String,
    /// Capture time of the line.
    pub timestamp: SystemTime,
}

impl LogLine {
    /// Creates a line stamped with the current time.
    #[must_use]
    pub fn new(line: impl Into<Vec<u8>>, source: impl Into<String>) -> Self {
        LogLine {
            line: line.into(),
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// One formatted collector event, serialized as a single JSON object.
///
/// Field order and omission rules follow the HEC JSON event schema: the
/// `source`, `sourcetype`, and `index` envelope fields are left out
/// entirely when not configured.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct HecEvent {
    pub(crate) event: EventPayload,
    pub(crate) time: String,
    pub(crate) host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) source: Option<String>,
    #[serde(rename = "sourcetype", skip_serializing_if = "Option::is_none")]
    pub(crate) source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index: Option<String>,
}

/// Shape of the `event` field, depending on the configured format.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum EventPayload {
    /// Raw format: the prefixed line as a plain string.
    Text(String),
    /// Inline and json formats: a structured record.
    Record(EventRecord),
}

/// Structured payload carrying the line plus stream metadata.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct EventRecord {
    pub(crate) line: LineValue,
    pub(crate) source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tag: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) attrs: BTreeMap<String, String>,
}

/// The line itself: plain text, or a verbatim JSON document in json format.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum LineValue {
    Text(String),
    Json(Box<RawValue>),
}

/// Renders a capture time as epoch seconds with microsecond precision.
///
/// The collector expects a decimal string. Nanoseconds are rounded to the
/// nearest microsecond; times before the epoch clamp to zero.
pub(crate) fn format_event_time(timestamp: SystemTime) -> String {
    let nanos = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let micros = (nanos + 500) / 1_000;
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at_nanos(nanos: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(nanos)
    }

    #[test]
    fn test_format_event_time_whole_seconds() {
        assert_eq!(format_event_time(at_nanos(5_000_000_000)), "5.000000");
    }

    #[test]
    fn test_format_event_time_rounds_nanos() {
        assert_eq!(format_event_time(at_nanos(1_499)), "0.000001");
        assert_eq!(format_event_time(at_nanos(1_500)), "0.000002");
    }

    #[test]
    fn test_format_event_time_carries_into_seconds() {
        assert_eq!(format_event_time(at_nanos(999_999_999_900)), "1000.000000");
    }

    #[test]
    fn test_format_event_time_before_epoch_clamps() {
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(format_event_time(before), "0.000000");
    }

    #[test]
    fn test_event_serializes_full_envelope() {
        let event = HecEvent {
            event: EventPayload::Text("hello".to_string()),
            time: "1.000000".to_string(),
            host: "web-1".to_string(),
            source: Some("api".to_string()),
            source_type: Some("access".to_string()),
            index: Some("main".to_string()),
        };

        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"event":"hello","time":"1.000000","host":"web-1","source":"api","sourcetype":"access","index":"main"}"#
        );
    }

    #[test]
    fn test_event_omits_missing_envelope_fields() {
        let event = HecEvent {
            event: EventPayload::Text("hello".to_string()),
            time: "1.000000".to_string(),
            host: "web-1".to_string(),
            source: None,
            source_type: None,
            index: None,
        };

        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"event":"hello","time":"1.000000","host":"web-1"}"#
        );
    }

    #[test]
    fn test_record_payload_omits_empty_tag_and_attrs() {
        let record = EventRecord {
            line: LineValue::Text("a line".to_string()),
            source: "stdout".to_string(),
            tag: None,
            attrs: BTreeMap::new(),
        };

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"line":"a line","source":"stdout"}"#
        );
    }

    #[test]
    fn test_record_payload_serializes_attrs_sorted() {
        let record = EventRecord {
            line: LineValue::Text("a line".to_string()),
            source: "stdout".to_string(),
            tag: Some("web".to_string()),
            attrs: BTreeMap::from([
                ("zone".to_string(), "eu".to_string()),
                ("app".to_string(), "shop".to_string()),
            ]),
        };

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"line":"a line","source":"stdout","tag":"web","attrs":{"app":"shop","zone":"eu"}}"#
        );
    }

    #[test]
    fn test_line_value_embeds_json_verbatim() {
        let raw: Box<RawValue> = serde_json::from_str(r#"{"level": "info","n":1}"#).unwrap();
        let record = EventRecord {
            line: LineValue::Json(raw),
            source: "stdout".to_string(),
            tag: None,
            attrs: BTreeMap::new(),
        };

        // The original document text survives, spacing included.
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"line":{"level": "info","n":1},"source":"stdout"}"#
        );
    }
}
