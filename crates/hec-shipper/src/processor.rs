//! Record formatting: raw lines into collector events.
//!
//! The processor is the pure, stateless front of the pipeline. It is built
//! once at construction from the resolved configuration and stream
//! metadata, and from then on maps each [`LogLine`] to a ready-to-send
//! [`HecEvent`] without touching any shared state.
//!
//! # Formats
//!
//! - **inline**: the line embedded as plain text inside a structured
//!   payload carrying the stream source, tag, and attributes.
//! - **json**: like inline, but a line that is itself a well-formed JSON
//!   document is embedded verbatim instead of re-quoted; anything else
//!   silently falls back to plain text.
//! - **raw**: the payload is a bare string, the line prefixed with the tag
//!   and `key=value` attributes. Whitespace-only lines are suppressed
//!   entirely, since the collector rejects empty raw events.

use std::collections::BTreeMap;

use serde_json::value::RawValue;

use crate::config::{ConfigError, RecordFormat, ShipperConfig, StreamInfo};
use crate::event::{format_event_time, EventPayload, EventRecord, HecEvent, LineValue, LogLine};

/// Stateless formatter owning the resolved event envelope.
#[derive(Clone, Debug)]
pub(crate) struct EventProcessor {
    host: String,
    source: Option<String>,
    source_type: Option<String>,
    index: Option<String>,
    variant: FormatVariant,
}

/// Per-format constants resolved at construction.
#[derive(Clone, Debug)]
enum FormatVariant {
    Inline {
        tag: Option<String>,
        attrs: BTreeMap<String, String>,
    },
    Json {
        tag: Option<String>,
        attrs: BTreeMap<String, String>,
    },
    Raw {
        prefix: String,
    },
}

impl EventProcessor {
    /// Resolves the envelope, tag, and attributes for one stream.
    pub(crate) fn new(config: &ShipperConfig, info: &StreamInfo) -> Result<Self, ConfigError> {
        let tag = config.render_tag(info)?;
        let attrs = config.extra_attrs(info);

        let variant = match config.format {
            RecordFormat::Inline => FormatVariant::Inline { tag, attrs },
            RecordFormat::Json => FormatVariant::Json { tag, attrs },
            RecordFormat::Raw => FormatVariant::Raw {
                prefix: raw_prefix(tag.as_deref(), &attrs),
            },
        };

        Ok(EventProcessor {
            host: info.resolve_hostname(),
            source: config.source.clone(),
            source_type: config.source_type.clone(),
            index: config.index.clone(),
            variant,
        })
    }

    /// Formats one captured line.
    ///
    /// Returns `None` when the record is deliberately suppressed (a
    /// whitespace-only line in raw format); callers treat that as a
    /// successful no-op, never as an error.
    pub(crate) fn process(&self, line: &LogLine) -> Option<HecEvent> {
        let payload = match &self.variant {
            FormatVariant::Inline { tag, attrs } => EventPayload::Record(EventRecord {
                line: LineValue::Text(text_of(&line.line)),
                source: line.source.clone(),
                tag: tag.clone(),
                attrs: attrs.clone(),
            }),
            FormatVariant::Json { tag, attrs } => EventPayload::Record(EventRecord {
                line: json_or_text(&line.line),
                source: line.source.clone(),
                tag: tag.clone(),
                attrs: attrs.clone(),
            }),
            FormatVariant::Raw { prefix } => {
                let text = text_of(&line.line);
                if text.trim().is_empty() {
                    return None;
                }
                EventPayload::Text(format!("{prefix}{text}"))
            }
        };

        Some(HecEvent {
            event: payload,
            time: format_event_time(line.timestamp),
            host: self.host.clone(),
            source: self.source.clone(),
            source_type: self.source_type.clone(),
            index: self.index.clone(),
        })
    }
}

fn text_of(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// Embeds a well-formed JSON line verbatim, anything else as text.
fn json_or_text(line: &[u8]) -> LineValue {
    let text = text_of(line);
    match serde_json::from_str::<Box<RawValue>>(&text) {
        Ok(raw) => LineValue::Json(raw),
        Err(_) => LineValue::Text(text),
    }
}

/// Builds the raw-format line prefix: tag first, then `key=value` pairs,
/// each followed by a single space.
fn raw_prefix(tag: Option<&str>, attrs: &BTreeMap<String, String>) -> String {
    let mut prefix = String::new();
    if let Some(tag) = tag {
        prefix.push_str(tag);
        prefix.push(' ');
    }
    for (key, value) in attrs {
        prefix.push_str(key);
        prefix.push('=');
        prefix.push_str(value);
        prefix.push(' ');
    }
    prefix
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, UNIX_EPOCH};

    use crate::config::{OPT_FORMAT, OPT_INDEX, OPT_LABELS, OPT_SOURCE, OPT_SOURCETYPE, OPT_TAG, OPT_TOKEN, OPT_URL};

    fn create_test_config(extra: &[(&str, &str)]) -> ShipperConfig {
        let mut options = HashMap::from([
            (OPT_URL.to_string(), "https://hec.example.com:8088".to_string()),
            (OPT_TOKEN.to_string(), "token".to_string()),
        ]);
        for (key, value) in extra {
            options.insert((*key).to_string(), (*value).to_string());
        }
        ShipperConfig::from_options(&options).unwrap()
    }

    fn create_test_info() -> StreamInfo {
        StreamInfo {
            stream_id: "feedfacecafe0123".to_string(),
            stream_name: "orders".to_string(),
            labels: HashMap::from([("team".to_string(), "checkout".to_string())]),
            env_vars: Vec::new(),
            hostname: Some("web-1".to_string()),
        }
    }

    fn line_at_epoch(text: &str) -> LogLine {
        LogLine {
            line: text.as_bytes().to_vec(),
            source: "stdout".to_string(),
            timestamp: UNIX_EPOCH + Duration::from_secs(42),
        }
    }

    #[test]
    fn test_inline_format_wraps_line_as_text() {
        let config = create_test_config(&[
            (OPT_SOURCE, "api"),
            (OPT_SOURCETYPE, "access"),
            (OPT_INDEX, "main"),
        ]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor.process(&line_at_epoch("hello world")).unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert_eq!(
            wire,
            r#"{"event":{"line":"hello world","source":"stdout","tag":"feedfacecafe"},"time":"42.000000","host":"web-1","source":"api","sourcetype":"access","index":"main"}"#
        );
    }

    #[test]
    fn test_inline_format_includes_filtered_attrs() {
        let config = create_test_config(&[(OPT_LABELS, "team")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor.process(&line_at_epoch("x")).unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains(r#""attrs":{"team":"checkout"}"#));
    }

    #[test]
    fn test_json_format_embeds_valid_json_verbatim() {
        let config = create_test_config(&[(OPT_FORMAT, "json"), (OPT_TAG, "")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor
            .process(&line_at_epoch(r#"{"level": "info", "n": 7}"#))
            .unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        // Verbatim embedding keeps the original spacing of the document.
        assert!(wire.contains(r#""line":{"level": "info", "n": 7}"#));
    }

    #[test]
    fn test_json_format_falls_back_to_text() {
        let config = create_test_config(&[(OPT_FORMAT, "json"), (OPT_TAG, "")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor
            .process(&line_at_epoch("plain old log line"))
            .unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains(r#""line":"plain old log line""#));
    }

    #[test]
    fn test_json_format_rejects_trailing_garbage() {
        let config = create_test_config(&[(OPT_FORMAT, "json"), (OPT_TAG, "")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor
            .process(&line_at_epoch(r#"{"a":1} trailing"#))
            .unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains(r#""line":"{\"a\":1} trailing""#));
    }

    #[test]
    fn test_raw_format_prefixes_tag_and_attrs() {
        let config = create_test_config(&[(OPT_FORMAT, "raw"), (OPT_LABELS, "team")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor.process(&line_at_epoch("boom")).unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains(r#""event":"feedfacecafe team=checkout boom""#));
    }

    #[test]
    fn test_raw_format_without_tag_or_attrs_is_bare() {
        let config = create_test_config(&[(OPT_FORMAT, "raw"), (OPT_TAG, "")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor.process(&line_at_epoch("boom")).unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains(r#""event":"boom""#));
    }

    #[test]
    fn test_raw_format_suppresses_whitespace_only_lines() {
        let config = create_test_config(&[(OPT_FORMAT, "raw")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        assert!(processor.process(&line_at_epoch("")).is_none());
        assert!(processor.process(&line_at_epoch(" \t \n")).is_none());
    }

    #[test]
    fn test_inline_format_keeps_whitespace_only_lines() {
        let config = create_test_config(&[]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        assert!(processor.process(&line_at_epoch("   ")).is_some());
    }

    #[test]
    fn test_non_utf8_line_is_embedded_lossily() {
        let config = create_test_config(&[(OPT_TAG, "")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let line = LogLine {
            line: vec![0x66, 0x6f, 0xff, 0x6f],
            source: "stdout".to_string(),
            timestamp: UNIX_EPOCH + Duration::from_secs(1),
        };
        let event = processor.process(&line).unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains("fo\u{fffd}o"));
    }

    #[test]
    fn test_envelope_fields_omitted_when_unconfigured() {
        let config = create_test_config(&[(OPT_TAG, "")]);
        let processor = EventProcessor::new(&config, &create_test_info()).unwrap();

        let event = processor.process(&line_at_epoch("x")).unwrap();
        let wire = serde_json::to_string(&event).unwrap();

        assert!(!wire.contains("sourcetype"));
        assert!(!wire.contains("index"));
        assert!(wire.contains(r#""host":"web-1""#));
    }
}
