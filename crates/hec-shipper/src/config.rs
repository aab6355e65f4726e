//! Shipper configuration and stream metadata.
//!
//! Options arrive as a string-keyed map from the embedding application and
//! are resolved once, at construction, into an immutable [`ShipperConfig`].
//! Unknown keys, malformed values, and unusable combinations are all
//! construction-time errors; nothing is validated lazily on the send path.
//!
//! # Recognized options
//!
//! | key | meaning |
//! |-----|---------|
//! | `hec-url` | collector base URL, `scheme://host[:port]` (required) |
//! | `hec-token` | HEC access token (required) |
//! | `hec-source` | `source` envelope field |
//! | `hec-sourcetype` | `sourcetype` envelope field |
//! | `hec-index` | `index` envelope field |
//! | `hec-capath` | PEM root certificate to trust |
//! | `hec-caname` | rejected; see [`ConfigError::UnsupportedOption`] |
//! | `hec-insecureskipverify` | skip TLS certificate verification |
//! | `hec-format` | `inline` (default), `json`, or `raw` |
//! | `hec-verify-connection` | OPTIONS pre-flight at startup (default true) |
//! | `hec-gzip` | gzip request bodies |
//! | `hec-gzip-level` | gzip level, `-1` (default level) through `9` |
//! | `hec-index-acknowledgment` | request indexer acknowledgment channels |
//! | `env` / `env-regex` | environment variables copied into `attrs` |
//! | `labels` / `labels-regex` | stream labels copied into `attrs` |
//! | `tag` | tag template; empty string disables the tag |
//!
//! # Advanced tunables
//!
//! Batch period, batch size, buffer maximum, and channel capacity are read
//! from `HEC_SHIPPER_*` environment variables. These are lenient: an
//! unparsable override is reported and the default is kept.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use thiserror::Error;
use tracing::{error, warn};

use crate::constants::{
    COLLECTOR_PATH, DEFAULT_BATCH_SIZE, DEFAULT_BUFFER_MAXIMUM, DEFAULT_CHANNEL_SIZE,
    DEFAULT_POST_BATCH_PERIOD, ENV_BATCH_SIZE, ENV_BUFFER_MAXIMUM, ENV_CHANNEL_SIZE,
    ENV_POST_BATCH_PERIOD_MS,
};

/// Collector base URL (required).
pub const OPT_URL: &str = "hec-url";
/// HEC access token (required).
pub const OPT_TOKEN: &str = "hec-token";
/// Event `source` envelope field.
pub const OPT_SOURCE: &str = "hec-source";
/// Event `sourcetype` envelope field.
pub const OPT_SOURCETYPE: &str = "hec-sourcetype";
/// Event `index` envelope field.
pub const OPT_INDEX: &str = "hec-index";
/// Path to a PEM root certificate to trust.
pub const OPT_CA_PATH: &str = "hec-capath";
/// Server name override for certificate validation (not supported).
pub const OPT_CA_NAME: &str = "hec-caname";
/// Skip TLS certificate verification.
pub const OPT_INSECURE_SKIP_VERIFY: &str = "hec-insecureskipverify";
/// Record format selector.
pub const OPT_FORMAT: &str = "hec-format";
/// Run the OPTIONS pre-flight at construction.
pub const OPT_VERIFY_CONNECTION: &str = "hec-verify-connection";
/// Enable gzip compression of request bodies.
pub const OPT_GZIP: &str = "hec-gzip";
/// Gzip compression level.
pub const OPT_GZIP_LEVEL: &str = "hec-gzip-level";
/// Enable indexer acknowledgment channels.
pub const OPT_INDEX_ACK: &str = "hec-index-acknowledgment";
/// Comma-separated environment variable names copied into `attrs`.
pub const OPT_ENV: &str = "env";
/// Regex over environment variable names copied into `attrs`.
pub const OPT_ENV_REGEX: &str = "env-regex";
/// Comma-separated label keys copied into `attrs`.
pub const OPT_LABELS: &str = "labels";
/// Regex over label keys copied into `attrs`.
pub const OPT_LABELS_REGEX: &str = "labels-regex";
/// Tag template.
pub const OPT_TAG: &str = "tag";

const KNOWN_OPTIONS: &[&str] = &[
    OPT_URL,
    OPT_TOKEN,
    OPT_SOURCE,
    OPT_SOURCETYPE,
    OPT_INDEX,
    OPT_CA_PATH,
    OPT_CA_NAME,
    OPT_INSECURE_SKIP_VERIFY,
    OPT_FORMAT,
    OPT_VERIFY_CONNECTION,
    OPT_GZIP,
    OPT_GZIP_LEVEL,
    OPT_INDEX_ACK,
    OPT_ENV,
    OPT_ENV_REGEX,
    OPT_LABELS,
    OPT_LABELS_REGEX,
    OPT_TAG,
];

/// Default tag template: the short stream id.
pub const DEFAULT_TAG_TEMPLATE: &str = "{id}";

/// Errors raised while resolving options into a [`ShipperConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown log option '{0}'")]
    UnknownOption(String),
    #[error("option '{0}' is required")]
    MissingOption(&'static str),
    #[error("expected format scheme://host[:port] for '{key}', got '{value}'")]
    InvalidUrl { key: &'static str, value: String },
    #[error("invalid boolean '{value}' for '{key}'")]
    InvalidBool { key: &'static str, value: String },
    #[error("unsupported level '{0}' for '{key}' (supported values between -1 and 9)", key = OPT_GZIP_LEVEL)]
    UnsupportedGzipLevel(String),
    #[error("unknown format '{0}', supported formats are inline, json and raw")]
    UnknownFormat(String),
    #[error("invalid regular expression for '{key}': {source}")]
    InvalidRegex {
        key: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("unknown placeholder '{{{0}}}' in tag template")]
    UnknownTagPlaceholder(String),
    #[error("unclosed placeholder in tag template")]
    UnclosedTagPlaceholder,
    #[error("cannot read CA certificate at '{path}': {source}")]
    CaCertificateRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CA certificate at '{path}': {source}")]
    CaCertificateParse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("option '{0}' is not supported with the rustls TLS backend")]
    UnsupportedOption(&'static str),
    #[error("option '{0}' contains characters not allowed in an HTTP header")]
    InvalidHeaderValue(&'static str),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Record format selected with `hec-format`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RecordFormat {
    /// Structured payload with the line embedded as plain text.
    #[default]
    Inline,
    /// Structured payload with JSON lines embedded verbatim.
    Json,
    /// The prefixed line as a bare string payload.
    Raw,
}

impl RecordFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "inline" => Ok(RecordFormat::Inline),
            "json" => Ok(RecordFormat::Json),
            "raw" => Ok(RecordFormat::Raw),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Metadata describing the log stream being shipped.
///
/// The embedding application fills this in once per stream; the shipper
/// renders the tag template against it and filters its labels and
/// environment entries into event attributes.
#[derive(Clone, Debug, Default)]
pub struct StreamInfo {
    /// Stable identifier of the stream (container id, task id, ...).
    pub stream_id: String,
    /// Human-readable stream name.
    pub stream_name: String,
    /// Labels attached to the stream.
    pub labels: HashMap<String, String>,
    /// Environment of the stream, as `KEY=value` entries.
    pub env_vars: Vec<String>,
    /// Hostname override; detected when absent.
    pub hostname: Option<String>,
}

impl StreamInfo {
    /// First 12 characters of the stream id, the conventional short form.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.stream_id.get(..12).unwrap_or(&self.stream_id)
    }

    /// Resolves the event `host` field.
    ///
    /// Preference order: the explicit override, the `HOSTNAME` environment
    /// variable, the system hostname, and finally `"unknown"`. A missing
    /// hostname is never a construction failure.
    #[must_use]
    pub fn resolve_hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            if !hostname.is_empty() {
                return hostname.clone();
            }
        }

        if let Ok(hostname) = env::var("HOSTNAME") {
            if !hostname.is_empty() {
                return hostname;
            }
        }

        match nix::unistd::gethostname() {
            Ok(hostname) => {
                if let Some(hostname) = hostname.to_str() {
                    if !hostname.is_empty() {
                        return hostname.to_string();
                    }
                }
            }
            Err(source) => {
                warn!(%source, "failed to read system hostname");
            }
        }

        warn!("could not determine hostname, using 'unknown'");
        "unknown".to_string()
    }
}

/// Validated, immutable pipeline configuration.
///
/// Built once with [`ShipperConfig::from_options`] and read-only for the
/// pipeline's lifetime. Fields are public so tests and embedders can adjust
/// the resolved values before handing the config to the shipper.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    /// Full collector endpoint, with the event path appended.
    pub endpoint: Url,
    /// HEC access token.
    pub token: String,
    /// `source` envelope passthrough.
    pub source: Option<String>,
    /// `sourcetype` envelope passthrough.
    pub source_type: Option<String>,
    /// `index` envelope passthrough.
    pub index: Option<String>,
    /// Extra PEM root certificate to trust.
    pub ca_path: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure_skip_verify: bool,
    /// Selected record format.
    pub format: RecordFormat,
    /// Run the OPTIONS pre-flight at construction.
    pub verify_connection: bool,
    /// Gzip request bodies.
    pub gzip: bool,
    /// Gzip level, `-1` for the library default.
    pub gzip_level: i32,
    /// Request indexer acknowledgment channels.
    pub index_ack: bool,
    /// Tag template; `None` when the tag is disabled.
    pub tag_template: Option<String>,
    /// Environment variable names copied into `attrs`.
    pub env_filter: Vec<String>,
    /// Regex over environment variable names copied into `attrs`.
    pub env_regex: Option<Regex>,
    /// Label keys copied into `attrs`.
    pub label_filter: Vec<String>,
    /// Regex over label keys copied into `attrs`.
    pub label_regex: Option<Regex>,
    /// Worker timer period.
    pub batch_period: Duration,
    /// Records per outbound request.
    pub batch_size: usize,
    /// Unsent records retained before the overflow policy drops.
    pub buffer_maximum: usize,
    /// Intake channel capacity.
    pub channel_size: usize,
}

impl ShipperConfig {
    /// Resolves a string-keyed option map into a validated configuration.
    ///
    /// Unknown keys and malformed values fail here; the advanced
    /// `HEC_SHIPPER_*` environment tunables are applied leniently.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
        for key in options.keys() {
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                return Err(ConfigError::UnknownOption(key.clone()));
            }
        }

        if options.contains_key(OPT_CA_NAME) {
            return Err(ConfigError::UnsupportedOption(OPT_CA_NAME));
        }

        let endpoint = parse_endpoint(options)?;

        let token = options
            .get(OPT_TOKEN)
            .ok_or(ConfigError::MissingOption(OPT_TOKEN))?
            .clone();

        let format = match options.get(OPT_FORMAT) {
            Some(value) => RecordFormat::parse(value)?,
            None => RecordFormat::default(),
        };

        let gzip_level = match options.get(OPT_GZIP_LEVEL) {
            Some(value) => match value.parse::<i32>() {
                Ok(level) if (-1..=9).contains(&level) => level,
                _ => return Err(ConfigError::UnsupportedGzipLevel(value.clone())),
            },
            None => -1,
        };

        // A missing tag option means the default template; an explicitly
        // empty one disables the tag entirely.
        let tag_template = match options.get(OPT_TAG) {
            None => Some(DEFAULT_TAG_TEMPLATE.to_string()),
            Some(template) if template.is_empty() => None,
            Some(template) => Some(template.clone()),
        };

        Ok(ShipperConfig {
            endpoint,
            token,
            source: non_empty(options.get(OPT_SOURCE)),
            source_type: non_empty(options.get(OPT_SOURCETYPE)),
            index: non_empty(options.get(OPT_INDEX)),
            ca_path: options.get(OPT_CA_PATH).map(PathBuf::from),
            insecure_skip_verify: parse_bool(options, OPT_INSECURE_SKIP_VERIFY, false)?,
            format,
            verify_connection: parse_bool(options, OPT_VERIFY_CONNECTION, true)?,
            gzip: parse_bool(options, OPT_GZIP, false)?,
            gzip_level,
            index_ack: parse_bool(options, OPT_INDEX_ACK, false)?,
            tag_template,
            env_filter: comma_list(options.get(OPT_ENV)),
            env_regex: parse_regex(options, OPT_ENV_REGEX)?,
            label_filter: comma_list(options.get(OPT_LABELS)),
            label_regex: parse_regex(options, OPT_LABELS_REGEX)?,
            batch_period: advanced_period(ENV_POST_BATCH_PERIOD_MS, DEFAULT_POST_BATCH_PERIOD),
            batch_size: advanced_count(ENV_BATCH_SIZE, DEFAULT_BATCH_SIZE),
            buffer_maximum: advanced_count(ENV_BUFFER_MAXIMUM, DEFAULT_BUFFER_MAXIMUM),
            channel_size: advanced_count(ENV_CHANNEL_SIZE, DEFAULT_CHANNEL_SIZE),
        })
    }

    /// Renders the tag template against the stream metadata.
    ///
    /// Placeholders: `{id}` (short id), `{full_id}`, `{name}`. Literal text
    /// passes through. Returns `None` when the tag is disabled or renders
    /// empty.
    pub(crate) fn render_tag(&self, info: &StreamInfo) -> Result<Option<String>, ConfigError> {
        let Some(template) = &self.tag_template else {
            return Ok(None);
        };

        let mut rendered = String::new();
        let mut rest = template.as_str();
        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(ConfigError::UnclosedTagPlaceholder);
            };
            match &after[..close] {
                "id" => rendered.push_str(info.short_id()),
                "full_id" => rendered.push_str(&info.stream_id),
                "name" => rendered.push_str(&info.stream_name),
                unknown => return Err(ConfigError::UnknownTagPlaceholder(unknown.to_string())),
            }
            rest = &after[close + 1..];
        }
        rendered.push_str(rest);

        Ok(if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        })
    }

    /// Selects the extra attributes for this stream.
    ///
    /// Labels are matched first by the exact list, then by regex;
    /// environment entries follow and overwrite labels on key collision.
    /// The result is ordered so downstream rendering is deterministic.
    pub(crate) fn extra_attrs(&self, info: &StreamInfo) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();

        for key in &self.label_filter {
            if let Some(value) = info.labels.get(key) {
                attrs.insert(key.clone(), value.clone());
            }
        }
        if let Some(pattern) = &self.label_regex {
            for (key, value) in &info.labels {
                if pattern.is_match(key) {
                    attrs.insert(key.clone(), value.clone());
                }
            }
        }

        for entry in &info.env_vars {
            let Some((key, value)) = entry.split_once('=') else {
                continue;
            };
            let selected = self.env_filter.iter().any(|name| name == key)
                || self
                    .env_regex
                    .as_ref()
                    .is_some_and(|pattern| pattern.is_match(key));
            if selected {
                attrs.insert(key.to_string(), value.to_string());
            }
        }

        attrs
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|value| !value.is_empty()).cloned()
}

fn comma_list(value: Option<&String>) -> Vec<String> {
    value.map_or_else(Vec::new, |list| {
        list.split(',')
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn parse_bool(
    options: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match options.get(key).map(String::as_str) {
        None => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidBool {
            key,
            value: other.to_string(),
        }),
    }
}

fn parse_regex(
    options: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<Regex>, ConfigError> {
    options
        .get(key)
        .map(|pattern| Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex { key, source }))
        .transpose()
}

fn parse_endpoint(options: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = options
        .get(OPT_URL)
        .ok_or(ConfigError::MissingOption(OPT_URL))?;

    let invalid = || ConfigError::InvalidUrl {
        key: OPT_URL,
        value: raw.clone(),
    };

    let mut url = Url::parse(raw).map_err(|_| invalid())?;
    let scheme_ok = url.scheme() == "http" || url.scheme() == "https";
    let bare = url.host_str().is_some()
        && (url.path().is_empty() || url.path() == "/")
        && url.query().is_none()
        && url.fragment().is_none();
    if !scheme_ok || !bare {
        return Err(invalid());
    }

    url.set_path(COLLECTOR_PATH);
    Ok(url)
}

fn advanced_period(name: &str, default: Duration) -> Duration {
    let Ok(raw) = env::var(name) else {
        return default;
    };
    if raw.is_empty() {
        return default;
    }
    match raw.parse::<u64>() {
        Ok(millis) if millis > 0 => Duration::from_millis(millis),
        _ => {
            error!(
                variable = name,
                value = %raw,
                default = ?default,
                "failed to parse period override, keeping default"
            );
            default
        }
    }
}

fn advanced_count(name: &str, default: usize) -> usize {
    let Ok(raw) = env::var(name) else {
        return default;
    };
    if raw.is_empty() {
        return default;
    }
    match raw.parse::<usize>() {
        Ok(count) if count > 0 => count,
        _ => {
            error!(
                variable = name,
                value = %raw,
                default = default,
                "failed to parse count override, keeping default"
            );
            default
        }
    }
}
