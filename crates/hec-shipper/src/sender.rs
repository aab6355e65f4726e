//! Chunked delivery of assembled events to the collector.
//!
//! [`BatchSender`] owns the HTTP client for the lifetime of the pipeline. A
//! chunk is serialized record by record into one request body, optionally
//! gzipped, and posted with the precomputed headers. Only `200 OK` counts as
//! delivered; everything else surfaces as a [`DeliveryError`] and the caller
//! decides what happens to the records.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING};
use reqwest::{Client, Method, Response, StatusCode, Url};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::{ConfigError, ShipperConfig, OPT_TOKEN};
use crate::constants::MAX_RESPONSE_BYTES;
use crate::event::HecEvent;
use crate::http::build_client;

/// Header carrying the acknowledgment channel id, fresh per request.
const REQUEST_CHANNEL_HEADER: &str = "X-Splunk-Request-Channel";

/// A single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response: connect, TLS, or timeout.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The collector answered with something other than `200 OK`.
    #[error("failed to send event - {status} - {body}")]
    Status {
        /// Status line of the refusal.
        status: StatusCode,
        /// Leading bytes of the response body.
        body: String,
    },
    /// A record refused to serialize.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    /// The gzip encoder failed mid-stream.
    #[error("failed to compress request body: {0}")]
    Compress(#[from] std::io::Error),
}

/// Performs the HTTP legs of the pipeline: the pre-flight check and the
/// per-chunk POSTs.
#[derive(Debug)]
pub(crate) struct BatchSender {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
    gzip: bool,
    level: Compression,
    index_ack: bool,
}

impl BatchSender {
    /// Builds the sender and its TLS-configured client from the resolved
    /// configuration.
    pub(crate) fn new(config: &ShipperConfig) -> Result<Self, ConfigError> {
        let client = build_client(config)?;
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&format!("Splunk {}", config.token))
            .map_err(|_| ConfigError::InvalidHeaderValue(OPT_TOKEN))?;
        headers.insert(AUTHORIZATION, token);
        if config.gzip {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        let level = if config.gzip_level < 0 {
            Compression::default()
        } else {
            Compression::new(config.gzip_level.unsigned_abs())
        };
        Ok(BatchSender {
            client,
            endpoint: config.endpoint.clone(),
            headers,
            gzip: config.gzip,
            level,
            index_ack: config.index_ack,
        })
    }

    /// Serializes one chunk and posts it, expecting `200 OK`.
    ///
    /// An empty chunk is a no-op. With acknowledgment enabled every request
    /// carries a channel id the collector has never seen before.
    pub(crate) async fn send_batch(&self, events: &[HecEvent]) -> Result<(), DeliveryError> {
        if events.is_empty() {
            return Ok(());
        }
        let body = self.encode(events)?;
        debug!(
            events = events.len(),
            bytes = body.len(),
            "posting batch to the collector"
        );
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .body(body);
        if self.index_ack {
            request = request.header(REQUEST_CHANNEL_HEADER, Uuid::new_v4().to_string());
        }
        check_status(request.send().await?).await
    }

    /// Issues the OPTIONS pre-flight used to validate the endpoint before any
    /// event is accepted.
    pub(crate) async fn verify_connection(&self) -> Result<(), DeliveryError> {
        let request = self.client.request(Method::OPTIONS, self.endpoint.clone());
        check_status(request.send().await?).await
    }

    /// Serializes records back to back and applies gzip when configured.
    fn encode(&self, events: &[HecEvent]) -> Result<Vec<u8>, DeliveryError> {
        let mut payload = Vec::new();
        for event in events {
            serde_json::to_writer(&mut payload, event)?;
        }
        if !self.gzip {
            return Ok(payload);
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len()), self.level);
        encoder.write_all(&payload)?;
        Ok(encoder.finish()?)
    }
}

/// Reads the status and drains the body, succeeding only on `200 OK`.
async fn check_status(response: Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status == StatusCode::OK {
        // Drain the success body so the connection goes back to the pool.
        let _ = response.bytes().await;
        return Ok(());
    }
    let body = read_truncated(response).await;
    Err(DeliveryError::Status { status, body })
}

/// Drains the response to completion, keeping at most [`MAX_RESPONSE_BYTES`]
/// of it for the error message.
async fn read_truncated(mut response: Response) -> String {
    let mut kept = Vec::with_capacity(MAX_RESPONSE_BYTES);
    while let Ok(Some(chunk)) = response.chunk().await {
        if kept.len() < MAX_RESPONSE_BYTES {
            let take = chunk.len().min(MAX_RESPONSE_BYTES - kept.len());
            kept.extend_from_slice(&chunk[..take]);
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}
