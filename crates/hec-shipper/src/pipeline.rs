//! The shipper handle: intake, lifecycle, and shutdown coordination.
//!
//! [`HecShipper`] is what the embedding application holds. Construction
//! resolves the stream's envelope, optionally probes the collector, and
//! spawns the single worker that owns the batch buffer. From then on the
//! handle only ever touches the intake channel, so enqueueing stays cheap
//! and close has one well-defined meaning: no more intake, flush what is
//! queued, then return.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ConfigError, ShipperConfig, StreamInfo};
use crate::event::{HecEvent, LogLine};
use crate::processor::EventProcessor;
use crate::sender::{BatchSender, DeliveryError};
use crate::worker::BatchWorker;

/// Failure constructing or feeding a shipper.
#[derive(Debug, Error)]
pub enum ShipperError {
    /// The option map or environment produced an unusable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The collector rejected the pre-flight connection check.
    #[error("failed to verify connection: {0}")]
    Verify(#[source] DeliveryError),
    /// The shipper was closed; no further records are accepted.
    #[error("shipper is closed")]
    Closed,
}

#[derive(Debug)]
struct Inner {
    tx: RwLock<Option<mpsc::Sender<HecEvent>>>,
    stopped: CancellationToken,
    processor: EventProcessor,
}

/// Handle to one log stream's delivery pipeline.
///
/// Clones are cheap and share the stream's worker; any clone may enqueue
/// concurrently and any may close the stream.
#[derive(Clone, Debug)]
pub struct HecShipper {
    inner: Arc<Inner>,
}

impl HecShipper {
    /// Builds the pipeline for one stream and starts its worker.
    ///
    /// With `hec-verify-connection` on (the default) the endpoint is probed
    /// first, so a bad URL or token fails construction before any record is
    /// accepted.
    pub async fn new(config: ShipperConfig, info: &StreamInfo) -> Result<Self, ShipperError> {
        let processor = EventProcessor::new(&config, info)?;
        let sender = BatchSender::new(&config)?;
        if config.verify_connection {
            sender
                .verify_connection()
                .await
                .map_err(ShipperError::Verify)?;
        }

        let (tx, rx) = mpsc::channel(config.channel_size);
        let stopped = CancellationToken::new();
        let worker = BatchWorker::new(rx, sender, &config, stopped.clone());
        tokio::spawn(worker.run());
        debug!(endpoint = %config.endpoint, "started batch worker");

        Ok(HecShipper {
            inner: Arc::new(Inner {
                tx: RwLock::new(Some(tx)),
                stopped,
                processor,
            }),
        })
    }

    /// Formats and queues one record.
    ///
    /// Waits only while the intake channel is full, which turns a slow
    /// collector into backpressure on the producer instead of unbounded
    /// memory. Records the format suppresses (whitespace-only raw lines)
    /// succeed without queueing anything.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Closed`] once [`close`](Self::close) has begun.
    pub async fn enqueue(&self, line: &LogLine) -> Result<(), ShipperError> {
        let Some(event) = self.inner.processor.process(line) else {
            return Ok(());
        };
        let guard = self.inner.tx.read().await;
        match guard.as_ref() {
            Some(tx) => tx.send(event).await.map_err(|_| ShipperError::Closed),
            None => Err(ShipperError::Closed),
        }
    }

    /// Closes intake and waits for the worker's terminal flush.
    ///
    /// Every caller returns only after the flush has finished, no matter
    /// how many tasks call this concurrently. Queued records are delivered
    /// or, if the collector keeps refusing them, logged and dropped.
    pub async fn close(&self) {
        {
            let mut guard = self.inner.tx.write().await;
            guard.take();
        }
        self.inner.stopped.cancelled().await;
    }
}
