//! Background batch assembly.
//!
//! One worker task per shipper drains the intake channel into an in-memory
//! buffer and flushes it in chunks, either when a full batch has accumulated
//! or when the periodic timer fires. The worker is the only owner of the
//! buffer, so ordering within a stream follows intake order without locks.

use std::cmp;
use std::mem;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ShipperConfig;
use crate::event::HecEvent;
use crate::sender::BatchSender;

pub(crate) struct BatchWorker {
    rx: mpsc::Receiver<HecEvent>,
    sender: BatchSender,
    batch_size: usize,
    buffer_maximum: usize,
    period: Duration,
    stopped: CancellationToken,
    buffer: Vec<HecEvent>,
}

impl BatchWorker {
    pub(crate) fn new(
        rx: mpsc::Receiver<HecEvent>,
        sender: BatchSender,
        config: &ShipperConfig,
        stopped: CancellationToken,
    ) -> Self {
        BatchWorker {
            rx,
            sender,
            batch_size: config.batch_size,
            buffer_maximum: config.buffer_maximum,
            period: config.batch_period,
            stopped,
            buffer: Vec::new(),
        }
    }

    /// Runs until the intake channel closes, then performs the terminal
    /// flush, releases the HTTP connection pool, and signals completion
    /// through the cancellation token.
    pub(crate) async fn run(mut self) {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick resolves immediately; consume it so the timer
        // flush starts one full period out.
        ticker.tick().await;
        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(event) => {
                        self.buffer.push(event);
                        if self.buffer.len() % self.batch_size == 0 {
                            self.flush(false).await;
                        }
                    }
                    None => {
                        self.flush(true).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush(false).await;
                }
            }
        }
        // Pooled connections must be gone before close waiters are released.
        drop(self.sender);
        debug!("batch worker stopped");
        self.stopped.cancel();
    }

    /// Posts the buffered records in chunks of `batch_size`.
    ///
    /// A chunk that the collector refuses stays buffered for the next
    /// trigger, with two exceptions: on the terminal flush everything from
    /// the failed chunk on is logged and dropped, and when the unsent tail
    /// has reached `buffer_maximum` the oldest `buffer_maximum` records of
    /// that tail are logged and dropped before the rest is kept.
    async fn flush(&mut self, last_chance: bool) {
        let mut buffer = mem::take(&mut self.buffer);
        let mut index = 0;
        while index < buffer.len() {
            let upper = cmp::min(index + self.batch_size, buffer.len());
            match self.sender.send_batch(&buffer[index..upper]).await {
                Ok(()) => index = upper,
                Err(error) => {
                    warn!(%error, "failed to post events to the collector");
                    if last_chance {
                        drop_events(buffer.drain(index..));
                        return;
                    }
                    if buffer.len() - index >= self.buffer_maximum {
                        let cutoff = cmp::min(index + self.buffer_maximum, buffer.len());
                        drop_events(buffer.drain(index..cutoff));
                    }
                    buffer.drain(..index);
                    self.buffer = buffer;
                    return;
                }
            }
        }
    }
}

/// Logs each undelivered record at error level before it is lost.
fn drop_events<I>(events: I)
where
    I: IntoIterator<Item = HecEvent>,
{
    for event in events {
        match serde_json::to_string(&event) {
            Ok(json) => error!(event = %json, "dropping undelivered event"),
            Err(error) => error!(%error, "dropping undelivered event that failed to encode"),
        }
    }
}
