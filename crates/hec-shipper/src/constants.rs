//! Pipeline defaults and tuning knobs.
//!
//! This module defines the batching, buffering, and transport limits the
//! shipper runs with when the embedding application does not override them.
//! The advanced values can be overridden through process environment
//! variables (see the `HEC_SHIPPER_*` constants); a value that fails to
//! parse is reported and the default is kept, so a bad override can never
//! prevent the pipeline from starting.

use std::time::Duration;

/// How often buffered records are posted when the batch never fills.
///
/// # Value: 5 seconds
///
/// The worker's periodic timer fires at this interval and flushes whatever
/// is buffered, even a partial batch, so a slow stream still reaches the
/// collector promptly.
pub(crate) const DEFAULT_POST_BATCH_PERIOD: Duration = Duration::from_secs(5);

/// Maximum number of records posted in a single request.
///
/// # Value: 1,000 records
///
/// When the unsent buffer reaches an exact multiple of this size the worker
/// flushes immediately instead of waiting for the timer. Larger buffers are
/// split into chunks of this size, one request per chunk.
pub(crate) const DEFAULT_BATCH_SIZE: usize = 1000;

/// Maximum number of unsent records retained across failed sends.
///
/// # Value: 10,000 records (10 batches)
///
/// While the collector is unreachable, records pile up in the worker's
/// buffer. Once a failed send leaves at least this many records pending,
/// the oldest window of this size is written to the diagnostic log and
/// dropped, bounding memory under sustained outage.
pub(crate) const DEFAULT_BUFFER_MAXIMUM: usize = 10 * DEFAULT_BATCH_SIZE;

/// Capacity of the intake channel between producers and the worker.
///
/// # Value: 4,000 records (4 batches)
///
/// Producers suspend when the channel is full. This is the only
/// producer-visible backpressure point in the pipeline.
pub(crate) const DEFAULT_CHANNEL_SIZE: usize = 4 * DEFAULT_BATCH_SIZE;

/// Maximum number of response body bytes captured into a delivery error.
///
/// Collector error responses are truncated to this size before being
/// surfaced in diagnostics, so a misbehaving endpoint cannot balloon log
/// output.
pub(crate) const MAX_RESPONSE_BYTES: usize = 1024;

/// Per-request send timeout.
///
/// # Value: 30 seconds
///
/// A request that exceeds this bound is treated like any other transport
/// failure and handled by the retry policy.
pub(crate) const BATCH_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of the HEC JSON event endpoint, appended to the configured URL.
pub(crate) const COLLECTOR_PATH: &str = "/services/collector/event/1.0";

/// Environment override for the batch period, in milliseconds.
pub(crate) const ENV_POST_BATCH_PERIOD_MS: &str = "HEC_SHIPPER_POST_MESSAGES_FREQUENCY_MS";

/// Environment override for the batch size, in records.
pub(crate) const ENV_BATCH_SIZE: &str = "HEC_SHIPPER_POST_MESSAGES_BATCH_SIZE";

/// Environment override for the unsent buffer maximum, in records.
pub(crate) const ENV_BUFFER_MAXIMUM: &str = "HEC_SHIPPER_BUFFER_MAX";

/// Environment override for the intake channel capacity, in records.
pub(crate) const ENV_CHANNEL_SIZE: &str = "HEC_SHIPPER_CHANNEL_SIZE";
