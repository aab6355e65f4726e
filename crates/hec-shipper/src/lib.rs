//! # HEC Shipper
//!
//! This crate ships application log streams to a Splunk HTTP Event Collector
//! (HEC) endpoint. It is the delivery half of a logging driver: the embedding
//! application captures lines, the shipper formats, batches, and posts them.
//!
//! ## Overview
//!
//! Each log stream gets one [`pipeline::HecShipper`] and one background
//! worker task:
//!
//! ```text
//!            enqueue()                 worker task
//! LogLine ─► formatter ─► channel ─► batch buffer ─► HTTP POST ─► collector
//!            (per format)  (bounded)  (size + timer)  (gzip, ack)
//! ```
//!
//! The intake channel is bounded, so a slow collector shows up as
//! backpressure on the producer instead of unbounded memory. The worker is
//! the only owner of the batch buffer, which keeps per-stream ordering
//! without locks. Closing the shipper drains the channel, flushes one last
//! time, and only then returns.
//!
//! ## Architecture
//!
//! The library is organized into a few key modules:
//! - [`config`]: option map parsing, stream metadata, and validation
//! - [`event`]: log lines and the collector's JSON event model
//! - [`pipeline`]: the shipper handle, intake, and shutdown coordination
//! - [`sender`]: chunked HTTP delivery with optional gzip and
//!   acknowledgment channels

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
// #![deny(missing_debug_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]

/// Configuration options, stream metadata, and validation
pub mod config;

/// Log lines and the collector's JSON event model
pub mod event;

/// The shipper handle: intake, lifecycle, and shutdown
pub mod pipeline;

/// Chunked HTTP delivery to the collector
pub mod sender;

mod constants;
mod http;
mod processor;
mod worker;

pub use config::{ShipperConfig, StreamInfo};
pub use event::LogLine;
pub use pipeline::{HecShipper, ShipperError};
