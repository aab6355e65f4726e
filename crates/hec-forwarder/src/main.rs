#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hec_shipper::{HecShipper, LogLine, ShipperConfig, StreamInfo};

/// Environment prefix mapped onto the shipper's option table.
const OPTION_PREFIX: &str = "HEC_FORWARDER_OPT_";
const LOG_LEVEL_VAR: &str = "HEC_FORWARDER_LOG_LEVEL";
const STREAM_ID_VAR: &str = "HEC_FORWARDER_STREAM_ID";
const STREAM_NAME_VAR: &str = "HEC_FORWARDER_STREAM_NAME";
const LINE_SOURCE: &str = "stdin";

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var(LOG_LEVEL_VAR)
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match ShipperConfig::from_options(&collect_options()) {
        Ok(config) => config,
        Err(error) => {
            error!("invalid forwarder configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let info = stream_info();
    let shipper = match HecShipper::new(config, &info).await {
        Ok(shipper) => shipper,
        Err(error) => {
            error!("failed to start the shipper: {error}");
            return ExitCode::FAILURE;
        }
    };
    info!("forwarding stdin to the collector");

    forward_stdin(&shipper).await;
    shipper.close().await;
    debug!("forwarder stopped");
    ExitCode::SUCCESS
}

/// Gathers `HEC_FORWARDER_OPT_*` variables into the option table the
/// library validates, lowercasing and swapping underscores for dashes:
/// `HEC_FORWARDER_OPT_HEC_URL` becomes `hec-url`.
fn collect_options() -> HashMap<String, String> {
    let mut options = HashMap::new();
    for (key, value) in env::vars() {
        if let Some(suffix) = key.strip_prefix(OPTION_PREFIX) {
            if suffix.is_empty() {
                continue;
            }
            options.insert(suffix.to_lowercase().replace('_', "-"), value);
        }
    }
    options
}

/// Builds the stream identity the tag template and attribute filters render
/// against. The full process environment is handed over so the `env` and
/// `env-regex` options work from the command line.
fn stream_info() -> StreamInfo {
    StreamInfo {
        stream_id: env::var(STREAM_ID_VAR)
            .unwrap_or_else(|_| format!("stdin-{}", std::process::id())),
        stream_name: env::var(STREAM_NAME_VAR).unwrap_or_else(|_| String::from(LINE_SOURCE)),
        env_vars: env::vars()
            .map(|(key, value)| format!("{key}={value}"))
            .collect(),
        ..StreamInfo::default()
    }
}

/// Pumps stdin into the shipper until EOF or a shutdown signal.
///
/// Lines are forwarded as raw bytes, so input that is not valid UTF-8 still
/// ships (the event formatter replaces the offending bytes).
async fn forward_stdin(shipper: &HecShipper) {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(error), _) | (_, Err(error)) => {
            error!("failed to install signal handlers: {error}");
            return;
        }
    };

    let mut segments = BufReader::new(io::stdin()).split(b'\n');
    loop {
        tokio::select! {
            segment = segments.next_segment() => match segment {
                Ok(Some(line)) => {
                    if let Err(error) = shipper.enqueue(&LogLine::new(line, LINE_SOURCE)).await {
                        error!("failed to enqueue line: {error}");
                    }
                }
                Ok(None) => {
                    debug!("stdin reached end of file");
                    return;
                }
                Err(error) => {
                    error!("failed to read stdin: {error}");
                    return;
                }
            },
            _ = sigint.recv() => {
                info!("received interrupt, shutting down");
                return;
            }
            _ = sigterm.recv() => {
                info!("received termination, shutting down");
                return;
            }
        }
    }
}
