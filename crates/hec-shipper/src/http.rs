//! HTTP client construction for the batch sender.
//!
//! One `reqwest` client is built per pipeline and lives for the pipeline's
//! lifetime, so every chunk send reuses the same connection pool. TLS
//! options come straight from the resolved configuration; a CA file that
//! cannot be read or parsed fails construction instead of being ignored.

use std::fs;
use std::time::Duration;

use reqwest::Client;

use crate::config::{ConfigError, ShipperConfig};
use crate::constants::BATCH_SEND_TIMEOUT;

/// How long idle pooled connections are kept around between flushes.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Builds the delivery client for one pipeline.
///
/// The per-request timeout doubles as the send timeout of the pipeline:
/// a request that outlives it fails like any other transport error.
pub(crate) fn build_client(config: &ShipperConfig) -> Result<Client, ConfigError> {
    let mut builder = Client::builder()
        .timeout(BATCH_SEND_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT);

    if let Some(path) = &config.ca_path {
        let pem = fs::read(path).map_err(|source| ConfigError::CaCertificateRead {
            path: path.display().to_string(),
            source,
        })?;
        let certificate =
            reqwest::Certificate::from_pem(&pem).map_err(|source| ConfigError::CaCertificateParse {
                path: path.display().to_string(),
                source,
            })?;
        builder = builder.add_root_certificate(certificate);
    }

    if config.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(ConfigError::HttpClient)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use crate::config::{OPT_TOKEN, OPT_URL};

    fn create_test_config() -> ShipperConfig {
        let options = HashMap::from([
            (OPT_URL.to_string(), "https://hec.example.com:8088".to_string()),
            (OPT_TOKEN.to_string(), "token".to_string()),
        ]);
        ShipperConfig::from_options(&options).unwrap()
    }

    #[test]
    fn test_build_client_with_defaults() {
        assert!(build_client(&create_test_config()).is_ok());
    }

    #[test]
    fn test_build_client_with_skip_verify() {
        let mut config = create_test_config();
        config.insecure_skip_verify = true;
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_missing_ca_file_fails_construction() {
        let mut config = create_test_config();
        config.ca_path = Some(PathBuf::from("/nonexistent/hec-ca.pem"));

        let err = build_client(&config).unwrap_err();
        assert!(matches!(err, ConfigError::CaCertificateRead { .. }));
    }

    #[test]
    fn test_malformed_ca_file_fails_construction() {
        let path = std::env::temp_dir().join(format!("hec-shipper-bad-ca-{}.pem", std::process::id()));
        fs::write(&path, b"definitely not a certificate").unwrap();

        let mut config = create_test_config();
        config.ca_path = Some(path.clone());

        let err = build_client(&config).unwrap_err();
        assert!(matches!(err, ConfigError::CaCertificateParse { .. }));

        let _ = fs::remove_file(path);
    }
}
