use qdrant_client::{Qdrant, config::QdrantConfig};
use std::time::Duration;

use super::traits::VectorDBError;

/// Turns the REST address users usually know (`http://host:6333`) into the
/// gRPC address the client speaks (`http://host:6334`).
pub fn grpc_url(url: &str) -> String {
    // Clean the URL
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", url),
    };
    let rest = rest.trim_end_matches('/');

    // Replace port 6333 with 6334 for gRPC if needed
    let rest = match rest.strip_suffix(":6333") {
        Some(host) => format!("{}:6334", host),
        None => rest.to_string(),
    };

    format!("{}://{}", scheme, rest)
}

pub async fn create_qdrant_client(
    url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Qdrant, VectorDBError> {
    let url_with_scheme = grpc_url(url);
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    // Configure Qdrant
    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.check_compatibility = false;
    config.timeout = timeout;
    config.connect_timeout = timeout.min(Duration::from_secs(10));
    config.api_key = api_key.map(str::to_string);

    let client = Qdrant::new(config).map_err(|e| VectorDBError::Connection(e.to_string()))?;

    // Test the connection
    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(VectorDBError::Connection(format!(
                "failed to connect to Qdrant at {}: {}",
                url_with_scheme, e
            )))
        }
    }
}
