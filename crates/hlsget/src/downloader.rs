use reqwest::Client;
use tracing::debug;

use crate::{DownloadError, DownloaderConfig};

/// Create a reqwest Client with the provided configuration
///
/// Per-request timeouts are applied by the callers (manifest, key and segment
/// fetches each carry their own), so the client itself has no overall timeout.
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(16)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.pool_idle_timeout.is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.pool_idle_timeout);
    }

    debug!(user_agent = %config.user_agent, "Building HTTP client");
    client_builder.build().map_err(DownloadError::from)
}
