//! Shared `reqwest` client construction for the GitHub, Discord and deploy-hook clients.

use std::time::Duration;

use reqwest::Client as HttpClient;

pub const USER_AGENT: &str = concat!("scribe/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client with the given timeout and the crate's user agent.
///
/// GitHub rejects requests without a `User-Agent`, so every outbound client
/// goes through here.
pub fn client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to build HTTP client with timeout: {}. Using default client.",
                e
            );
            HttpClient::new()
        })
}
