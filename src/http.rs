// src/http.rs
// HTTP clients for talking to the local inference server

use std::time::Duration;

/// Connect timeout for the streaming client.
/// Generation itself has no overall deadline; only cancellation ends it.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for short control calls (liveness probe, shutdown)
pub const FAST_TIMEOUT: Duration = Duration::from_secs(3);

/// Create the client used for streaming chat requests.
pub fn create_stream_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Create the client used for probe and shutdown calls
pub fn create_fast_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(FAST_TIMEOUT)
        .connect_timeout(FAST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
