//! HTTP server configuration

use std::time::Duration;

use serde::Deserialize;

mod defaults {
    pub fn listen_address() -> String {
        "[::]:8080".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn max_body_bytes() -> usize {
        1024 * 1024
    }

    pub const fn max_in_flight() -> usize {
        100_000
    }
}

/// Configuration for the HTTP server
///
/// ```ron
/// server: (
///     listen_address: "[::]:8080",
///     request_timeout_secs: 30,
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the server to
    ///
    /// Common values:
    /// - `[::]:8080` (IPv6 any address, port 8080)
    /// - `0.0.0.0:8080` (IPv4 any address, port 8080)
    /// - `127.0.0.1:8080` (localhost only, port 8080)
    #[serde(default = "defaults::listen_address")]
    pub listen_address: String,

    /// Requests still running after this long are answered with 408
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Largest request body accepted, webhooks included
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,

    /// Readiness fails once this many workflows are live
    #[serde(default = "defaults::max_in_flight")]
    pub max_in_flight: usize,
}

impl ServerConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: defaults::listen_address(),
            request_timeout_secs: defaults::request_timeout_secs(),
            max_body_bytes: defaults::max_body_bytes(),
            max_in_flight: defaults::max_in_flight(),
        }
    }
}
