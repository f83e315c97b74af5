//! Client configuration.
//!
//! All parameters are simple immutable values supplied at [`Client`]
//! construction; there is no runtime reconfiguration.
//!
//! [`Client`]: crate::Client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which transport the client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent bidirectional WebSocket connection.
    WebSocket,
    /// One-shot HTTP request per call; connectionless.
    Http,
}

/// Immutable connection parameters for a [`Client`].
///
/// The defaults target a local development server.
///
/// [`Client`]: crate::Client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Whether to use TLS (`wss://` / `https://`).
    pub tls: bool,
    /// Transport selection.
    pub transport: TransportKind,
    /// Server key used to derive the Basic authorization header on the
    /// HTTP transport and the socket URL query.
    pub server_key: String,
    /// Session token appended to the socket URL, if the caller already
    /// authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Preferred language reported to the server.
    pub lang: String,
    /// Path of the persistent socket endpoint.
    pub socket_path: String,
    /// Path of the one-shot request endpoint.
    pub http_path: String,
    /// Per-request timeout for the HTTP transport, in milliseconds.
    pub timeout_ms: u64,
    /// Timeout for establishing a connection, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7350,
            tls: false,
            transport: TransportKind::WebSocket,
            server_key: "defaultkey".to_string(),
            session_token: None,
            lang: "en".to_string(),
            socket_path: "/ws".to_string(),
            http_path: "/api".to_string(),
            timeout_ms: 5000,
            connect_timeout_ms: 3000,
        }
    }
}

impl ClientConfig {
    /// URL of the persistent socket endpoint, including the server key and
    /// language query parameters and, when supplied, a session token.
    pub fn socket_url(&self, session_token: Option<&str>) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        let mut url = format!(
            "{}://{}:{}{}?serverkey={}&lang={}",
            scheme, self.host, self.port, self.socket_path, self.server_key, self.lang
        );
        if let Some(token) = session_token {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }

    /// Base URL of the one-shot request endpoint.
    pub fn http_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.http_path)
    }

    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7350);
        assert!(!config.tls);
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.connect_timeout_ms, 3000);
    }

    #[test]
    fn test_socket_url() {
        let config = ClientConfig::default();
        assert_eq!(
            config.socket_url(None),
            "ws://127.0.0.1:7350/ws?serverkey=defaultkey&lang=en"
        );
        assert_eq!(
            config.socket_url(Some("abc123")),
            "ws://127.0.0.1:7350/ws?serverkey=defaultkey&lang=en&token=abc123"
        );
    }

    #[test]
    fn test_tls_schemes() {
        let config = ClientConfig {
            tls: true,
            host: "play.example.com".to_string(),
            port: 443,
            ..Default::default()
        };
        assert!(config.socket_url(None).starts_with("wss://play.example.com:443/ws"));
        assert_eq!(config.http_url(), "https://play.example.com:443/api");
    }

    #[test]
    fn test_config_serialization() {
        let config = ClientConfig {
            transport: TransportKind::Http,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"http\""));
        let deserialized: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.transport, TransportKind::Http);
        assert_eq!(deserialized.host, config.host);
    }
}
