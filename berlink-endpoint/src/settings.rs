//! Endpoint configuration.

use berlink_core::limits::{CONNECT_TIMEOUT, RECEIVE_BUFFER_LENGTH};
use std::net::SocketAddr;
use std::time::Duration;

/// TLS client parameters: the rustls configuration plus the server name
/// presented during the handshake.
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct TlsClientSettings {
    pub config: std::sync::Arc<tokio_rustls::rustls::ClientConfig>,
    pub server_name: String,
}

/// Settings shared by server and client endpoints.
#[derive(Clone)]
pub struct EndpointSettings {
    /// Listen address (server) or target address (client).
    pub address: SocketAddr,
    /// Deadline for outbound connects.
    pub connect_timeout: Duration,
    /// Size of each session's reusable receive buffer.
    pub receive_buffer_length: usize,
    /// TCP keep-alive probing on every socket.
    pub keep_alive: bool,
    /// Present this certificate configuration to accepted peers.
    #[cfg(feature = "tls")]
    pub tls_server: Option<std::sync::Arc<tokio_rustls::rustls::ServerConfig>>,
    /// Authenticate outbound connections with TLS.
    #[cfg(feature = "tls")]
    pub tls_client: Option<TlsClientSettings>,
}

impl EndpointSettings {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: CONNECT_TIMEOUT,
            receive_buffer_length: RECEIVE_BUFFER_LENGTH,
            keep_alive: true,
            #[cfg(feature = "tls")]
            tls_server: None,
            #[cfg(feature = "tls")]
            tls_client: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_receive_buffer_length(mut self, length: usize) -> Self {
        self.receive_buffer_length = length;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[cfg(feature = "tls")]
    pub fn with_tls_server(
        mut self,
        config: std::sync::Arc<tokio_rustls::rustls::ServerConfig>,
    ) -> Self {
        self.tls_server = Some(config);
        self
    }

    #[cfg(feature = "tls")]
    pub fn with_tls_client(mut self, settings: TlsClientSettings) -> Self {
        self.tls_client = Some(settings);
        self
    }
}

impl std::fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSettings")
            .field("address", &self.address)
            .field("connect_timeout", &self.connect_timeout)
            .field("receive_buffer_length", &self.receive_buffer_length)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}
