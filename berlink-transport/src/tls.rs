//! TLS transport: a TCP stream wrapped in rustls, handshake performed
//! inline at construction.

use crate::stream::StreamAccessor;
use crate::tcp::configure_keep_alive;
use async_trait::async_trait;
use berlink_core::{BerlinkError, BerlinkResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

/// TLS-protected transport over a connected TCP stream.
///
/// There is no deferred handshake: the `authenticate_as_*` constructors
/// return only once the peer is authenticated, so a session built on top
/// of this transport never sees plaintext bytes.
pub struct TlsTransport {
    stream: Option<TlsStream<TcpStream>>,
    io_timeout: Option<Duration>,
    closed: bool,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("closed", &self.closed)
            .finish()
    }
}

impl TlsTransport {
    /// Client-side handshake against `server_name`.
    pub async fn authenticate_as_client(
        stream: TcpStream,
        config: Arc<ClientConfig>,
        server_name: &str,
    ) -> BerlinkResult<Self> {
        configure_keep_alive(&stream)?;
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|_| BerlinkError::InvalidData(format!("invalid server name: {server_name}")))?;
        let tls = TlsConnector::from(config).connect(name, stream).await?;
        log::debug!("TLS client handshake complete with {server_name}");
        Ok(Self {
            stream: Some(TlsStream::Client(tls)),
            io_timeout: None,
            closed: false,
        })
    }

    /// Server-side handshake presenting the configured certificate.
    pub async fn authenticate_as_server(
        stream: TcpStream,
        config: Arc<ServerConfig>,
    ) -> BerlinkResult<Self> {
        configure_keep_alive(&stream)?;
        let tls = TlsAcceptor::from(config).accept(stream).await?;
        log::debug!("TLS server handshake complete");
        Ok(Self {
            stream: Some(TlsStream::Server(tls)),
            io_timeout: None,
            closed: false,
        })
    }

    fn stream_mut(&mut self) -> BerlinkResult<&mut TlsStream<TcpStream>> {
        self.stream.as_mut().ok_or(BerlinkError::NotConnected)
    }
}

#[async_trait]
impl StreamAccessor for TlsTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> BerlinkResult<()> {
        self.io_timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> BerlinkResult<usize> {
        let io_timeout = self.io_timeout;
        let stream = self.stream_mut()?;
        let result = if let Some(timeout) = io_timeout {
            tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| BerlinkError::Timeout)?
                .map_err(BerlinkError::from)
        } else {
            stream.read(buf).await.map_err(BerlinkError::from)
        };
        match result {
            Ok(0) if !buf.is_empty() => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> BerlinkResult<usize> {
        let stream = self.stream_mut()?;
        let n = stream.write(buf).await?;
        Ok(n)
    }

    async fn flush(&mut self) -> BerlinkResult<()> {
        let stream = self.stream_mut()?;
        stream.flush().await?;
        Ok(())
    }

    async fn wait_data_available(&mut self, timeout: Duration) -> BerlinkResult<bool> {
        if self.closed {
            return Err(BerlinkError::NotConnected);
        }
        // readiness of the inner socket; decrypted-but-unread bytes make
        // the next read return immediately anyway
        let stream = self.stream_mut()?;
        let socket = stream.get_ref().0;
        match tokio::time::timeout(timeout, socket.readable()).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(false),
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.stream.is_some()
    }

    async fn close(&mut self) -> BerlinkResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
