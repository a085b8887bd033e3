//! TCP transport implementation.

use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use berlink_core::limits::{CONNECT_TIMEOUT, KEEP_ALIVE_INTERVAL, KEEP_ALIVE_TIME};
use berlink_core::{BerlinkError, BerlinkResult};
use socket2::{SockRef, TcpKeepalive};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP transport settings.
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    /// Deadline for `open`; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Enable TCP keep-alive probing on the socket.
    pub keep_alive: bool,
}

impl TcpSettings {
    /// Settings with the default connect timeout and keep-alive on.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Some(CONNECT_TIMEOUT),
            keep_alive: true,
        }
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Toggle keep-alive probing.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

/// Apply the stack's keep-alive parameters to a connected socket.
pub fn configure_keep_alive(stream: &TcpStream) -> BerlinkResult<()> {
    let keep_alive = TcpKeepalive::new()
        .with_time(KEEP_ALIVE_TIME)
        .with_interval(KEEP_ALIVE_INTERVAL);
    SockRef::from(stream).set_tcp_keepalive(&keep_alive)?;
    Ok(())
}

/// TCP transport layer implementation.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    settings: TcpSettings,
    io_timeout: Option<Duration>,
    closed: bool,
}

impl TcpTransport {
    /// Create an unconnected transport; call [`TransportLayer::open`] to
    /// connect.
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            io_timeout: None,
            closed: true,
        }
    }

    /// Create a TCP transport from an address string.
    pub fn from_address(address: &str) -> BerlinkResult<Self> {
        let address: SocketAddr = address
            .parse()
            .map_err(|e| BerlinkError::InvalidData(format!("invalid TCP address: {e}")))?;
        Ok(Self::new(TcpSettings::new(address)))
    }

    /// Adopt an already-connected stream (server side).
    pub fn from_connected_stream(stream: TcpStream, settings: TcpSettings) -> BerlinkResult<Self> {
        if settings.keep_alive {
            configure_keep_alive(&stream)?;
        }
        Ok(Self {
            stream: Some(stream),
            settings,
            io_timeout: None,
            closed: false,
        })
    }

    /// Remote address of the connected socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn stream_mut(&mut self) -> BerlinkResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(BerlinkError::NotConnected)
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> BerlinkResult<()> {
        if !self.closed {
            return Err(BerlinkError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "connection has already been opened",
            )));
        }

        let stream = if let Some(timeout) = self.settings.connect_timeout {
            tokio::time::timeout(timeout, TcpStream::connect(self.settings.address))
                .await
                .map_err(|_| BerlinkError::Timeout)??
        } else {
            TcpStream::connect(self.settings.address).await?
        };
        if self.settings.keep_alive {
            configure_keep_alive(&stream)?;
        }

        self.stream = Some(stream);
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
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
        let io_timeout = self.io_timeout;
        let stream = self.stream_mut()?;
        let result = if let Some(timeout) = io_timeout {
            tokio::time::timeout(timeout, stream.write(buf))
                .await
                .map_err(|_| BerlinkError::Timeout)?
                .map_err(BerlinkError::from)
        } else {
            stream.write(buf).await.map_err(BerlinkError::from)
        };
        if result.is_err() {
            self.closed = true;
        }
        result
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
        let stream = self.stream_mut()?;
        match tokio::time::timeout(timeout, stream.readable()).await {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_defaults() {
        let address: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let settings = TcpSettings::new(address);
        assert_eq!(settings.address, address);
        assert_eq!(settings.connect_timeout, Some(CONNECT_TIMEOUT));
        assert!(settings.keep_alive);
    }

    #[tokio::test]
    async fn test_open_and_echo_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut transport = TcpTransport::new(TcpSettings::new(address));
        transport.open().await.unwrap();
        assert!(transport.is_connected());

        transport.write_all(b"ping").await.unwrap();
        transport.flush().await.unwrap();

        assert!(transport
            .wait_data_available(Duration::from_secs(1))
            .await
            .unwrap());
        let mut buf = [0u8; 4];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_times_out_when_idle() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut transport = TcpTransport::new(TcpSettings::new(address));
        transport.open().await.unwrap();
        assert!(!transport
            .wait_data_available(Duration::from_millis(20))
            .await
            .unwrap());
        drop(accept);
    }

    #[tokio::test]
    async fn test_double_open_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut transport = TcpTransport::new(TcpSettings::new(address));
        transport.open().await.unwrap();
        assert!(transport.open().await.is_err());
        drop(accept);
    }
}
