//! Stream accessor trait for the transport layer.

use async_trait::async_trait;
use berlink_core::{BerlinkError, BerlinkResult};
use std::time::Duration;

/// Byte-stream interface the session layer drives.
///
/// Implementations wrap a connected socket, TLS-protected or plain. The
/// trait is object-safe so endpoints can mix transports behind a
/// [`BoxedStream`].
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the per-operation I/O timeout. `None` means no deadline.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> BerlinkResult<()>;

    /// Read into `buf`, returning the byte count; 0 means EOF.
    async fn read(&mut self, buf: &mut [u8]) -> BerlinkResult<usize>;

    /// Read until `buf` is full.
    async fn read_exact(&mut self, mut buf: &mut [u8]) -> BerlinkResult<()> {
        while !buf.is_empty() {
            let n = self.read(buf).await?;
            if n == 0 {
                return Err(BerlinkError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended before the requested byte count",
                )));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Write from `buf`, returning the byte count accepted.
    async fn write(&mut self, buf: &[u8]) -> BerlinkResult<usize>;

    /// Write all of `buf`.
    async fn write_all(&mut self, buf: &[u8]) -> BerlinkResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(BerlinkError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "stream refused further bytes",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered output.
    async fn flush(&mut self) -> BerlinkResult<()>;

    /// Wait up to `timeout` for the stream to become readable.
    ///
    /// Returns `Ok(false)` when the deadline passes with nothing to read.
    /// A closed peer makes the stream readable (the next read returns 0),
    /// so callers never block past `timeout` on a dead connection.
    async fn wait_data_available(&mut self, timeout: Duration) -> BerlinkResult<bool>;

    /// Whether the stream is still connected.
    fn is_connected(&self) -> bool;

    /// Close the stream.
    async fn close(&mut self) -> BerlinkResult<()>;
}

/// Transport layer trait: a stream that also knows how to establish its
/// own connection.
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the connection.
    async fn open(&mut self) -> BerlinkResult<()>;
}

/// Type-erased stream, the currency of sessions and endpoints.
pub type BoxedStream = Box<dyn StreamAccessor>;
