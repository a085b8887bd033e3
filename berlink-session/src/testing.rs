//! In-memory stream used by the crate's tests: scripted incoming bytes,
//! served in bounded chunks to exercise short reads.

use async_trait::async_trait;
use berlink_core::BerlinkResult;
use berlink_transport::StreamAccessor;
use std::time::Duration;

pub(crate) struct ChunkedStream {
    data: Vec<u8>,
    position: usize,
    chunk_limit: usize,
    pub(crate) written: Vec<u8>,
    closed: bool,
}

impl ChunkedStream {
    /// A stream that serves `data` at most `chunk_limit` bytes per read.
    pub(crate) fn with_data(data: Vec<u8>, chunk_limit: usize) -> Self {
        Self {
            data,
            position: 0,
            chunk_limit,
            written: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[async_trait]
impl StreamAccessor for ChunkedStream {
    async fn set_timeout(&mut self, _timeout: Option<Duration>) -> BerlinkResult<()> {
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> BerlinkResult<usize> {
        let n = buf.len().min(self.chunk_limit).min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> BerlinkResult<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> BerlinkResult<()> {
        Ok(())
    }

    async fn wait_data_available(&mut self, _timeout: Duration) -> BerlinkResult<bool> {
        // EOF counts as readable: the next read reports the disconnect
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }

    async fn close(&mut self) -> BerlinkResult<()> {
        self.closed = true;
        Ok(())
    }
}
