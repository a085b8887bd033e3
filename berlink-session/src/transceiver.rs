//! Transceivers: the per-packet-type codec facade a session drives.

use crate::message::Message;
use async_trait::async_trait;
use berlink_core::limits::RECEIVE_BUFFER_LENGTH;
use berlink_core::BerlinkResult;
use berlink_transport::StreamAccessor;
use bytes::{Bytes, BytesMut};

/// Outcome of a receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// Part of a message arrived; call again.
    Over,
    /// A full packet is in hand; deliver it.
    OverAndOut,
    /// The peer disconnected.
    Fail,
}

/// A packet codec over a byte stream.
///
/// `receive` never blocks waiting for data to appear — the session loop
/// polls readiness first — but it may block mid-packet until the bytes it
/// already committed to arrive.
#[async_trait]
pub trait Transceiver: Send {
    type Packet: Send + 'static;

    /// Read from the stream; at most one packet is produced per call.
    async fn receive(
        &mut self,
        stream: &mut dyn StreamAccessor,
    ) -> BerlinkResult<(ReceiveStatus, Option<Self::Packet>)>;

    /// Write one packet to the stream.
    async fn transmit(
        &mut self,
        stream: &mut dyn StreamAccessor,
        packet: &mut Self::Packet,
    ) -> BerlinkResult<()>;

    /// Whether a received packet is the peer's graceful-disconnect signal.
    fn is_end_session(_packet: &Self::Packet) -> bool {
        false
    }
}

/// Raw binary transceiver: every read completes a packet.
#[derive(Debug)]
pub struct BinaryTransceiver {
    buffer: Vec<u8>,
}

impl BinaryTransceiver {
    pub fn new() -> Self {
        Self::with_buffer_length(RECEIVE_BUFFER_LENGTH)
    }

    pub fn with_buffer_length(length: usize) -> Self {
        Self {
            buffer: vec![0u8; length],
        }
    }
}

impl Default for BinaryTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transceiver for BinaryTransceiver {
    type Packet = Vec<u8>;

    async fn receive(
        &mut self,
        stream: &mut dyn StreamAccessor,
    ) -> BerlinkResult<(ReceiveStatus, Option<Vec<u8>>)> {
        let n = stream.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok((ReceiveStatus::Fail, None));
        }
        Ok((ReceiveStatus::OverAndOut, Some(self.buffer[..n].to_vec())))
    }

    async fn transmit(
        &mut self,
        stream: &mut dyn StreamAccessor,
        packet: &mut Vec<u8>,
    ) -> BerlinkResult<()> {
        stream.write_all(packet).await?;
        stream.flush().await
    }
}

/// A received chunk handed out without copying: length plus a reference
/// into the receive buffer.
#[derive(Debug, Clone)]
pub struct BinaryPacket {
    pub length: usize,
    pub buffer: Bytes,
}

/// Binary transceiver with zero-copy packets.
#[derive(Debug)]
pub struct BinaryPacketTransceiver {
    buffer: BytesMut,
    buffer_length: usize,
}

impl BinaryPacketTransceiver {
    pub fn new() -> Self {
        Self::with_buffer_length(RECEIVE_BUFFER_LENGTH)
    }

    pub fn with_buffer_length(length: usize) -> Self {
        Self {
            buffer: BytesMut::zeroed(length),
            buffer_length: length,
        }
    }
}

impl Default for BinaryPacketTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transceiver for BinaryPacketTransceiver {
    type Packet = BinaryPacket;

    async fn receive(
        &mut self,
        stream: &mut dyn StreamAccessor,
    ) -> BerlinkResult<(ReceiveStatus, Option<BinaryPacket>)> {
        if self.buffer.len() < self.buffer_length {
            self.buffer.resize(self.buffer_length, 0);
        }
        let n = stream.read(&mut self.buffer[..]).await?;
        if n == 0 {
            return Ok((ReceiveStatus::Fail, None));
        }
        let packet = BinaryPacket {
            length: n,
            buffer: self.buffer.split_to(n).freeze(),
        };
        Ok((ReceiveStatus::OverAndOut, Some(packet)))
    }

    async fn transmit(
        &mut self,
        stream: &mut dyn StreamAccessor,
        packet: &mut BinaryPacket,
    ) -> BerlinkResult<()> {
        stream.write_all(&packet.buffer[..packet.length]).await?;
        stream.flush().await
    }
}

/// Binary framing plus UTF-8 decoding.
#[derive(Debug)]
pub struct StringTransceiver {
    buffer: Vec<u8>,
}

impl StringTransceiver {
    pub fn new() -> Self {
        Self::with_buffer_length(RECEIVE_BUFFER_LENGTH)
    }

    pub fn with_buffer_length(length: usize) -> Self {
        Self {
            buffer: vec![0u8; length],
        }
    }
}

impl Default for StringTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transceiver for StringTransceiver {
    type Packet = String;

    async fn receive(
        &mut self,
        stream: &mut dyn StreamAccessor,
    ) -> BerlinkResult<(ReceiveStatus, Option<String>)> {
        let n = stream.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok((ReceiveStatus::Fail, None));
        }
        let text = String::from_utf8_lossy(&self.buffer[..n]).into_owned();
        Ok((ReceiveStatus::OverAndOut, Some(text)))
    }

    async fn transmit(
        &mut self,
        stream: &mut dyn StreamAccessor,
        packet: &mut String,
    ) -> BerlinkResult<()> {
        stream.write_all(packet.as_bytes()).await?;
        stream.flush().await
    }
}

/// X.690 message transceiver: frames [`Message`]s and carries an
/// incomplete message forward across reads.
#[derive(Debug)]
pub struct X690Transceiver {
    buffer: Vec<u8>,
    pending: Option<crate::message::PartialMessage>,
}

impl X690Transceiver {
    pub fn new() -> Self {
        Self::with_buffer_length(RECEIVE_BUFFER_LENGTH)
    }

    pub fn with_buffer_length(length: usize) -> Self {
        Self {
            buffer: vec![0u8; length],
            pending: None,
        }
    }

    /// Whether a partially received message is being carried.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for X690Transceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transceiver for X690Transceiver {
    type Packet = Message;

    async fn receive(
        &mut self,
        stream: &mut dyn StreamAccessor,
    ) -> BerlinkResult<(ReceiveStatus, Option<Message>)> {
        if let Some(pending) = self.pending.take() {
            return match pending.continue_read(stream, &mut self.buffer).await? {
                Message::Complete(complete) => Ok((
                    ReceiveStatus::OverAndOut,
                    Some(Message::Complete(complete)),
                )),
                Message::Incomplete(partial) => {
                    self.pending = Some(partial);
                    Ok((ReceiveStatus::Over, None))
                }
            };
        }
        match Message::read_buffered(stream, &mut self.buffer).await? {
            None => Ok((ReceiveStatus::Fail, None)),
            Some(Message::Complete(complete)) => Ok((
                ReceiveStatus::OverAndOut,
                Some(Message::Complete(complete)),
            )),
            Some(Message::Incomplete(partial)) => {
                self.pending = Some(partial);
                Ok((ReceiveStatus::Over, None))
            }
        }
    }

    async fn transmit(
        &mut self,
        stream: &mut dyn StreamAccessor,
        packet: &mut Message,
    ) -> BerlinkResult<()> {
        let encoded = packet.encode()?;
        stream.write_all(&encoded).await?;
        stream.flush().await
    }

    fn is_end_session(packet: &Message) -> bool {
        packet.is_end_session()
    }
}
