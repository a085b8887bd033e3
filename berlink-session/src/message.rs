//! The wire message: one framed node, readable across fragmented network
//! reads.
//!
//! A read either produces a complete message carrying a decoded node, or
//! an incomplete one carrying the header plus whatever payload prefix has
//! arrived so far. The incomplete form is handed back to
//! [`PartialMessage::continue_read`] on subsequent reads until the payload
//! is whole, at which point the node is decoded from the accumulated
//! bytes.

use berlink_asn1::{read_content, universal, Header, LengthOctets, Node, SliceSource, TagClass};
use berlink_core::limits::MAX_PAYLOAD_SIZE_ALLOWED;
use berlink_core::{BerlinkError, BerlinkResult};
use berlink_transport::StreamAccessor;

/// A framed message: complete or still accumulating payload.
#[derive(Debug, Clone)]
pub enum Message {
    Complete(CompleteMessage),
    Incomplete(PartialMessage),
}

/// A fully received and decoded message.
#[derive(Debug, Clone)]
pub struct CompleteMessage {
    node: Node,
}

/// A message whose payload is still arriving.
#[derive(Debug, Clone)]
pub struct PartialMessage {
    header: Header,
    completion: Vec<u8>,
    still_needed: usize,
}

impl Message {
    /// Wrap a locally built node for transmission.
    pub fn from_node(node: Node) -> Self {
        Message::Complete(CompleteMessage { node })
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Message::Incomplete(_))
    }

    /// The decoded node of a complete message.
    pub fn node(&self) -> Option<&Node> {
        match self {
            Message::Complete(complete) => Some(&complete.node),
            Message::Incomplete(_) => None,
        }
    }

    pub fn node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Message::Complete(complete) => Some(&mut complete.node),
            Message::Incomplete(_) => None,
        }
    }

    pub fn into_node(self) -> Option<Node> {
        match self {
            Message::Complete(complete) => Some(complete.node),
            Message::Incomplete(_) => None,
        }
    }

    /// Session-level request id: the first child of a Sequence payload
    /// when that child is an Integer, -1 otherwise.
    pub fn id(&self) -> i64 {
        let node = match self.node() {
            Some(node) => node,
            None => return -1,
        };
        if !node.is_sequence() {
            return -1;
        }
        match node.children().first() {
            Some(first) if first.node_type().is_universal(universal::INTEGER) => {
                first.integer_value()
            }
            _ => -1,
        }
    }

    /// Graceful-disconnect signal (see [`Node::is_end_session`]).
    pub fn is_end_session(&self) -> bool {
        self.node().map(Node::is_end_session).unwrap_or(false)
    }

    /// Serialize a complete message for transmission.
    pub fn encode(&mut self) -> BerlinkResult<Vec<u8>> {
        match self {
            Message::Complete(complete) => Ok(complete.node.encode()),
            Message::Incomplete(_) => Err(BerlinkError::InvalidData(
                "an incomplete message cannot be transmitted".into(),
            )),
        }
    }

    /// Read the next message off a stream.
    ///
    /// `buffer` is the session's reusable receive buffer; at most one
    /// `read` is issued for the payload, so a short read simply yields an
    /// incomplete message. Returns `Ok(None)` when the stream is already
    /// closed at the message boundary (clean disconnect).
    pub async fn read_buffered<S: StreamAccessor + ?Sized>(
        stream: &mut S,
        buffer: &mut [u8],
    ) -> BerlinkResult<Option<Message>> {
        let header = match read_header(stream).await? {
            None => return Ok(None),
            Some(header) => header,
        };
        if !header.is_definite() {
            return Err(BerlinkError::InvalidData(
                "wire messages must use the definite length form at the top level".into(),
            ));
        }
        let declared = header.payload_length();
        if declared > MAX_PAYLOAD_SIZE_ALLOWED {
            return Err(BerlinkError::PayloadTooLarge {
                length: declared,
                limit: MAX_PAYLOAD_SIZE_ALLOWED,
            });
        }
        let want = declared as usize;
        if want == 0 {
            let node = read_content(header, &mut SliceSource::new(&[]))?;
            return Ok(Some(Message::Complete(CompleteMessage { node })));
        }

        let chunk = want.min(buffer.len());
        let got = stream.read(&mut buffer[..chunk]).await?;
        if got == 0 {
            return Err(BerlinkError::UnexpectedEndOfContent(
                "stream closed inside a message payload".into(),
            ));
        }
        if got >= want {
            let node = read_content(header, &mut SliceSource::new(&buffer[..want]))?;
            Ok(Some(Message::Complete(CompleteMessage { node })))
        } else {
            Ok(Some(Message::Incomplete(PartialMessage {
                header,
                // copied out so the shared buffer is free for the next read
                completion: buffer[..got].to_vec(),
                still_needed: want - got,
            })))
        }
    }
}

impl PartialMessage {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Payload bytes still missing.
    pub fn still_needed(&self) -> usize {
        self.still_needed
    }

    /// Payload bytes accumulated so far.
    pub fn completion_length(&self) -> usize {
        self.completion.len()
    }

    /// Request the missing payload bytes and either finish the message or
    /// stay incomplete.
    pub async fn continue_read<S: StreamAccessor + ?Sized>(
        mut self,
        stream: &mut S,
        buffer: &mut [u8],
    ) -> BerlinkResult<Message> {
        let chunk = self.still_needed.min(buffer.len());
        let got = stream.read(&mut buffer[..chunk]).await?;
        if got == 0 {
            return Err(BerlinkError::UnexpectedEndOfContent(
                "stream closed inside a message payload".into(),
            ));
        }
        self.completion.extend_from_slice(&buffer[..got]);
        self.still_needed -= got;
        if self.still_needed == 0 {
            let node = read_content(self.header, &mut SliceSource::new(&self.completion))?;
            Ok(Message::Complete(CompleteMessage { node }))
        } else {
            Ok(Message::Incomplete(self))
        }
    }
}

/// Read a node header directly off a stream, octet by octet.
///
/// Mirrors the codec's header reader with stream-mode semantics: zero
/// bytes at the first identifier octet is a clean EOF (`Ok(None)`); going
/// dry anywhere later is `TruncatedHeader`.
pub(crate) async fn read_header<S: StreamAccessor + ?Sized>(
    stream: &mut S,
) -> BerlinkResult<Option<Header>> {
    let first = match read_octet(stream).await? {
        None => return Ok(None),
        Some(octet) => octet,
    };
    let class = TagClass::from_bits(first);
    let constructed = first & 0x20 != 0;
    let low5 = first & 0x1F;
    let identifier = if low5 < 31 {
        berlink_asn1::Identifier::from_parts(class, constructed, low5 as u32, 1)
    } else {
        let mut number = 0u32;
        let mut length = 1usize;
        loop {
            let octet = read_octet(stream).await?.ok_or_else(|| {
                BerlinkError::TruncatedHeader("identifier ended inside a multi-octet tag number".into())
            })?;
            number = number.wrapping_add((octet & 0x7F) as u32);
            length += 1;
            if octet & 0x80 == 0 {
                break;
            }
        }
        berlink_asn1::Identifier::from_parts(class, constructed, number, length)
    };

    let first_length = read_octet(stream).await?.ok_or_else(|| {
        BerlinkError::TruncatedHeader("length octets missing after identifier".into())
    })?;
    let length = if first_length < 0x80 {
        LengthOctets::from_parts(first_length as i64, 1)
    } else if first_length == 0x80 {
        LengthOctets::indefinite()
    } else {
        let count = (first_length & 0x7F) as usize;
        if count > 4 {
            return Err(BerlinkError::LengthTooLarge(count));
        }
        let mut value = 0i64;
        for _ in 0..count {
            let octet = read_octet(stream).await?.ok_or_else(|| {
                BerlinkError::TruncatedHeader("long-form length octets truncated".into())
            })?;
            value = (value << 8) | octet as i64;
        }
        LengthOctets::from_parts(value, 1 + count)
    };

    Ok(Some(Header::from_parts(identifier, length)))
}

async fn read_octet<S: StreamAccessor + ?Sized>(stream: &mut S) -> BerlinkResult<Option<u8>> {
    let mut octet = [0u8; 1];
    let n = stream.read(&mut octet).await?;
    Ok(if n == 0 { None } else { Some(octet[0]) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ChunkedStream;
    use berlink_asn1::Identifier;

    fn sample_message(text_length: usize) -> Node {
        Node::new_sequence()
            .with_child(Node::new_integer(7))
            .with_child(Node::new_text(&"m".repeat(text_length)))
    }

    #[tokio::test]
    async fn test_small_message_completes_in_one_read() {
        let mut node = sample_message(16);
        let mut stream = ChunkedStream::with_data(node.encode(), usize::MAX);
        let mut buffer = vec![0u8; 1024];

        let message = Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .unwrap();
        assert!(!message.is_incomplete());
        assert_eq!(message.node().unwrap(), &node);
        assert_eq!(message.id(), 7);
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        let mut stream = ChunkedStream::with_data(Vec::new(), usize::MAX);
        let mut buffer = vec![0u8; 64];
        assert!(Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_partial_read_carries_forward() {
        let mut node = sample_message(100 * 1024);
        let encoded = node.encode();
        let mut stream = ChunkedStream::with_data(encoded, 32 * 1024);
        let mut buffer = vec![0u8; 32 * 1024];

        let message = Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .unwrap();
        let mut partial = match message {
            Message::Incomplete(partial) => partial,
            Message::Complete(_) => panic!("a 100 KiB payload cannot complete in 32 KiB"),
        };

        let mut continues = 0;
        let complete = loop {
            continues += 1;
            match partial.continue_read(&mut stream, &mut buffer).await.unwrap() {
                Message::Complete(complete) => break complete,
                Message::Incomplete(next) => partial = next,
            }
        };
        assert!(continues >= 2, "got only {continues} continuation reads");
        assert_eq!(&complete.node, &node);
    }

    #[tokio::test]
    async fn test_second_message_decodes_after_first_completes() {
        let mut first = sample_message(40 * 1024);
        let mut second = Node::new_sequence()
            .with_child(Node::new_integer(2))
            .with_child(Node::new_boolean(true));
        let mut data = first.encode();
        data.extend_from_slice(&second.encode());
        let mut stream = ChunkedStream::with_data(data, 16 * 1024);
        let mut buffer = vec![0u8; 16 * 1024];

        let mut message = Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .unwrap();
        while let Message::Incomplete(partial) = message {
            message = partial.continue_read(&mut stream, &mut buffer).await.unwrap();
        }
        assert_eq!(message.node().unwrap(), &first);

        let next = Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.node().unwrap(), &second);
        assert_eq!(next.id(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_inside_payload_fails() {
        let mut node = sample_message(64);
        let mut encoded = node.encode();
        encoded.truncate(10);
        let mut stream = ChunkedStream::with_data(encoded, usize::MAX);
        let mut buffer = vec![0u8; 256];

        let message = Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .unwrap();
        let partial = match message {
            Message::Incomplete(partial) => partial,
            Message::Complete(_) => panic!("payload was truncated"),
        };
        assert!(matches!(
            partial.continue_read(&mut stream, &mut buffer).await,
            Err(BerlinkError::UnexpectedEndOfContent(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_header_fails() {
        let mut stream = ChunkedStream::with_data(vec![0x08], usize::MAX);
        let mut buffer = vec![0u8; 16];
        assert!(matches!(
            Message::read_buffered(&mut stream, &mut buffer).await,
            Err(BerlinkError::TruncatedHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_indefinite_top_level_rejected() {
        let mut stream = ChunkedStream::with_data(vec![0x30, 0x80, 0x00, 0x00], usize::MAX);
        let mut buffer = vec![0u8; 16];
        assert!(matches!(
            Message::read_buffered(&mut stream, &mut buffer).await,
            Err(BerlinkError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_end_session_and_id_detection() {
        let mut node = Node::new_sequence()
            .with_child(Node::new_container(Identifier::application(true, 0)));
        let mut stream = ChunkedStream::with_data(node.encode(), usize::MAX);
        let mut buffer = vec![0u8; 64];
        let message = Message::read_buffered(&mut stream, &mut buffer)
            .await
            .unwrap()
            .unwrap();
        assert!(message.is_end_session());
        // no leading integer child, so no request id
        assert_eq!(message.id(), -1);
    }
}
