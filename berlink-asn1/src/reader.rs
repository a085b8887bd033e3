//! Node reader: header-driven dispatch to the typed leaf and container
//! readers.

use crate::header::{Header, NodeType};
use crate::node::{universal, Node};
use crate::source::{ByteSource, SliceSource, StreamSource};
use berlink_core::limits::MAX_PAYLOAD_SIZE_ALLOWED;
use berlink_core::{BerlinkError, BerlinkResult};

/// Read one complete node from a source.
///
/// `Ok(None)` when a stream source is already at EOF (clean message
/// boundary). All other shortfalls are errors.
pub fn read_node<S: ByteSource>(source: &mut S) -> BerlinkResult<Option<Node>> {
    let header = match Header::read(source)? {
        None => return Ok(None),
        Some(header) => header,
    };
    Ok(Some(read_content(header, source)?))
}

/// Read the content a header announces and assemble the node.
///
/// Dispatch is by tag class and number: the universal leaf tags get their
/// typed readers, Sequence/Set read children, the universal string tags
/// read text payloads, everything else becomes a generic node carrying
/// children (constructed) or a raw payload (primitive).
pub fn read_content<S: ByteSource>(header: Header, source: &mut S) -> BerlinkResult<Node> {
    match header.node_type() {
        NodeType::Universal(universal::END_OF_CONTENT) => {
            // terminator: no payload is read, whatever the length octets say
            let bytes_read = header.header_length();
            Ok(Node::from_read(header, None, Vec::new(), bytes_read))
        }
        NodeType::Universal(
            universal::BOOLEAN | universal::INTEGER | universal::NULL | universal::ENUMERATED,
        ) => read_typed_primitive(header, source),
        NodeType::Universal(universal::SEQUENCE | universal::SET)
            if header.is_constructed() =>
        {
            read_constructed(header, source)
        }
        NodeType::Universal(number) if universal::is_string_tag(number) => {
            read_typed_primitive(header, source)
        }
        _ => {
            if header.is_constructed() {
                read_constructed(header, source)
            } else {
                read_primitive(header, source)
            }
        }
    }
}

/// Primitive reader for the typed universal leaves, which reject a
/// constructed identifier outright.
fn read_typed_primitive<S: ByteSource>(header: Header, source: &mut S) -> BerlinkResult<Node> {
    if header.is_constructed() {
        return Err(BerlinkError::InvalidConstructedRead(format!(
            "{:?} carries primitive content but its identifier is constructed",
            header.node_type()
        )));
    }
    read_primitive(header, source)
}

fn read_primitive<S: ByteSource>(header: Header, source: &mut S) -> BerlinkResult<Node> {
    let (payload, consumed) = read_primitive_payload(&header, source)?;
    let bytes_read = header.header_length() + consumed;
    Ok(Node::from_read(header, payload, Vec::new(), bytes_read))
}

fn read_primitive_payload<S: ByteSource>(
    header: &Header,
    source: &mut S,
) -> BerlinkResult<(Option<Vec<u8>>, usize)> {
    if header.is_definite() {
        let declared = header.payload_length();
        if declared > MAX_PAYLOAD_SIZE_ALLOWED {
            return Err(BerlinkError::PayloadTooLarge {
                length: declared,
                limit: MAX_PAYLOAD_SIZE_ALLOWED,
            });
        }
        let wanted = declared as usize;
        if wanted == 0 {
            return Ok((None, 0));
        }
        let mut payload = vec![0u8; wanted];
        let got = source.read_exact(&mut payload)?;
        if got < wanted {
            return Err(BerlinkError::UnexpectedEndOfContent(format!(
                "payload truncated: wanted {wanted} bytes, got {got}"
            )));
        }
        Ok((Some(payload), wanted))
    } else {
        // indefinite primitive: scan for two consecutive zero octets
        let mut payload = Vec::new();
        loop {
            let octet = source.next_octet()?.ok_or_else(|| {
                BerlinkError::UnexpectedEndOfContent(
                    "indefinite payload is missing its end-of-content terminator".into(),
                )
            })?;
            payload.push(octet);
            let len = payload.len();
            if len >= 2 && payload[len - 1] == 0x00 && payload[len - 2] == 0x00 {
                payload.truncate(len - 2);
                let consumed = len;
                let payload = if payload.is_empty() { None } else { Some(payload) };
                return Ok((payload, consumed));
            }
        }
    }
}

fn read_constructed<S: ByteSource>(header: Header, source: &mut S) -> BerlinkResult<Node> {
    let mut children = Vec::new();
    let mut consumed: i64 = 0;
    if header.is_definite() {
        let declared = header.payload_length();
        while consumed < declared {
            let child = read_node(source)?.ok_or_else(|| {
                BerlinkError::UnexpectedEndOfContent(format!(
                    "children ended after {consumed} of {declared} declared bytes"
                ))
            })?;
            consumed += child.bytes_read() as i64;
            children.push(child);
        }
        if consumed != declared {
            return Err(BerlinkError::UnexpectedEndOfContent(format!(
                "children overran the declared length: {consumed} > {declared}"
            )));
        }
    } else {
        loop {
            let child = read_node(source)?.ok_or_else(|| {
                BerlinkError::UnexpectedEndOfContent(
                    "indefinite block is missing its end-of-content terminator".into(),
                )
            })?;
            consumed += child.bytes_read() as i64;
            if child.is_end_of_content() {
                // the terminator is consumed but never becomes a child
                break;
            }
            children.push(child);
        }
    }
    let bytes_read = header.header_length() + consumed as usize;
    Ok(Node::from_read(header, None, children, bytes_read))
}

impl Node {
    /// Decode one node from an in-memory buffer (buffer mode: overruns
    /// fail with `Bounds`).
    pub fn read_buffer(data: &[u8]) -> BerlinkResult<Node> {
        let mut source = SliceSource::new(data);
        match read_node(&mut source)? {
            Some(node) => Ok(node),
            // a SliceSource never reports a clean EOF
            None => unreachable!(),
        }
    }

    /// Decode one node from a blocking reader (stream mode: `Ok(None)` at
    /// a clean EOF).
    pub fn read_stream<R: std::io::Read>(reader: &mut R) -> BerlinkResult<Option<Node>> {
        let mut source = StreamSource::new(reader);
        read_node(&mut source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;

    #[test]
    fn test_end_of_content_wire_form() {
        let node = Node::read_buffer(&[0x00, 0x00]).unwrap();
        assert!(node.is_end_of_content());
        assert_eq!(node.header().message_length(), 2);
        assert_eq!(node.bytes_read(), 2);
    }

    #[test]
    fn test_null_roundtrip() {
        let node = Node::read_buffer(&[0x05, 0x00]).unwrap();
        assert!(node.is_null());
        assert!(node.payload().is_none());
    }

    #[test]
    fn test_boolean_wire_forms() {
        let node = Node::read_buffer(&[0x01, 0x01, 0xFF]).unwrap();
        assert!(node.boolean_value());
        let node = Node::read_buffer(&[0x01, 0x01, 0x00]).unwrap();
        assert!(!node.boolean_value());
        // any nonzero octet reads as true
        let node = Node::read_buffer(&[0x01, 0x01, 0x2A]).unwrap();
        assert!(node.boolean_value());
        assert_eq!(node.payload(), Some(&[0x2Au8][..]));
    }

    #[test]
    fn test_integer_wire_vectors() {
        assert_eq!(Node::read_buffer(&[0x02, 0x01, 0x00]).unwrap().integer_value(), 0);
        assert_eq!(Node::read_buffer(&[0x02, 0x01, 0x7F]).unwrap().integer_value(), 127);
        assert_eq!(
            Node::read_buffer(&[0x02, 0x02, 0x00, 0x80]).unwrap().integer_value(),
            128
        );
        assert_eq!(Node::read_buffer(&[0x02, 0x01, 0xFF]).unwrap().integer_value(), -1);
        assert_eq!(Node::read_buffer(&[0x02, 0x01, 0x80]).unwrap().integer_value(), -128);
    }

    #[test]
    fn test_definite_sequence() {
        // seq { bool true, int 5 }
        let data = [0x30, 0x06, 0x01, 0x01, 0xFF, 0x02, 0x01, 0x05];
        let node = Node::read_buffer(&data).unwrap();
        assert!(node.is_sequence());
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.bytes_read(), 8);
        assert_eq!(node.children()[1].integer_value(), 5);
    }

    #[test]
    fn test_indefinite_sequence_terminator_not_a_child() {
        // seq (indefinite) { null } 00 00
        let data = [0x30, 0x80, 0x05, 0x00, 0x00, 0x00];
        let node = Node::read_buffer(&data).unwrap();
        assert!(node.is_sequence());
        assert_eq!(node.children().len(), 1);
        assert!(node.children()[0].is_null());
        assert_eq!(node.bytes_read(), 6);
        assert_eq!(node.header().payload_length(), -1);
    }

    #[test]
    fn test_indefinite_primitive_text() {
        // utf8 (indefinite) "hi" 00 00
        let data = [0x0C, 0x80, b'h', b'i', 0x00, 0x00];
        let node = Node::read_buffer(&data).unwrap();
        assert_eq!(node.text_value(), "hi");
        assert_eq!(node.bytes_read(), 6);
    }

    #[test]
    fn test_missing_terminator_fails() {
        let data = [0x30, 0x80, 0x05, 0x00];
        let mut cursor = std::io::Cursor::new(data.to_vec());
        assert!(matches!(
            Node::read_stream(&mut cursor),
            Err(BerlinkError::UnexpectedEndOfContent(_))
        ));
    }

    #[test]
    fn test_truncated_children_fail() {
        // declares 6 payload bytes, supplies 3
        let data = [0x30, 0x06, 0x01, 0x01, 0xFF];
        let mut cursor = std::io::Cursor::new(data.to_vec());
        assert!(matches!(
            Node::read_stream(&mut cursor),
            Err(BerlinkError::UnexpectedEndOfContent(_))
        ));
    }

    #[test]
    fn test_child_overrun_fails() {
        // declares 2 payload bytes but the first child occupies 3
        let data = [0x30, 0x02, 0x01, 0x01, 0xFF];
        let mut cursor = std::io::Cursor::new(data.to_vec());
        assert!(matches!(
            Node::read_stream(&mut cursor),
            Err(BerlinkError::UnexpectedEndOfContent(_))
        ));
    }

    #[test]
    fn test_constructed_boolean_rejected() {
        let data = [0x21, 0x01, 0xFF];
        assert!(matches!(
            Node::read_buffer(&data),
            Err(BerlinkError::InvalidConstructedRead(_))
        ));
    }

    #[test]
    fn test_payload_cap() {
        // declares a 512 MiB boolean
        let data = [0x01, 0x84, 0x20, 0x00, 0x00, 0x00];
        assert!(matches!(
            Node::read_buffer(&data),
            Err(BerlinkError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_reads_raw_payload() {
        // context-specific 3, primitive, two raw bytes
        let data = [0x83, 0x02, 0xAB, 0xCD];
        let node = Node::read_buffer(&data).unwrap();
        assert_eq!(node.payload(), Some(&[0xABu8, 0xCD][..]));
        assert!(!node.is_constructed());
    }

    #[test]
    fn test_application_container() {
        // application 1, constructed, containing null
        let data = [0x61, 0x02, 0x05, 0x00];
        let node = Node::read_buffer(&data).unwrap();
        assert_eq!(node.children().len(), 1);
        assert!(matches!(
            node.node_type(),
            crate::header::NodeType::Application(1)
        ));
    }

    #[test]
    fn test_primitive_tagged_sequence_reads_raw() {
        // universal 16 with the constructed bit clear: generic raw node
        let data = [0x10, 0x01, 0xAA];
        let node = Node::read_buffer(&data).unwrap();
        assert_eq!(node.payload(), Some(&[0xAAu8][..]));
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_stream_eof_is_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(Node::read_stream(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_lone_identifier_is_truncated_header() {
        let mut cursor = std::io::Cursor::new(vec![0x08u8]);
        assert!(matches!(
            Node::read_stream(&mut cursor),
            Err(BerlinkError::TruncatedHeader(_))
        ));
    }

    #[test]
    fn test_nested_indefinite_inside_definite() {
        // outer seq, definite, contains inner indefinite seq { bool } + terminator
        let data = [0x30, 0x07, 0x30, 0x80, 0x01, 0x01, 0xFF, 0x00, 0x00];
        let node = Node::read_buffer(&data).unwrap();
        assert_eq!(node.children().len(), 1);
        let inner = &node.children()[0];
        assert_eq!(inner.children().len(), 1);
        assert!(inner.children()[0].boolean_value());
        assert_eq!(inner.bytes_read(), 7);
    }

    #[test]
    fn test_generic_identifier_equality_preserved() {
        let identifier = Identifier::private(false, 9);
        let mut encoded = Vec::new();
        identifier.write(&mut encoded);
        encoded.push(0x00); // zero length
        let node = Node::read_buffer(&encoded).unwrap();
        assert_eq!(node.header().identifier(), Some(&identifier));
    }
}
