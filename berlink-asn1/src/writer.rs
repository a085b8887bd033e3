//! Node writer: size the tree, then emit headers and content.

use crate::node::Node;
use berlink_core::BerlinkResult;

/// Serialize a subtree into `out`.
///
/// Runs the sizing pass at `node` first so every definite header carries
/// the byte count its content will actually occupy; the pass is idempotent
/// so re-encoding an already-sized tree is fine.
pub fn write_node(node: &mut Node, out: &mut Vec<u8>) {
    node.calculate_payload_length();
    emit(node, out);
}

fn emit(node: &Node, out: &mut Vec<u8>) {
    // a root header writes nothing, so a root serializes as the plain
    // concatenation of its children
    node.header().write(out);
    if node.is_constructed() {
        for child in node.children() {
            emit(child, out);
        }
    } else if let Some(payload) = node.payload() {
        out.extend_from_slice(payload);
    }
    if !node.header().is_definite() {
        out.extend_from_slice(&[0x00, 0x00]);
    }
}

impl Node {
    /// Serialize the subtree to a fresh buffer.
    pub fn encode(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        write_node(self, &mut out);
        out
    }

    /// Serialize the subtree into a blocking writer.
    pub fn write_stream<W: std::io::Write>(&mut self, writer: &mut W) -> BerlinkResult<()> {
        let encoded = self.encode();
        writer.write_all(&encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;

    #[test]
    fn test_end_of_content_bytes() {
        assert_eq!(Node::new_end_of_content().encode(), vec![0x00, 0x00]);
    }

    #[test]
    fn test_null_bytes() {
        assert_eq!(Node::new_null().encode(), vec![0x05, 0x00]);
    }

    #[test]
    fn test_boolean_bytes() {
        assert_eq!(Node::new_boolean(true).encode(), vec![0x01, 0x01, 0xFF]);
        assert_eq!(Node::new_boolean(false).encode(), vec![0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_integer_bytes() {
        assert_eq!(Node::new_integer(0).encode(), vec![0x02, 0x01, 0x00]);
        assert_eq!(Node::new_integer(127).encode(), vec![0x02, 0x01, 0x7F]);
        assert_eq!(Node::new_integer(128).encode(), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(Node::new_integer(-1).encode(), vec![0x02, 0x01, 0xFF]);
        assert_eq!(Node::new_integer(-128).encode(), vec![0x02, 0x01, 0x80]);
    }

    #[test]
    fn test_sequence_bytes() {
        let mut node = Node::new_sequence()
            .with_child(Node::new_boolean(true))
            .with_child(Node::new_integer(5));
        assert_eq!(
            node.encode(),
            vec![0x30, 0x06, 0x01, 0x01, 0xFF, 0x02, 0x01, 0x05]
        );
    }

    #[test]
    fn test_indefinite_constructed_terminator() {
        let mut node = Node::new_sequence().with_child(Node::new_null());
        node.set_definite(false);
        assert_eq!(node.encode(), vec![0x30, 0x80, 0x05, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_indefinite_text() {
        let mut node = Node::new_text("hi");
        node.set_definite(false);
        assert_eq!(
            node.encode(),
            vec![0x0C, 0x80, b'h', b'i', 0x00, 0x00]
        );
    }

    #[test]
    fn test_root_concatenates_children() {
        let mut root = Node::new_root()
            .with_child(Node::new_null())
            .with_child(Node::new_boolean(true));
        assert_eq!(root.encode(), vec![0x05, 0x00, 0x01, 0x01, 0xFF]);
    }

    #[test]
    fn test_definite_parent_covers_indefinite_child() {
        let mut inner = Node::new_sequence().with_child(Node::new_boolean(true));
        inner.set_definite(false);
        let mut outer = Node::new_sequence().with_child(inner);
        let encoded = outer.encode();
        assert_eq!(
            encoded,
            vec![0x30, 0x07, 0x30, 0x80, 0x01, 0x01, 0xFF, 0x00, 0x00]
        );
        // and it reads back structurally equal
        let decoded = Node::read_buffer(&encoded).unwrap();
        assert_eq!(decoded, outer);
    }

    #[test]
    fn test_long_payload_uses_long_form_length() {
        let text: String = "x".repeat(200);
        let mut node = Node::new_text(&text);
        let encoded = node.encode();
        assert_eq!(encoded[0], 0x0C);
        assert_eq!(encoded[1], 0x81);
        assert_eq!(encoded[2], 200);
        assert_eq!(encoded.len(), 203);
    }

    #[test]
    fn test_application_wrapper_roundtrip() {
        let mut node = Node::new_container(Identifier::application(true, 2))
            .with_child(Node::new_enumerated(7));
        let encoded = node.encode();
        let decoded = Node::read_buffer(&encoded).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.children()[0].enumerated_value(), 7);
    }
}
