//! The node tree: a tagged value with either a raw payload (primitive) or
//! an ordered child list (constructed).

use crate::header::{Header, NodeType};
use crate::identifier::Identifier;
use berlink_core::{BerlinkError, BerlinkResult};

/// Universal-class tag numbers from X.690 §8.
pub mod universal {
    pub const END_OF_CONTENT: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const INTEGER: u8 = 2;
    pub const BIT_STRING: u8 = 3;
    pub const OCTET_STRING: u8 = 4;
    pub const NULL: u8 = 5;
    pub const OBJECT_IDENTIFIER: u8 = 6;
    pub const ENUMERATED: u8 = 10;
    pub const UTF8_STRING: u8 = 12;
    pub const SEQUENCE: u8 = 16;
    pub const SET: u8 = 17;
    pub const NUMERIC_STRING: u8 = 18;
    pub const PRINTABLE_STRING: u8 = 19;
    pub const TELETEX_STRING: u8 = 20;
    pub const VIDEOTEX_STRING: u8 = 21;
    pub const IA5_STRING: u8 = 22;
    pub const GRAPHIC_STRING: u8 = 25;
    pub const VISIBLE_STRING: u8 = 26;
    pub const GENERAL_STRING: u8 = 27;
    pub const BMP_STRING: u8 = 30;

    /// Tags whose payload this library exposes as text.
    pub fn is_string_tag(number: u8) -> bool {
        matches!(
            number,
            OCTET_STRING
                | UTF8_STRING
                | NUMERIC_STRING
                | PRINTABLE_STRING
                | TELETEX_STRING
                | VIDEOTEX_STRING
                | IA5_STRING
                | GRAPHIC_STRING
                | VISIBLE_STRING
                | GENERAL_STRING
                | BMP_STRING
        )
    }
}

/// Encode a signed value as minimum-length two's-complement octets.
///
/// The sign bit of the leading octet matches the sign of the value, so
/// non-negative values whose top bit would be set gain a `0x00` octet and
/// negative ones a `0xFF`. Zero is a single `0x00`.
pub fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decode two's-complement octets into a signed 64-bit value.
///
/// An empty payload decodes to zero. A payload longer than eight octets is
/// unrepresentable and yields the -1 sentinel; the raw octets stay on the
/// node untouched.
pub fn decode_integer(payload: &[u8]) -> i64 {
    if payload.is_empty() {
        return 0;
    }
    if payload.len() > 8 {
        return -1;
    }
    let mut value: i64 = if payload[0] & 0x80 != 0 { -1 } else { 0 };
    for &octet in payload {
        value = (value << 8) | octet as i64;
    }
    value
}

/// Decode an enumerated payload: as integer but logically 32-bit, so more
/// than four octets yields the -1 sentinel.
pub fn decode_enumerated(payload: &[u8]) -> i32 {
    if payload.len() > 4 {
        return -1;
    }
    decode_integer(payload) as i32
}

/// One node of a BER value tree.
///
/// Exactly one of `payload` and `children` carries content: a primitive
/// node owns raw payload octets, a constructed node owns an ordered child
/// list. `bytes_read` is filled by the reader with the serialized size the
/// node occupied on the wire (header plus consumed payload, including the
/// terminator of indefinite forms) so parent readers can advance.
///
/// Children are owned; the child-to-parent direction exists only as the
/// `(node, level)` pairs the traversal iterators hand out.
#[derive(Debug, Clone)]
pub struct Node {
    header: Header,
    payload: Option<Vec<u8>>,
    children: Vec<Node>,
    bytes_read: usize,
}

impl Node {
    /// Header-less root container; serializes as the concatenation of its
    /// children.
    pub fn new_root() -> Self {
        Self::with_header(Header::root())
    }

    /// Constructed node for an arbitrary identifier.
    pub fn new_container(identifier: Identifier) -> Self {
        Self::with_header(Header::from_identifier(identifier))
    }

    /// SEQUENCE container (universal 16, constructed).
    pub fn new_sequence() -> Self {
        Self::new_container(Identifier::universal(true, universal::SEQUENCE as u32))
    }

    /// SET container (universal 17, constructed). Child order is preserved;
    /// no DER reordering is applied.
    pub fn new_set() -> Self {
        Self::new_container(Identifier::universal(true, universal::SET as u32))
    }

    /// NULL (universal 5, empty payload).
    pub fn new_null() -> Self {
        Self::with_header(Header::from_identifier(Identifier::universal(
            false,
            universal::NULL as u32,
        )))
    }

    /// End-of-content marker (universal 0); serializes as `00 00`.
    pub fn new_end_of_content() -> Self {
        Self::with_header(Header::from_identifier(Identifier::universal(
            false,
            universal::END_OF_CONTENT as u32,
        )))
    }

    /// BOOLEAN (universal 1). Writes `0xFF` for true, `0x00` for false.
    pub fn new_boolean(value: bool) -> Self {
        Self::new_primitive(
            Identifier::universal(false, universal::BOOLEAN as u32),
            vec![if value { 0xFF } else { 0x00 }],
        )
    }

    /// INTEGER (universal 2), minimum-length two's-complement payload.
    pub fn new_integer(value: i64) -> Self {
        Self::new_primitive(
            Identifier::universal(false, universal::INTEGER as u32),
            encode_integer(value),
        )
    }

    /// ENUMERATED (universal 10), 32-bit logical range.
    pub fn new_enumerated(value: i32) -> Self {
        Self::new_primitive(
            Identifier::universal(false, universal::ENUMERATED as u32),
            encode_integer(value as i64),
        )
    }

    /// UTF8String (universal 12).
    pub fn new_text(value: &str) -> Self {
        // the tag is always a valid string tag here
        match Self::new_text_with_tag(universal::UTF8_STRING, value) {
            Ok(node) => node,
            Err(_) => unreachable!(),
        }
    }

    /// Text node with an explicit string tag (one of the universal string
    /// tags, OctetString included). An empty string carries no payload.
    pub fn new_text_with_tag(tag: u8, value: &str) -> BerlinkResult<Self> {
        if !universal::is_string_tag(tag) {
            return Err(BerlinkError::InvalidData(format!(
                "universal tag {tag} is not a string tag"
            )));
        }
        let identifier = Identifier::universal(false, tag as u32);
        let mut node = Self::with_header(Header::from_identifier(identifier));
        if !value.is_empty() {
            node.set_payload(Some(value.as_bytes().to_vec()));
        }
        Ok(node)
    }

    /// Primitive node with a raw payload for an arbitrary identifier.
    pub fn new_primitive(identifier: Identifier, payload: Vec<u8>) -> Self {
        let mut node = Self::with_header(Header::from_identifier(identifier));
        if !payload.is_empty() {
            node.set_payload(Some(payload));
        }
        node
    }

    fn with_header(header: Header) -> Self {
        Self {
            header,
            payload: None,
            children: Vec::new(),
            bytes_read: 0,
        }
    }

    /// Assemble a node the reader produced.
    pub(crate) fn from_read(
        header: Header,
        payload: Option<Vec<u8>>,
        children: Vec<Node>,
        bytes_read: usize,
    ) -> Self {
        Self {
            header,
            payload,
            children,
            bytes_read,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn node_type(&self) -> NodeType {
        self.header.node_type()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn set_payload(&mut self, payload: Option<Vec<u8>>) {
        let length = payload.as_ref().map(|p| p.len() as i64).unwrap_or(0);
        self.payload = payload;
        if self.header.is_definite() {
            self.header.set_payload_length(length);
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// Append a child, taking ownership.
    pub fn add_child(&mut self, child: Node) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Builder-style [`add_child`](Self::add_child).
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Switch this node between the definite and indefinite length forms.
    pub fn set_definite(&mut self, definite: bool) -> &mut Self {
        self.header.set_definite(definite);
        self
    }

    /// Serialized size the reader consumed for this node, zero for nodes
    /// built locally.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn is_constructed(&self) -> bool {
        self.header.is_constructed()
    }

    pub fn is_end_of_content(&self) -> bool {
        self.header.node_type().is_universal(universal::END_OF_CONTENT)
    }

    pub fn is_null(&self) -> bool {
        self.header.node_type().is_universal(universal::NULL)
    }

    pub fn is_sequence(&self) -> bool {
        self.header.node_type().is_universal(universal::SEQUENCE)
    }

    pub fn is_set(&self) -> bool {
        self.header.node_type().is_universal(universal::SET)
    }

    /// Boolean value of the payload: any nonzero octet reads as true.
    pub fn boolean_value(&self) -> bool {
        match &self.payload {
            Some(payload) => payload.first().map(|&b| b != 0).unwrap_or(false),
            None => false,
        }
    }

    /// Signed 64-bit value of the payload; -1 when unrepresentable.
    pub fn integer_value(&self) -> i64 {
        decode_integer(self.payload.as_deref().unwrap_or(&[]))
    }

    /// Signed 32-bit value of the payload; -1 when unrepresentable.
    pub fn enumerated_value(&self) -> i32 {
        decode_enumerated(self.payload.as_deref().unwrap_or(&[]))
    }

    /// UTF-8 decoding of the payload; a missing payload is the empty
    /// string. Invalid sequences are replaced, never rejected.
    pub fn text_value(&self) -> String {
        match &self.payload {
            Some(payload) => String::from_utf8_lossy(payload).into_owned(),
            None => String::new(),
        }
    }

    /// True for the structural graceful-disconnect signal: a Sequence
    /// containing at least one Application-class child with no
    /// sub-children.
    pub fn is_end_session(&self) -> bool {
        self.is_sequence()
            && self.children.iter().any(|child| {
                matches!(child.node_type(), NodeType::Application(_)) && child.children.is_empty()
            })
    }

    /// Compute and store payload and header lengths across the subtree.
    ///
    /// Two passes. The sizing pass (children before parents) assigns every
    /// node the byte count of its content, indefinite nodes included —
    /// their parents must account for the `00 00` terminators. The second
    /// pass (parents before children) then resets indefinite nodes'
    /// payload length to -1, since on the wire they carry none.
    /// Idempotent.
    pub fn calculate_payload_length(&mut self) {
        self.size_pass();
        self.reset_pass();
    }

    fn size_pass(&mut self) {
        for child in &mut self.children {
            child.size_pass();
        }
        let mut total: i64 = self.payload.as_ref().map(|p| p.len() as i64).unwrap_or(0);
        for child in &self.children {
            total += child.header.header_length() as i64 + child.header.payload_length();
            if !child.header.is_definite() {
                total += 2;
            }
        }
        self.header.set_sized_payload_length(total);
    }

    fn reset_pass(&mut self) {
        self.header.reset_indefinite_payload_length();
        for child in &mut self.children {
            child.reset_pass();
        }
    }
}

/// Structural equality: header, payload and child order. `bytes_read` is a
/// read-side bookkeeping detail and is ignored.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.payload == other.payload
            && self.children == other.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding_vectors() {
        assert_eq!(encode_integer(0), vec![0x00]);
        assert_eq!(encode_integer(127), vec![0x7F]);
        assert_eq!(encode_integer(128), vec![0x00, 0x80]);
        assert_eq!(encode_integer(256), vec![0x01, 0x00]);
        assert_eq!(encode_integer(-1), vec![0xFF]);
        assert_eq!(encode_integer(-128), vec![0x80]);
        assert_eq!(encode_integer(-129), vec![0xFF, 0x7F]);
    }

    #[test]
    fn test_integer_bijection_edges() {
        for value in [
            0i64,
            1,
            -1,
            127,
            128,
            -128,
            -129,
            255,
            256,
            i32::MAX as i64,
            i32::MIN as i64,
            i64::MAX,
            i64::MIN,
        ] {
            let encoded = encode_integer(value);
            assert_eq!(decode_integer(&encoded), value, "value {value}");
            // minimum length: either a single octet, or the leading octet
            // is not a redundant sign octet
            if encoded.len() > 1 {
                let redundant = (encoded[0] == 0x00 && encoded[1] & 0x80 == 0)
                    || (encoded[0] == 0xFF && encoded[1] & 0x80 != 0);
                assert!(!redundant, "value {value} not minimal: {encoded:?}");
            }
        }
    }

    #[test]
    fn test_oversized_integer_sentinel() {
        let payload = [0x01u8; 9];
        assert_eq!(decode_integer(&payload), -1);
        let payload = [0x01u8; 5];
        assert_eq!(decode_enumerated(&payload), -1);
    }

    #[test]
    fn test_boolean_payloads() {
        assert_eq!(Node::new_boolean(true).payload(), Some(&[0xFFu8][..]));
        assert_eq!(Node::new_boolean(false).payload(), Some(&[0x00u8][..]));
        let mut lax = Node::new_boolean(false);
        lax.set_payload(Some(vec![0x2A]));
        assert!(lax.boolean_value());
    }

    #[test]
    fn test_text_empty_has_no_payload() {
        let node = Node::new_text("");
        assert!(node.payload().is_none());
        assert_eq!(node.text_value(), "");

        let node = Node::new_text("hi");
        assert_eq!(node.payload(), Some(&b"hi"[..]));
        assert_eq!(node.text_value(), "hi");
    }

    #[test]
    fn test_text_tag_validation() {
        assert!(Node::new_text_with_tag(universal::IA5_STRING, "a").is_ok());
        assert!(Node::new_text_with_tag(universal::OCTET_STRING, "a").is_ok());
        assert!(Node::new_text_with_tag(universal::INTEGER, "a").is_err());
    }

    #[test]
    fn test_end_session_predicate() {
        let mut sequence = Node::new_sequence();
        sequence.add_child(Node::new_integer(1));
        assert!(!sequence.is_end_session());

        sequence.add_child(Node::new_container(Identifier::application(true, 0)));
        assert!(sequence.is_end_session());

        // an Application child that itself has children is no signal
        let mut busy = Node::new_sequence();
        let mut app = Node::new_container(Identifier::application(true, 0));
        app.add_child(Node::new_null());
        busy.add_child(app);
        assert!(!busy.is_end_session());
    }

    #[test]
    fn test_sizing_definite_tree() {
        let mut root = Node::new_sequence()
            .with_child(Node::new_boolean(true))
            .with_child(Node::new_integer(300));
        root.calculate_payload_length();
        // boolean: 2 header + 1 payload; integer 300: 2 header + 2 payload
        assert_eq!(root.header().payload_length(), 7);
        assert_eq!(root.header().message_length(), 9);
    }

    #[test]
    fn test_sizing_counts_indefinite_terminators() {
        let mut inner = Node::new_sequence().with_child(Node::new_boolean(false));
        inner.set_definite(false);
        let mut root = Node::new_sequence().with_child(inner);
        root.calculate_payload_length();
        // inner: 2 header + 3 child + 2 terminator = 7 on the wire
        assert_eq!(root.header().payload_length(), 7);
        // the indefinite child itself is back at -1
        assert_eq!(root.children()[0].header().payload_length(), -1);
    }

    #[test]
    fn test_sizing_idempotent() {
        let mut root = Node::new_sequence().with_child(Node::new_text("abc"));
        root.calculate_payload_length();
        let first = root.header().payload_length();
        root.calculate_payload_length();
        assert_eq!(root.header().payload_length(), first);
    }
}
