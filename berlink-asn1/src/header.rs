//! Node headers: identifier plus length octets.

use crate::identifier::{Identifier, TagClass};
use crate::length::{LengthOctets, INDEFINITE};
use crate::source::ByteSource;
use berlink_core::BerlinkResult;

/// Classified type of a node, derived from its identifier.
///
/// `Root` is the header-less container used to serialize a flat
/// concatenation of top-level values; it never appears on the wire itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Universal(u8),
    Application(u32),
    ContextSpecific(u32),
    Private(u32),
}

impl NodeType {
    /// Classify an identifier.
    pub fn from_identifier(identifier: &Identifier) -> Self {
        match identifier.class() {
            TagClass::Universal => NodeType::Universal(identifier.number() as u8),
            TagClass::Application => NodeType::Application(identifier.number()),
            TagClass::ContextSpecific => NodeType::ContextSpecific(identifier.number()),
            TagClass::Private => NodeType::Private(identifier.number()),
        }
    }

    /// True when this is the given Universal-class tag.
    pub fn is_universal(&self, number: u8) -> bool {
        matches!(self, NodeType::Universal(n) if *n == number)
    }
}

/// A node header: identifier octets plus length octets.
///
/// Invariants maintained by the setters:
/// - `is_definite` ⇔ `payload_length >= 0`; forcing the indefinite form
///   resets `payload_length` to -1;
/// - `header_length` is always the octet count of identifier plus length
///   octets as they would currently serialize.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    identifier: Option<Identifier>,
    node_type: NodeType,
    payload_length: i64,
    header_length: usize,
    is_definite: bool,
}

impl Header {
    /// Header of the header-less root container.
    pub fn root() -> Self {
        Self {
            identifier: None,
            node_type: NodeType::Root,
            payload_length: 0,
            header_length: 0,
            is_definite: true,
        }
    }

    /// Fresh definite-length header for an identifier, payload length zero.
    pub fn from_identifier(identifier: Identifier) -> Self {
        let node_type = NodeType::from_identifier(&identifier);
        let mut header = Self {
            identifier: Some(identifier),
            node_type,
            payload_length: 0,
            header_length: 0,
            is_definite: true,
        };
        header.refresh_header_length();
        header
    }

    /// Combine identifier and length octets recovered off the wire.
    pub fn from_parts(identifier: Identifier, length: LengthOctets) -> Self {
        let node_type = NodeType::from_identifier(&identifier);
        Self {
            header_length: identifier.length() + length.length(),
            identifier: Some(identifier),
            node_type,
            payload_length: length.value(),
            is_definite: length.is_definite(),
        }
    }

    /// Read a header from a source.
    ///
    /// `Ok(None)` when a stream source is exhausted at the very first
    /// identifier octet (clean end of input). An identifier followed by
    /// missing length octets is `TruncatedHeader`.
    pub fn read<S: ByteSource>(source: &mut S) -> BerlinkResult<Option<Header>> {
        let identifier = match Identifier::read(source)? {
            None => return Ok(None),
            Some(identifier) => identifier,
        };
        let length = LengthOctets::read(source)?;
        Ok(Some(Header::from_parts(identifier, length)))
    }

    /// Append the header octets to `out`. A root header writes nothing.
    pub fn write(&self, out: &mut Vec<u8>) {
        if let Some(identifier) = &self.identifier {
            identifier.write(out);
            LengthOctets::write_value(self.wire_length(), out);
        }
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_root(&self) -> bool {
        matches!(self.node_type, NodeType::Root)
    }

    /// Constructed flag of the identifier; the root container counts as
    /// constructed.
    pub fn is_constructed(&self) -> bool {
        match &self.identifier {
            Some(identifier) => identifier.is_constructed(),
            None => true,
        }
    }

    pub fn payload_length(&self) -> i64 {
        self.payload_length
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn is_definite(&self) -> bool {
        self.is_definite
    }

    /// Total serialized length, or -1 for the indefinite form.
    pub fn message_length(&self) -> i64 {
        if self.is_definite {
            self.header_length as i64 + self.payload_length
        } else {
            -1
        }
    }

    /// Set a definite payload length. A negative value switches the header
    /// to the indefinite form instead.
    pub fn set_payload_length(&mut self, length: i64) {
        if length < 0 {
            self.set_definite(false);
            return;
        }
        self.payload_length = length;
        self.is_definite = true;
        self.refresh_header_length();
    }

    /// Switch between the definite and indefinite forms. Forcing the
    /// indefinite form resets `payload_length` to -1.
    pub fn set_definite(&mut self, definite: bool) {
        self.is_definite = definite;
        if definite {
            if self.payload_length < 0 {
                self.payload_length = 0;
            }
        } else {
            self.payload_length = INDEFINITE;
        }
        self.refresh_header_length();
    }

    /// Store a payload length without touching the definiteness flag.
    ///
    /// Used by the sizing pass, which needs a real byte count on indefinite
    /// nodes while it sizes their parents; the pass resets those to -1
    /// before anyone else sees them.
    pub(crate) fn set_sized_payload_length(&mut self, length: i64) {
        self.payload_length = length;
        self.refresh_header_length();
    }

    pub(crate) fn reset_indefinite_payload_length(&mut self) {
        if !self.is_definite {
            self.payload_length = INDEFINITE;
        }
    }

    /// Length value as it goes on the wire.
    fn wire_length(&self) -> i64 {
        if self.is_definite {
            self.payload_length
        } else {
            INDEFINITE
        }
    }

    fn refresh_header_length(&mut self) {
        self.header_length = match &self.identifier {
            Some(identifier) => identifier.length() + LengthOctets::octet_count(self.wire_length()),
            None => 0,
        };
    }
}
