//! X.690 BER tag-length-value codec.
//!
//! Decoding turns a byte source into a tree of [`Node`]s — typed leaves
//! (Boolean, Integer, Enumerated, Text, Null, EndOfContent) and constructed
//! containers (Sequence, Set, generic) — and encoding walks the tree back
//! out, sizing every definite header so byte counts match the content they
//! cover. Both the definite and the indefinite length forms are supported
//! at any nesting depth.
//!
//! Two read modes share one implementation: buffer mode over `&[u8]`
//! (overruns are hard `Bounds` errors) and stream mode over any
//! `std::io::Read` (a clean EOF at a message boundary is `Ok(None)`).
//!
//! Known deviations from canonical X.690, kept deliberately: multi-octet
//! tag numbers use a library-internal encoding (see [`Identifier`]), and
//! definite payload lengths are capped at 32 bits.

pub mod header;
pub mod identifier;
pub mod length;
pub mod node;
pub mod reader;
pub mod source;
pub mod traversal;
pub mod writer;

pub use header::{Header, NodeType};
pub use identifier::{Identifier, TagClass};
pub use length::LengthOctets;
pub use node::{decode_enumerated, decode_integer, encode_integer, universal, Node};
pub use reader::{read_content, read_node};
pub use source::{ByteSource, SliceSource, StreamSource};
pub use writer::write_node;
