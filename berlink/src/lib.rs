//! berlink — X.690 BER messaging over TCP.
//!
//! This library encodes and decodes ITU-T X.690 Basic Encoding Rules into
//! an in-memory tree of typed nodes, and carries those messages over TCP
//! sessions (optionally TLS-protected, feature `tls`) with partial-read
//! recovery and multi-endpoint routing.
//!
//! # Architecture
//!
//! The workspace is organized as one crate per layer:
//!
//! - `berlink-core`: error taxonomy and protocol limits
//! - `berlink-asn1`: the BER codec (identifier, length octets, header,
//!   node tree, reader, writer, DFS traversal)
//! - `berlink-transport`: stream abstraction, TCP and TLS transports
//! - `berlink-session`: message framing with partial-read recovery,
//!   transceivers, the session receive loop
//! - `berlink-endpoint`: server/client endpoints, router, proxy
//!
//! # Usage
//!
//! ```no_run
//! use berlink::asn1::Node;
//!
//! let mut request = Node::new_sequence();
//! request.add_child(Node::new_integer(1));
//! request.add_child(Node::new_text("hello"));
//! let wire_bytes = request.encode();
//! let decoded = Node::read_buffer(&wire_bytes)?;
//! assert_eq!(decoded, request);
//! # Ok::<(), berlink::BerlinkError>(())
//! ```

pub use berlink_core::limits;
pub use berlink_core::{BerlinkError, BerlinkResult};

// The BER codec
pub mod asn1 {
    pub use berlink_asn1::*;
}

// Transports
pub mod transport {
    pub use berlink_transport::*;
}

// Sessions and message framing
pub mod session {
    pub use berlink_session::*;
}

// Endpoints, router and proxy
pub mod endpoint {
    pub use berlink_endpoint::*;
}
