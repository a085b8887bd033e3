//! Transport layer of the berlink stack.
//!
//! The session layer drives everything through the [`StreamAccessor`]
//! trait, so TCP and TLS streams are interchangeable behind a
//! [`BoxedStream`]. The TLS transport lives behind the `tls` cargo
//! feature.

pub mod stream;
pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

pub use stream::{BoxedStream, StreamAccessor, TransportLayer};
pub use tcp::{configure_keep_alive, TcpSettings, TcpTransport};
#[cfg(feature = "tls")]
pub use tls::TlsTransport;
