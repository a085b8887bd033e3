//! Endpoints of the berlink stack: server and client session hosting,
//! plus the router/proxy compositions that relay framed X.690 messages
//! between a local session and one or many remote ones.

pub mod client;
pub mod events;
pub mod proxy;
pub mod router;
pub mod server;
pub mod settings;

pub use client::ClientEndpoint;
pub use events::{ChannelEndpointObserver, EndpointEvent, EndpointObserver};
pub use proxy::Proxy;
pub use router::{Router, RouterLink, RouterSettings};
pub use server::{ServerEndpoint, TransceiverFactory};
pub use settings::EndpointSettings;
#[cfg(feature = "tls")]
pub use settings::TlsClientSettings;
