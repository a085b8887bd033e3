//! Session layer of the berlink stack.
//!
//! [`Message`] frames one BER node on the wire and survives fragmented
//! reads by carrying its incomplete state forward. A [`Transceiver`]
//! turns a byte stream into packets of one concrete type; a [`Session`]
//! owns a connected stream, runs the receive loop and feeds observers.

pub mod events;
pub mod message;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;
pub mod transceiver;

pub use events::{CallbackObserver, ChannelObserver, SessionEvent, SessionObserver};
pub use message::{CompleteMessage, Message, PartialMessage};
pub use session::Session;
pub use transceiver::{
    BinaryPacket, BinaryPacketTransceiver, BinaryTransceiver, ReceiveStatus, StringTransceiver,
    Transceiver, X690Transceiver,
};
