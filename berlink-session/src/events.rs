//! Session event surface.
//!
//! Observers run synchronously on the session's loop task. For consumers
//! that want to process events elsewhere (the router does), the channel
//! observer clones them onto an unbounded channel.

use crate::session::Session;
use crate::transceiver::Transceiver;
use berlink_core::BerlinkError;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// An event raised by a session's receive loop.
#[derive(Debug)]
pub enum SessionEvent<P> {
    /// A full packet was received.
    MessageReceived { session_id: u32, packet: P },
    /// The loop stopped on an error; the session closes after this.
    ExceptionThrown {
        session_id: u32,
        error: Arc<BerlinkError>,
    },
    /// The receive loop exited.
    End { session_id: u32 },
}

impl<P: Clone> Clone for SessionEvent<P> {
    fn clone(&self) -> Self {
        match self {
            SessionEvent::MessageReceived { session_id, packet } => SessionEvent::MessageReceived {
                session_id: *session_id,
                packet: packet.clone(),
            },
            SessionEvent::ExceptionThrown { session_id, error } => SessionEvent::ExceptionThrown {
                session_id: *session_id,
                error: error.clone(),
            },
            SessionEvent::End { session_id } => SessionEvent::End {
                session_id: *session_id,
            },
        }
    }
}

/// Observer of one session's events.
///
/// Every method has an empty default, so implementors pick the events
/// they care about. Handlers run on the session's loop task; a handler
/// that blocks stalls that one session.
pub trait SessionObserver<X: Transceiver>: Send + Sync {
    fn on_message(&self, _session: &Arc<Session<X>>, _packet: &X::Packet) {}
    fn on_exception(&self, _session: &Arc<Session<X>>, _error: &Arc<BerlinkError>) {}
    fn on_end(&self, _session: &Arc<Session<X>>) {}
}

/// Message observer backed by a plain callback.
pub struct CallbackObserver<X, F>
where
    X: Transceiver,
    F: Fn(&Arc<Session<X>>, &X::Packet) + Send + Sync,
{
    callback: F,
    _transceiver: PhantomData<fn() -> X>,
}

impl<X, F> CallbackObserver<X, F>
where
    X: Transceiver,
    F: Fn(&Arc<Session<X>>, &X::Packet) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _transceiver: PhantomData,
        }
    }
}

impl<X, F> SessionObserver<X> for CallbackObserver<X, F>
where
    X: Transceiver,
    F: Fn(&Arc<Session<X>>, &X::Packet) + Send + Sync,
{
    fn on_message(&self, session: &Arc<Session<X>>, packet: &X::Packet) {
        (self.callback)(session, packet);
    }
}

/// Observer that forwards owned events over an unbounded channel.
///
/// Send errors are ignored: a dropped receiver just means nobody is
/// listening anymore.
pub struct ChannelObserver<P> {
    tx: UnboundedSender<SessionEvent<P>>,
}

impl<P> ChannelObserver<P> {
    pub fn new() -> (Self, UnboundedReceiver<SessionEvent<P>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Observer feeding an existing sender (several sessions can share
    /// one channel).
    pub fn with_sender(tx: UnboundedSender<SessionEvent<P>>) -> Self {
        Self { tx }
    }
}

impl<X> SessionObserver<X> for ChannelObserver<X::Packet>
where
    X: Transceiver + 'static,
    X::Packet: Clone,
{
    fn on_message(&self, session: &Arc<Session<X>>, packet: &X::Packet) {
        let _ = self.tx.send(SessionEvent::MessageReceived {
            session_id: session.id(),
            packet: packet.clone(),
        });
    }

    fn on_exception(&self, session: &Arc<Session<X>>, error: &Arc<BerlinkError>) {
        let _ = self.tx.send(SessionEvent::ExceptionThrown {
            session_id: session.id(),
            error: error.clone(),
        });
    }

    fn on_end(&self, session: &Arc<Session<X>>) {
        let _ = self.tx.send(SessionEvent::End {
            session_id: session.id(),
        });
    }
}
