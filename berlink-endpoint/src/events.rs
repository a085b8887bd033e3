//! Endpoint-level events: session lifecycle on a server or client
//! endpoint.

use berlink_session::{Session, Transceiver};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Observer of an endpoint's session lifecycle.
pub trait EndpointObserver<X: Transceiver>: Send + Sync {
    /// A session was accepted/connected; fires before its loop starts.
    fn on_session_spawned(&self, _session: &Arc<Session<X>>) {}
    /// A session's loop exited and it left the endpoint; fires exactly
    /// once per session.
    fn on_session_closed(&self, _session: &Arc<Session<X>>) {}
}

/// Owned form of the endpoint events, for channel consumers.
#[derive(Debug)]
pub enum EndpointEvent<X: Transceiver + 'static> {
    SessionSpawned(Arc<Session<X>>),
    SessionClosed(Arc<Session<X>>),
}

impl<X: Transceiver + 'static> Clone for EndpointEvent<X> {
    fn clone(&self) -> Self {
        match self {
            EndpointEvent::SessionSpawned(session) => {
                EndpointEvent::SessionSpawned(session.clone())
            }
            EndpointEvent::SessionClosed(session) => EndpointEvent::SessionClosed(session.clone()),
        }
    }
}

/// Endpoint observer that forwards events over an unbounded channel.
pub struct ChannelEndpointObserver<X: Transceiver + 'static> {
    tx: UnboundedSender<EndpointEvent<X>>,
}

impl<X: Transceiver + 'static> ChannelEndpointObserver<X> {
    pub fn new() -> (Self, UnboundedReceiver<EndpointEvent<X>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn with_sender(tx: UnboundedSender<EndpointEvent<X>>) -> Self {
        Self { tx }
    }
}

impl<X: Transceiver + 'static> EndpointObserver<X> for ChannelEndpointObserver<X> {
    fn on_session_spawned(&self, session: &Arc<Session<X>>) {
        let _ = self.tx.send(EndpointEvent::SessionSpawned(session.clone()));
    }

    fn on_session_closed(&self, session: &Arc<Session<X>>) {
        let _ = self.tx.send(EndpointEvent::SessionClosed(session.clone()));
    }
}
