//! Client endpoint: one outbound session under a connect deadline.

use crate::settings::EndpointSettings;
use crate::server::TransceiverFactory;
use berlink_core::{BerlinkError, BerlinkResult};
use berlink_session::{Session, SessionObserver, Transceiver, X690Transceiver};
use berlink_transport::{BoxedStream, TcpSettings, TcpTransport};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::net::TcpStream;

/// An endpoint that dials out and runs a single session.
///
/// `connect` enforces the configured deadline (`Timeout` on expiry),
/// performs the optional TLS handshake inline, and starts the receive
/// loop. Observers registered before `connect` see every packet.
pub struct ClientEndpoint<X: Transceiver + 'static> {
    settings: EndpointSettings,
    factory: TransceiverFactory<X>,
    session_observers: StdRwLock<Vec<Arc<dyn SessionObserver<X>>>>,
    session: StdRwLock<Option<Arc<Session<X>>>>,
    next_session_id: AtomicU32,
}

impl ClientEndpoint<X690Transceiver> {
    /// Client endpoint speaking framed X.690 messages.
    pub fn x690(settings: EndpointSettings) -> Arc<Self> {
        let buffer_length = settings.receive_buffer_length;
        Self::new(
            settings,
            Arc::new(move || X690Transceiver::with_buffer_length(buffer_length)),
        )
    }
}

impl<X: Transceiver + 'static> ClientEndpoint<X> {
    pub fn new(settings: EndpointSettings, factory: TransceiverFactory<X>) -> Arc<Self> {
        Arc::new(Self {
            settings,
            factory,
            session_observers: StdRwLock::new(Vec::new()),
            session: StdRwLock::new(None),
            next_session_id: AtomicU32::new(1),
        })
    }

    /// Observer installed on the session created by the next `connect`.
    pub fn subscribe_sessions(&self, observer: Arc<dyn SessionObserver<X>>) {
        self.session_observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Connect, authenticate and start the session loop.
    pub async fn connect(self: Arc<Self>) -> BerlinkResult<Arc<Session<X>>> {
        let stream = tokio::time::timeout(
            self.settings.connect_timeout,
            TcpStream::connect(self.settings.address),
        )
        .await
        .map_err(|_| BerlinkError::Timeout)??;
        let transport = client_transport(&self.settings, stream).await?;

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = Session::new(id, transport, (self.factory)(), Some(self.settings.address));
        let observers = self
            .session_observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            session.subscribe(observer);
        }
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());

        let endpoint = Arc::clone(&self);
        session.clone().spawn_with_teardown(move |ended| {
            log::info!("client session {} ended", ended.id());
            let mut slot = endpoint.session.write().unwrap_or_else(|e| e.into_inner());
            if slot.as_ref().map(|current| current.id() == ended.id()) == Some(true) {
                *slot = None;
            }
        });
        log::info!("connected to {}", self.settings.address);
        Ok(session)
    }

    /// Whether the session exists and its loop is still running.
    pub fn is_connected(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|session| !session.is_closed())
            .unwrap_or(false)
    }

    pub fn session(&self) -> Option<Arc<Session<X>>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Transmit on the current session.
    pub async fn send(&self, packet: &mut X::Packet) -> BerlinkResult<()> {
        let session = self.session().ok_or(BerlinkError::NotConnected)?;
        session.send(packet).await
    }

    /// Close the current session, if any.
    pub async fn close(&self) -> BerlinkResult<()> {
        let session = {
            self.session
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .take()
        };
        match session {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

/// Wrap a dialed socket in the configured transport, TLS handshake
/// included.
async fn client_transport(
    settings: &EndpointSettings,
    stream: TcpStream,
) -> BerlinkResult<BoxedStream> {
    #[cfg(feature = "tls")]
    if let Some(tls) = &settings.tls_client {
        let transport = berlink_transport::TlsTransport::authenticate_as_client(
            stream,
            tls.config.clone(),
            &tls.server_name,
        )
        .await?;
        return Ok(Box::new(transport));
    }
    let tcp_settings = TcpSettings {
        address: settings.address,
        connect_timeout: Some(settings.connect_timeout),
        keep_alive: settings.keep_alive,
    };
    Ok(Box::new(TcpTransport::from_connected_stream(
        stream,
        tcp_settings,
    )?))
}
