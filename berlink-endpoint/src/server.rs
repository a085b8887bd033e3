//! Server endpoint: bind, accept, one session per connection.

use crate::events::EndpointObserver;
use crate::settings::EndpointSettings;
use berlink_core::BerlinkResult;
use berlink_session::{Session, SessionObserver, Transceiver, X690Transceiver};
use berlink_transport::{BoxedStream, TcpSettings, TcpTransport};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Builds one transceiver per accepted session.
pub type TransceiverFactory<X> = Arc<dyn Fn() -> X + Send + Sync>;

/// A listening endpoint hosting one session per accepted connection.
///
/// Sessions get unique ids and live in a shared map; observers registered
/// with [`subscribe_sessions`](ServerEndpoint::subscribe_sessions) are
/// installed on every session before its loop starts, so no packet is
/// missed. [`EndpointObserver::on_session_closed`] fires exactly once per
/// session, when its loop has exited and it left the map.
pub struct ServerEndpoint<X: Transceiver + 'static> {
    settings: EndpointSettings,
    factory: TransceiverFactory<X>,
    sessions: StdRwLock<HashMap<u32, Arc<Session<X>>>>,
    session_observers: StdRwLock<Vec<Arc<dyn SessionObserver<X>>>>,
    endpoint_observers: StdRwLock<Vec<Arc<dyn EndpointObserver<X>>>>,
    next_session_id: AtomicU32,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    accept_handle: StdMutex<Option<JoinHandle<()>>>,
    local_address: StdRwLock<Option<SocketAddr>>,
}

impl ServerEndpoint<X690Transceiver> {
    /// Server endpoint speaking framed X.690 messages.
    pub fn x690(settings: EndpointSettings) -> Arc<Self> {
        let buffer_length = settings.receive_buffer_length;
        Self::new(
            settings,
            Arc::new(move || X690Transceiver::with_buffer_length(buffer_length)),
        )
    }
}

impl<X: Transceiver + 'static> ServerEndpoint<X> {
    pub fn new(settings: EndpointSettings, factory: TransceiverFactory<X>) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self {
            settings,
            factory,
            sessions: StdRwLock::new(HashMap::new()),
            session_observers: StdRwLock::new(Vec::new()),
            endpoint_observers: StdRwLock::new(Vec::new()),
            next_session_id: AtomicU32::new(1),
            cancel_tx,
            cancel_rx,
            accept_handle: StdMutex::new(None),
            local_address: StdRwLock::new(None),
        })
    }

    /// Observer installed on every future session, before its loop runs.
    pub fn subscribe_sessions(&self, observer: Arc<dyn SessionObserver<X>>) {
        self.session_observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Observer of the endpoint's session lifecycle.
    pub fn subscribe(&self, observer: Arc<dyn EndpointObserver<X>>) {
        self.endpoint_observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Bound address, available once [`start`](ServerEndpoint::start)
    /// returned (useful with port 0).
    pub fn local_address(&self) -> Option<SocketAddr> {
        *self.local_address.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Live sessions, in no particular order.
    pub fn sessions(&self) -> Vec<Arc<Session<X>>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn session(&self, id: u32) -> Option<Arc<Session<X>>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Bind and start the accept loop on its own task.
    pub async fn start(self: Arc<Self>) -> BerlinkResult<()> {
        let listener = TcpListener::bind(self.settings.address).await?;
        let local = listener.local_addr()?;
        *self
            .local_address
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(local);
        log::info!("server endpoint listening on {local}");

        let endpoint = Arc::clone(&self);
        let handle = tokio::spawn(accept_loop(endpoint, listener));
        *self
            .accept_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stop accepting and close every session.
    pub async fn close(&self) -> BerlinkResult<()> {
        let _ = self.cancel_tx.send(true);
        let handle = self
            .accept_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let sessions: Vec<_> = {
            let map = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for session in sessions {
            let _ = session.close().await;
        }
        Ok(())
    }

    fn dispatch_spawned(&self, session: &Arc<Session<X>>) {
        let observers = self
            .endpoint_observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| observer.on_session_spawned(session)));
            if outcome.is_err() {
                log::error!("endpoint observer panicked in on_session_spawned");
            }
        }
    }

    fn dispatch_closed(&self, session: &Arc<Session<X>>) {
        let observers = self
            .endpoint_observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_session_closed(session)));
            if outcome.is_err() {
                log::error!("endpoint observer panicked in on_session_closed");
            }
        }
    }
}

async fn accept_loop<X: Transceiver + 'static>(
    endpoint: Arc<ServerEndpoint<X>>,
    listener: TcpListener,
) {
    let mut cancel = endpoint.cancel_rx.clone();
    loop {
        tokio::select! {
            _ = cancel.changed() => {
                log::debug!("accept loop cancelled");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = spawn_session(&endpoint, stream, peer).await {
                        log::error!("failed to set up session from {peer}: {e}");
                    }
                }
                Err(e) => {
                    // keep accepting; one bad handshake must not stop the endpoint
                    log::error!("accept failed: {e}");
                }
            }
        }
    }
}

async fn spawn_session<X: Transceiver + 'static>(
    endpoint: &Arc<ServerEndpoint<X>>,
    stream: TcpStream,
    peer: SocketAddr,
) -> BerlinkResult<()> {
    log::info!("accepted connection from {peer}");
    let transport = server_transport(&endpoint.settings, stream).await?;

    let id = endpoint.next_session_id.fetch_add(1, Ordering::SeqCst);
    let transceiver = (endpoint.factory)();
    let session = Session::new(id, transport, transceiver, Some(peer));

    let observers = endpoint
        .session_observers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    for observer in observers {
        session.subscribe(observer);
    }

    endpoint
        .sessions
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(id, session.clone());
    endpoint.dispatch_spawned(&session);

    let owner = Arc::clone(endpoint);
    session.clone().spawn_with_teardown(move |ended| {
        owner
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&ended.id());
        owner.dispatch_closed(ended);
        log::info!("session {} closed", ended.id());
    });
    Ok(())
}

/// Wrap an accepted socket in the configured transport, TLS handshake
/// included.
async fn server_transport(
    settings: &EndpointSettings,
    stream: TcpStream,
) -> BerlinkResult<BoxedStream> {
    #[cfg(feature = "tls")]
    if let Some(config) = &settings.tls_server {
        let transport =
            berlink_transport::TlsTransport::authenticate_as_server(stream, config.clone())
                .await?;
        return Ok(Box::new(transport));
    }
    let peer = stream.peer_addr().unwrap_or(settings.address);
    let tcp_settings = TcpSettings {
        address: peer,
        connect_timeout: Some(settings.connect_timeout),
        keep_alive: settings.keep_alive,
    };
    Ok(Box::new(TcpTransport::from_connected_stream(
        stream,
        tcp_settings,
    )?))
}
