//! Router: one listening endpoint fanned out to N targets per session.
//!
//! Every session accepted on the common side gets its own set of N
//! outbound sessions. Forwarding is driven by a single dispatcher task
//! fed from session and endpoint observers over one channel, so per-link
//! handling is strictly ordered: a session's messages are never processed
//! before its link exists.

use crate::client::ClientEndpoint;
use crate::events::EndpointObserver;
use crate::server::ServerEndpoint;
use crate::settings::EndpointSettings;
use berlink_core::{BerlinkError, BerlinkResult};
use berlink_session::{Message, Session, SessionObserver, X690Transceiver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Mutate or drop a client message per target before broadcast delivery.
pub type ClientBeforeSendHook = Arc<dyn Fn(&mut Message, usize) -> bool + Send + Sync>;
/// Mutate a routed target response before it returns to the client.
pub type ServerMessageHook = Arc<dyn Fn(&mut Message) + Send + Sync>;
/// Observe a response from a non-routed target; the message is dropped.
pub type OtherServerMessageHook = Arc<dyn Fn(&Message, usize) + Send + Sync>;
/// Observe a freshly established link (set its route/broadcast here).
pub type LinkEstablishedHook = Arc<dyn Fn(&Arc<RouterLink>) + Send + Sync>;

/// Router configuration: the common (listen) side plus one settings entry
/// per target, indexed 0..N.
#[derive(Clone)]
pub struct RouterSettings {
    pub listen: EndpointSettings,
    pub targets: Vec<EndpointSettings>,
}

/// One common session wired to its N outbound sessions.
pub struct RouterLink {
    common: Arc<Session<X690Transceiver>>,
    remotes: Vec<Arc<Session<X690Transceiver>>>,
    route: AtomicUsize,
    broadcast: AtomicBool,
}

impl RouterLink {
    pub fn common(&self) -> &Arc<Session<X690Transceiver>> {
        &self.common
    }

    pub fn remotes(&self) -> &[Arc<Session<X690Transceiver>>] {
        &self.remotes
    }

    /// Index of the routed target, within `[0, N)`.
    pub fn route(&self) -> usize {
        self.route.load(Ordering::SeqCst)
    }

    pub fn set_route(&self, route: usize) {
        self.route.store(route, Ordering::SeqCst);
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast.load(Ordering::SeqCst)
    }

    pub fn set_broadcast(&self, broadcast: bool) {
        self.broadcast.store(broadcast, Ordering::SeqCst);
    }
}

enum RouterEvent {
    Spawned(Arc<Session<X690Transceiver>>),
    Closed(u32),
    Client { session_id: u32, message: Message },
    Remote { common_id: u32, index: usize, message: Message },
    RemoteEnd { common_id: u32, index: usize },
}

/// 1:N composition of endpoints with per-session routing.
pub struct Router {
    settings: RouterSettings,
    server: Arc<ServerEndpoint<X690Transceiver>>,
    links: StdRwLock<HashMap<u32, Arc<RouterLink>>>,
    events_tx: UnboundedSender<RouterEvent>,
    events_rx: StdMutex<Option<UnboundedReceiver<RouterEvent>>>,
    dispatcher_handle: StdMutex<Option<JoinHandle<()>>>,
    before_send: StdRwLock<Option<ClientBeforeSendHook>>,
    server_message: StdRwLock<Option<ServerMessageHook>>,
    other_server_message: StdRwLock<Option<OtherServerMessageHook>>,
    link_established: StdRwLock<Option<LinkEstablishedHook>>,
}

impl Router {
    pub fn new(settings: RouterSettings) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let server = ServerEndpoint::x690(settings.listen.clone());
        server.subscribe(Arc::new(CommonEndpointObserver {
            tx: events_tx.clone(),
        }));
        server.subscribe_sessions(Arc::new(CommonSessionObserver {
            tx: events_tx.clone(),
        }));
        Arc::new(Self {
            settings,
            server,
            links: StdRwLock::new(HashMap::new()),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            dispatcher_handle: StdMutex::new(None),
            before_send: StdRwLock::new(None),
            server_message: StdRwLock::new(None),
            other_server_message: StdRwLock::new(None),
            link_established: StdRwLock::new(None),
        })
    }

    /// The common-side endpoint (subscribe here for `SessionSpawned` /
    /// `SessionClosed`).
    pub fn server(&self) -> &Arc<ServerEndpoint<X690Transceiver>> {
        &self.server
    }

    /// Link of a common session, when established.
    pub fn link(&self, common_session_id: u32) -> Option<Arc<RouterLink>> {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&common_session_id)
            .cloned()
    }

    pub fn set_before_send<F>(&self, hook: F)
    where
        F: Fn(&mut Message, usize) -> bool + Send + Sync + 'static,
    {
        *self.before_send.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    pub fn set_server_message<F>(&self, hook: F)
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        *self
            .server_message
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    pub fn set_other_server_message<F>(&self, hook: F)
    where
        F: Fn(&Message, usize) + Send + Sync + 'static,
    {
        *self
            .other_server_message
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    pub fn set_link_established<F>(&self, hook: F)
    where
        F: Fn(&Arc<RouterLink>) + Send + Sync + 'static,
    {
        *self
            .link_established
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    /// Start the common endpoint and the dispatcher.
    pub async fn start(self: Arc<Self>) -> BerlinkResult<()> {
        let rx = self
            .events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| BerlinkError::InvalidData("router already started".into()))?;
        self.server.clone().start().await?;
        let router = Arc::clone(&self);
        let handle = tokio::spawn(dispatch_events(router, rx));
        *self
            .dispatcher_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Bound address of the common side.
    pub fn local_address(&self) -> Option<std::net::SocketAddr> {
        self.server.local_address()
    }

    /// Close everything: the common endpoint, every link, the dispatcher.
    pub async fn close(&self) -> BerlinkResult<()> {
        self.server.close().await?;
        let ids: Vec<u32> = {
            self.links
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .keys()
                .copied()
                .collect()
        };
        for id in ids {
            self.teardown_link(id).await;
        }
        let handle = self
            .dispatcher_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        Ok(())
    }

    async fn establish_link(&self, common: Arc<Session<X690Transceiver>>) {
        let common_id = common.id();
        let mut remotes = Vec::new();
        for (index, target) in self.settings.targets.iter().enumerate() {
            let client = ClientEndpoint::x690(target.clone());
            client.subscribe_sessions(Arc::new(RemoteSessionObserver {
                common_id,
                index,
                tx: self.events_tx.clone(),
            }));
            match client.clone().connect().await {
                Ok(session) => remotes.push(session),
                Err(e) => {
                    log::error!(
                        "router: connect to target {index} ({}) failed: {e}",
                        target.address
                    );
                    for remote in &remotes {
                        let _ = remote.close().await;
                    }
                    let _ = common.close().await;
                    return;
                }
            }
        }
        let link = Arc::new(RouterLink {
            common,
            remotes,
            route: AtomicUsize::new(0),
            broadcast: AtomicBool::new(false),
        });
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(common_id, link.clone());
        log::info!(
            "router: session {common_id} linked to {} targets",
            link.remotes.len()
        );
        let hook = self
            .link_established
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook(&link);
        }
    }

    async fn teardown_link(&self, common_id: u32) {
        let link = self
            .links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&common_id);
        let link = match link {
            Some(link) => link,
            None => return,
        };
        for remote in &link.remotes {
            let _ = remote.close().await;
        }
        log::info!("router: link for session {common_id} torn down");
    }

    async fn handle_client_message(&self, session_id: u32, message: Message) {
        let link = match self.link(session_id) {
            Some(link) => link,
            None => {
                log::warn!("router: message from session {session_id} with no link, dropped");
                return;
            }
        };
        if message.is_end_session() {
            // the common loop is about to end; teardown follows its Closed
            return;
        }
        if link.is_broadcast() {
            let count = link.remotes.len();
            let order: Vec<usize> = if link.route() == 0 {
                (0..count).collect()
            } else {
                (0..count).rev().collect()
            };
            let hook = self
                .before_send
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            for index in order {
                let mut copy = message.clone();
                let forward = match &hook {
                    Some(hook) => hook(&mut copy, index),
                    None => true,
                };
                if !forward {
                    continue;
                }
                if let Err(e) = link.remotes[index].send(&mut copy).await {
                    log::error!("router: forward to target {index} failed: {e}");
                }
            }
        } else {
            let route = link.route();
            match link.remotes.get(route) {
                Some(remote) => {
                    let mut message = message;
                    if let Err(e) = remote.send(&mut message).await {
                        log::error!("router: forward to target {route} failed: {e}");
                    }
                }
                None => log::warn!("router: route {route} out of range, message dropped"),
            }
        }
    }

    async fn handle_remote_message(&self, common_id: u32, index: usize, message: Message) {
        let link = match self.link(common_id) {
            Some(link) => link,
            None => return,
        };
        if message.is_end_session() {
            log::debug!("router: target {index} signalled end of session");
            let _ = link.common.close().await;
            return;
        }
        if index == link.route() {
            let mut message = message;
            let hook = self
                .server_message
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(hook) = hook {
                hook(&mut message);
            }
            if let Err(e) = link.common.send(&mut message).await {
                log::error!("router: response to session {common_id} failed: {e}");
            }
        } else {
            let hook = self
                .other_server_message
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(hook) = hook {
                hook(&message, index);
            }
            log::debug!("router: response from non-routed target {index} dropped");
        }
    }

    async fn handle_remote_end(&self, common_id: u32, index: usize) {
        let link = self.link(common_id);
        if let Some(link) = link {
            log::debug!(
                "router: target {index} for session {common_id} disconnected; closing client side"
            );
            let _ = link.common.close().await;
        }
    }
}

async fn dispatch_events(router: Arc<Router>, mut rx: UnboundedReceiver<RouterEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            RouterEvent::Spawned(common) => router.establish_link(common).await,
            RouterEvent::Closed(id) => router.teardown_link(id).await,
            RouterEvent::Client { session_id, message } => {
                router.handle_client_message(session_id, message).await
            }
            RouterEvent::Remote {
                common_id,
                index,
                message,
            } => router.handle_remote_message(common_id, index, message).await,
            RouterEvent::RemoteEnd { common_id, index } => {
                router.handle_remote_end(common_id, index).await
            }
        }
    }
}

struct CommonEndpointObserver {
    tx: UnboundedSender<RouterEvent>,
}

impl EndpointObserver<X690Transceiver> for CommonEndpointObserver {
    fn on_session_spawned(&self, session: &Arc<Session<X690Transceiver>>) {
        let _ = self.tx.send(RouterEvent::Spawned(session.clone()));
    }

    fn on_session_closed(&self, session: &Arc<Session<X690Transceiver>>) {
        let _ = self.tx.send(RouterEvent::Closed(session.id()));
    }
}

struct CommonSessionObserver {
    tx: UnboundedSender<RouterEvent>,
}

impl SessionObserver<X690Transceiver> for CommonSessionObserver {
    fn on_message(&self, session: &Arc<Session<X690Transceiver>>, packet: &Message) {
        let _ = self.tx.send(RouterEvent::Client {
            session_id: session.id(),
            message: packet.clone(),
        });
    }
}

struct RemoteSessionObserver {
    common_id: u32,
    index: usize,
    tx: UnboundedSender<RouterEvent>,
}

impl SessionObserver<X690Transceiver> for RemoteSessionObserver {
    fn on_message(&self, _session: &Arc<Session<X690Transceiver>>, packet: &Message) {
        let _ = self.tx.send(RouterEvent::Remote {
            common_id: self.common_id,
            index: self.index,
            message: packet.clone(),
        });
    }

    fn on_end(&self, _session: &Arc<Session<X690Transceiver>>) {
        let _ = self.tx.send(RouterEvent::RemoteEnd {
            common_id: self.common_id,
            index: self.index,
        });
    }
}
