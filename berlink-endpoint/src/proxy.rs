//! Proxy: the 1:1 specialization of the router, with a symmetric hook
//! surface.

use crate::router::{Router, RouterSettings};
use crate::settings::EndpointSettings;
use berlink_core::BerlinkResult;
use berlink_session::Message;
use std::net::SocketAddr;
use std::sync::Arc;

/// A 1:1 relay between one listening side and one target.
///
/// Messages pass through in both directions; each direction has a hook
/// that may mutate the message, and the client→server hook may drop it.
/// End-session signals and disconnects on either side close the other.
pub struct Proxy {
    router: Arc<Router>,
}

impl Proxy {
    pub fn new(listen: EndpointSettings, target: EndpointSettings) -> Arc<Self> {
        let router = Router::new(RouterSettings {
            listen,
            targets: vec![target],
        });
        Arc::new(Self { router })
    }

    pub async fn start(&self) -> BerlinkResult<()> {
        self.router.clone().start().await
    }

    pub async fn close(&self) -> BerlinkResult<()> {
        self.router.close().await
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.router.local_address()
    }

    /// Hook for client→server messages; return `false` to drop.
    pub fn set_client_message<F>(&self, hook: F)
    where
        F: Fn(&mut Message) -> bool + Send + Sync + 'static,
    {
        // the single target is always routed, so broadcast the one remote
        // to give the hook its mutate-or-drop semantics
        self.router
            .set_link_established(|link| link.set_broadcast(true));
        self.router.set_before_send(move |message, _index| hook(message));
    }

    /// Hook for server→client messages.
    pub fn set_server_message<F>(&self, hook: F)
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        self.router.set_server_message(hook);
    }

    /// The underlying router, for link access.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}
