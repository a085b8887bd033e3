//! A session: one connected stream plus a running receive loop.

use crate::events::SessionObserver;
use crate::transceiver::{ReceiveStatus, Transceiver};
use berlink_core::limits::POLL_INTERVAL;
use berlink_core::{BerlinkError, BerlinkResult};
use berlink_transport::BoxedStream;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One connected peer: a stream, a transceiver and the receive loop that
/// feeds observers.
///
/// The loop blocks only inside the stream's readiness poll, in
/// [`POLL_INTERVAL`] slices, so cancellation is observed promptly and
/// concurrent [`send`](Session::send)s interleave between slices.
/// Observer panics are caught and logged; they affect the offending
/// session only, never the whole endpoint.
pub struct Session<X: Transceiver> {
    id: u32,
    peer: Option<SocketAddr>,
    stream: Mutex<BoxedStream>,
    transceiver: Mutex<X>,
    observers: StdRwLock<Vec<Arc<dyn SessionObserver<X>>>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    closed: AtomicBool,
    loop_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl<X: Transceiver + 'static> fmt::Debug for Session<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<X: Transceiver + 'static> Session<X> {
    /// Wrap a connected stream. The receive loop starts on
    /// [`spawn`](Session::spawn).
    pub fn new(id: u32, stream: BoxedStream, transceiver: X, peer: Option<SocketAddr>) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self {
            id,
            peer,
            stream: Mutex::new(stream),
            transceiver: Mutex::new(transceiver),
            observers: StdRwLock::new(Vec::new()),
            cancel_tx,
            cancel_rx,
            closed: AtomicBool::new(false),
            loop_handle: StdMutex::new(None),
        })
    }

    /// Unique id within the owning endpoint.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Remote address, when known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Register an observer. Must happen before [`spawn`](Session::spawn)
    /// for the observer to see every packet.
    pub fn subscribe(&self, observer: Arc<dyn SessionObserver<X>>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Transmit one packet.
    pub async fn send(&self, packet: &mut X::Packet) -> BerlinkResult<()> {
        if self.is_closed() {
            return Err(BerlinkError::NotConnected);
        }
        // same lock order as the receive path: transceiver, then stream
        let mut transceiver = self.transceiver.lock().await;
        let mut stream = self.stream.lock().await;
        transceiver.transmit(&mut **stream, packet).await
    }

    /// Start the receive loop on its own task.
    pub fn spawn(self: Arc<Self>) {
        self.spawn_with_teardown(|_| {});
    }

    /// Start the receive loop; `teardown` runs once after the loop exits
    /// (endpoints use it to drop the session from their map).
    pub fn spawn_with_teardown<F>(self: Arc<Self>, teardown: F)
    where
        F: FnOnce(&Arc<Session<X>>) + Send + 'static,
    {
        let session = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            run(&session).await;
            teardown(&session);
        });
        *self
            .loop_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Cancel the loop, wait for it to exit and close the stream.
    pub async fn close(&self) -> BerlinkResult<()> {
        let _ = self.cancel_tx.send(true);
        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.closed.store(true, Ordering::SeqCst);
        let mut stream = self.stream.lock().await;
        stream.close().await
    }

    fn observers_snapshot(&self) -> Vec<Arc<dyn SessionObserver<X>>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

async fn run<X: Transceiver + 'static>(session: &Arc<Session<X>>) {
    log::debug!("session {}: receive loop started", session.id);
    loop {
        if *session.cancel_rx.borrow() {
            log::debug!("session {}: cancelled", session.id);
            break;
        }

        let available = {
            let mut stream = session.stream.lock().await;
            stream.wait_data_available(POLL_INTERVAL).await
        };
        let available = match available {
            Ok(available) => available,
            Err(BerlinkError::NotConnected) => break,
            Err(error) => {
                dispatch_exception(session, error);
                break;
            }
        };
        if !available {
            continue;
        }

        let outcome = {
            let mut transceiver = session.transceiver.lock().await;
            let mut stream = session.stream.lock().await;
            transceiver.receive(&mut **stream).await
        };
        match outcome {
            Ok((ReceiveStatus::OverAndOut, Some(packet))) => {
                let end_session = X::is_end_session(&packet);
                dispatch_message(session, &packet);
                if end_session {
                    log::debug!("session {}: end-session packet received", session.id);
                    break;
                }
            }
            Ok((ReceiveStatus::Over, _)) => {}
            Ok((ReceiveStatus::Fail, _)) | Ok((ReceiveStatus::OverAndOut, None)) => {
                log::debug!("session {}: peer disconnected", session.id);
                break;
            }
            Err(error) => {
                dispatch_exception(session, error);
                break;
            }
        }
    }
    session.closed.store(true, Ordering::SeqCst);
    dispatch_end(session);
    log::debug!("session {}: receive loop ended", session.id);
}

fn dispatch_message<X: Transceiver + 'static>(session: &Arc<Session<X>>, packet: &X::Packet) {
    for observer in session.observers_snapshot() {
        let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_message(session, packet)));
        if outcome.is_err() {
            log::error!("session {}: observer panicked in on_message", session.id);
        }
    }
}

fn dispatch_exception<X: Transceiver + 'static>(session: &Arc<Session<X>>, error: BerlinkError) {
    log::error!("session {}: {} ({error})", session.id, error.kind());
    let error = Arc::new(error);
    for observer in session.observers_snapshot() {
        let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_exception(session, &error)));
        if outcome.is_err() {
            log::error!("session {}: observer panicked in on_exception", session.id);
        }
    }
}

fn dispatch_end<X: Transceiver + 'static>(session: &Arc<Session<X>>) {
    for observer in session.observers_snapshot() {
        let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_end(session)));
        if outcome.is_err() {
            log::error!("session {}: observer panicked in on_end", session.id);
        }
    }
}
