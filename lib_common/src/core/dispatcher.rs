//! # Fan-out Dispatcher
//!
//! The `Dispatcher` takes each newly discovered event and hands it to every
//! connected live client (e.g. a WebSocket session).
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: A published payload is wrapped in an `Arc` once.
//!     Every client receives a clone of the pointer, not of the data.
//!
//! 2.  **Never Block the Publisher**: Each client owns a bounded MPSC queue and
//!     publishing uses `try_send`. When a client's queue is full the new frame is
//!     dropped for that client only and counted. Other clients and the publisher
//!     are unaffected.
//!
//! 3.  **Explicit Detach**: A client is represented by a [`Subscription`]. Dropping
//!     it removes the client from the dispatcher. Clients whose receiving side is
//!     gone are also pruned on the next publish.
//!
//! 4.  **Ordering**: Frames reach each client in publish order. There is no replay
//!     for clients that attach later.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

/// Default per-client queue depth.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// # Client Handle
///
/// Internal record of one connected client.
struct ClientHandle<T> {
    /// Dispatcher-assigned id, unique for the process lifetime.
    id: u64,
    /// Free-form label for logs (e.g. the peer address).
    label: String,
    /// Sending half of the client's bounded queue.
    sender: mpsc::Sender<Arc<T>>,
    /// Frames dropped for this client because its queue was full.
    dropped: u64,
}

type ClientList<T> = Arc<Mutex<Vec<ClientHandle<T>>>>;

fn lock<T>(clients: &ClientList<T>) -> MutexGuard<'_, Vec<ClientHandle<T>>> {
    // The list is only ever pushed to or retained; a panic elsewhere cannot
    // leave it in a torn state.
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of one [`Dispatcher::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Clients whose queue accepted the frame.
    pub delivered: usize,
    /// Clients that were full and skipped.
    pub dropped: usize,
    /// Clients found disconnected and removed.
    pub removed: usize,
}

/// # Core Dispatcher
///
/// Manages registration, deregistration and broadcasting to all clients.
pub struct Dispatcher<T> {
    clients: ClientList<T>,
    buffer: usize,
    next_id: AtomicU64,
    dropped_total: AtomicU64,
}

impl<T> Dispatcher<T> {
    /// Creates a dispatcher whose clients each buffer up to `buffer` frames.
    ///
    /// A zero buffer is bumped to one.
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: Arc::new(Mutex::new(Vec::new())),
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// # Add Client
    ///
    /// Registers a new client and returns its [`Subscription`]. The client
    /// receives every frame published from now on until the subscription is
    /// dropped.
    pub fn add_client(&self, label: &str) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        lock(&self.clients).push(ClientHandle {
            id,
            label: label.to_string(),
            sender: tx,
            dropped: 0,
        });
        info!(client = id, label, "Client registered with dispatcher");

        Subscription {
            id,
            receiver: rx,
            clients: Arc::clone(&self.clients),
        }
    }

    /// # Publish
    ///
    /// Offers `payload` to every registered client without waiting.
    ///
    /// ## Logic:
    /// 1.  Wraps the payload in an `Arc` so every client shares one allocation.
    /// 2.  `try_send`s to each client in registration order.
    /// 3.  A full queue drops the frame for that client only.
    /// 4.  A closed queue means the client went away; it is removed via `retain`.
    pub fn publish(&self, payload: T) -> PublishReport {
        let frame = Arc::new(payload);
        let mut report = PublishReport::default();
        let mut clients = lock(&self.clients);

        clients.retain_mut(|client| match client.sender.try_send(Arc::clone(&frame)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                client.dropped += 1;
                report.dropped += 1;
                debug!(
                    client = client.id,
                    label = %client.label,
                    dropped = client.dropped,
                    "Client queue full, frame dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                info!(client = client.id, label = %client.label, "Client disconnected. Removing from dispatcher.");
                report.removed += 1;
                false
            }
        });

        if report.dropped > 0 {
            self.dropped_total.fetch_add(report.dropped as u64, Ordering::Relaxed);
        }
        report
    }

    /// Removes a specific client by its id. Unknown ids are ignored.
    pub fn remove_client(&self, id: u64) {
        remove_from(&self.clients, id);
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Frames dropped across all clients since startup.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

fn remove_from<T>(clients: &ClientList<T>, id: u64) {
    let mut clients = lock(clients);
    let before = clients.len();
    clients.retain(|c| c.id != id);
    if clients.len() != before {
        info!(client = id, "Client removed from dispatcher");
    }
}

/// # Subscription
///
/// The receiving end of one client's queue. Yields frames in publish order
/// and deregisters the client when dropped.
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::Receiver<Arc<T>>,
    clients: ClientList<T>,
}

impl<T> Subscription<T> {
    /// Dispatcher-assigned client id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next frame. `None` once the client has been removed and
    /// its queue drained.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        self.receiver.recv().await
    }

    /// Takes a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        remove_from(&self.clients, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(sub: &mut Subscription<T>) -> Vec<Arc<T>> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_every_client_gets_frames_in_order() {
        let dispatcher = Dispatcher::new(16);
        let mut a = dispatcher.add_client("a");
        let mut b = dispatcher.add_client("b");

        for n in 1..=3 {
            let report = dispatcher.publish(n);
            assert_eq!(report, PublishReport { delivered: 2, dropped: 0, removed: 0 });
        }

        for sub in [&mut a, &mut b] {
            let got: Vec<i32> = drain(sub).into_iter().map(|f| *f).collect();
            assert_eq!(got, vec![1, 2, 3]);
        }

        dispatcher.publish(4);
        assert_eq!(a.recv().await.as_deref(), Some(&4));
    }

    #[test]
    fn test_clients_share_one_allocation() {
        let dispatcher = Dispatcher::new(4);
        let mut a = dispatcher.add_client("a");
        let mut b = dispatcher.add_client("b");
        dispatcher.publish(String::from("kill"));

        let fa = a.try_recv().unwrap();
        let fb = b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&fa, &fb));
    }

    #[test]
    fn test_slow_client_drops_newest_without_affecting_others() {
        let dispatcher = Dispatcher::new(2);
        let mut slow = dispatcher.add_client("slow");
        let mut fast = dispatcher.add_client("fast");

        dispatcher.publish(1);
        dispatcher.publish(2);
        assert_eq!(drain(&mut fast).len(), 2);

        let report = dispatcher.publish(3);
        assert_eq!(report, PublishReport { delivered: 1, dropped: 1, removed: 0 });
        assert_eq!(dispatcher.dropped_total(), 1);

        let slow_got: Vec<i32> = drain(&mut slow).into_iter().map(|f| *f).collect();
        let fast_got: Vec<i32> = drain(&mut fast).into_iter().map(|f| *f).collect();
        assert_eq!(slow_got, vec![1, 2]);
        assert_eq!(fast_got, vec![3]);
    }

    #[test]
    fn test_dropping_subscription_detaches() {
        let dispatcher: Dispatcher<u8> = Dispatcher::new(4);
        let a = dispatcher.add_client("a");
        let _b = dispatcher.add_client("b");
        assert_eq!(dispatcher.client_count(), 2);

        drop(a);
        assert_eq!(dispatcher.client_count(), 1);
        assert_eq!(dispatcher.publish(1).delivered, 1);
    }

    #[test]
    fn test_remove_client_by_id() {
        let dispatcher: Dispatcher<u8> = Dispatcher::new(4);
        let mut a = dispatcher.add_client("a");
        dispatcher.remove_client(a.id());
        dispatcher.remove_client(999);

        assert_eq!(dispatcher.client_count(), 0);
        assert_eq!(dispatcher.publish(7), PublishReport::default());
        assert!(a.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recv_ends_after_removal() {
        let dispatcher = Dispatcher::new(4);
        let mut a = dispatcher.add_client("a");
        dispatcher.publish(5u8);
        dispatcher.remove_client(a.id());

        assert_eq!(a.recv().await.as_deref(), Some(&5));
        assert!(a.recv().await.is_none());
    }

    #[test]
    fn test_publish_without_clients_is_fine() {
        let dispatcher = Dispatcher::new(4);
        assert_eq!(dispatcher.publish("nobody"), PublishReport::default());
    }
}
