/// Cross-blackboard synchronization plumbing.
///
/// This module owns the two inbound queues and everything that touches the
/// transport:
///
/// - Key announcements from connected peers land in the announcement queue.
///   Draining it may create new value subscriptions.
/// - Value payloads from subscribed `(peer, key)` streams land in the value
///   queue. Draining it inserts into history buffers and fires triggers.
///
/// The queues are independent so a burst of values cannot starve key
/// discovery, or the other way round. Nothing here runs on its own thread:
/// transport handlers only decode and enqueue, and the host decides when to
/// drain (see `Blackboard::update_connections` / `update_values`).
use crate::error::BlackboardResult;
use crate::network::{KeyAnnouncement, ValueUpdate, WireMessage, data_topic, keys_topic};
use crate::serializer::Serializer;
use crate::transport::{MessageHandler, SubscriptionHandle, Transport};
use crate::types::{Key, Timestamp};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Link to one remote blackboard's key-announcement stream.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    /// Identifier of the remote blackboard
    pub peer_id: String,
    /// Subscription to `<peer_id>/keys`
    pub keys_subscription: SubscriptionHandle,
}

/// A key announcement received from a peer, waiting to be processed.
#[derive(Debug, Clone)]
pub struct InboundAnnouncement {
    pub peer_id: String,
    pub announcement: KeyAnnouncement,
}

/// A value payload received from a peer, waiting to be processed.
#[derive(Debug, Clone)]
pub struct InboundValue {
    pub peer_id: String,
    pub key: Key,
    pub update: ValueUpdate,
}

/// Sending side of an inbox, cloned into transport handlers.
struct InboxSender<T> {
    tx: UnboundedSender<T>,
    pending: Arc<AtomicUsize>,
}

impl<T> InboxSender<T> {
    fn send(&self, msg: T) {
        // Count before sending so a concurrent take never sees more
        // messages than the counter. Sending only fails once the receiver
        // is gone.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(msg).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct Inbox<T> {
    tx: UnboundedSender<T>,
    rx: Mutex<UnboundedReceiver<T>>,
    pending: Arc<AtomicUsize>,
}

impl<T> Inbox<T> {
    fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn sender(&self) -> InboxSender<T> {
        InboxSender {
            tx: self.tx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }

    /// Move every queued message out.
    fn take(&self) -> Vec<T> {
        let mut rx = self.rx.lock();
        let mut taken = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            taken.push(msg);
        }
        self.pending.fetch_sub(taken.len(), Ordering::SeqCst);
        taken
    }

    fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Transport-facing half of a blackboard.
pub struct SyncProtocol {
    id: String,
    transport: Arc<dyn Transport>,
    announcements: Inbox<InboundAnnouncement>,
    values: Inbox<InboundValue>,
    dropped_values: Arc<AtomicU64>,
}

impl SyncProtocol {
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: id.into(),
            transport,
            announcements: Inbox::new(),
            values: Inbox::new(),
            dropped_values: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Identifier used as this blackboard's topic prefix.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Broadcast the full list of key names on `<id>/keys`.
    pub fn announce(&self, names: Vec<String>) -> BlackboardResult<()> {
        let count = names.len();
        let bytes = KeyAnnouncement::new(names).to_bytes()?;
        self.transport.publish(&keys_topic(&self.id), bytes)?;
        tracing::trace!("{} announced {} keys", self.id, count);
        Ok(())
    }

    /// Serialize and publish a local write on `<id>/data/<key_name>`.
    pub fn publish_value(
        &self,
        key_name: &str,
        serializer: &dyn Serializer,
        timestamp: Timestamp,
        value: &Value,
    ) -> BlackboardResult<()> {
        let mut update = ValueUpdate::new(timestamp);
        serializer.serialize(value, &mut update)?;
        self.transport
            .publish(&data_topic(&self.id, key_name), update.to_bytes()?)
    }

    /// Subscribe to `<peer_id>/keys`, feeding the announcement queue.
    pub fn subscribe_keys(&self, peer_id: &str) -> BlackboardResult<SubscriptionHandle> {
        let tx = self.announcements.sender();
        let peer = peer_id.to_string();
        let handler: MessageHandler = Arc::new(move |bytes: &[u8]| {
            match KeyAnnouncement::from_bytes(bytes) {
                Ok(announcement) => {
                    tx.send(InboundAnnouncement {
                        peer_id: peer.clone(),
                        announcement,
                    });
                }
                Err(e) => tracing::warn!("Malformed key announcement from {}: {}", peer, e),
            }
        });
        self.transport.subscribe(&keys_topic(peer_id), handler)
    }

    /// Subscribe to `<peer_id>/data/<key_name>`, feeding the value queue.
    pub fn subscribe_values(
        &self,
        peer_id: &str,
        key: Key,
        key_name: &str,
    ) -> BlackboardResult<SubscriptionHandle> {
        let tx = self.values.sender();
        let dropped = Arc::clone(&self.dropped_values);
        let peer = peer_id.to_string();
        let name = key_name.to_string();
        let handler: MessageHandler = Arc::new(move |bytes: &[u8]| {
            match ValueUpdate::from_bytes(bytes) {
                Ok(update) => {
                    tx.send(InboundValue {
                        peer_id: peer.clone(),
                        key,
                        update,
                    });
                }
                Err(e) => {
                    tracing::warn!("Malformed value for '{}' from {}: {}", name, peer, e);
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        self.transport
            .subscribe(&data_topic(peer_id, key_name), handler)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.transport.unsubscribe(handle);
    }

    /// Every key announcement queued so far.
    pub fn take_announcements(&self) -> Vec<InboundAnnouncement> {
        self.announcements.take()
    }

    /// Every value payload queued so far.
    pub fn take_values(&self) -> Vec<InboundValue> {
        self.values.take()
    }

    pub fn pending_announcements(&self) -> usize {
        self.announcements.len()
    }

    pub fn pending_values(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_values.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound values dropped so far.
    pub fn dropped_values(&self) -> u64 {
        self.dropped_values.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SyncProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProtocol")
            .field("id", &self.id)
            .field("pending_announcements", &self.pending_announcements())
            .field("pending_values", &self.pending_values())
            .finish()
    }
}
