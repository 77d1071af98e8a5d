/// Transport abstraction between blackboards.
///
/// The blackboard does not move bytes itself. It publishes opaque payloads
/// on named topics and registers handlers for the topics it cares about.
/// Handlers never touch blackboard state directly: they decode and enqueue,
/// and the host drains the queues when it chooses to.
///
/// [`LocalBus`] is an in-process implementation that connects any number
/// of blackboards living in the same process. It is what the tests, the
/// benchmarks and `bbctl` run on.
use crate::error::BlackboardResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback receiving the raw payload of a message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Identifies one subscription on a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: String,
}

impl SubscriptionHandle {
    pub fn new(id: u64, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Publish/subscribe substrate.
pub trait Transport: Send + Sync {
    /// Fire-and-forget broadcast of `payload` on `topic`.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> BlackboardResult<()>;

    /// Register `handler` for every future message on `topic`.
    fn subscribe(&self, topic: &str, handler: MessageHandler)
    -> BlackboardResult<SubscriptionHandle>;

    /// Remove a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: &SubscriptionHandle);
}

/// In-process transport delivering messages synchronously to subscribers.
///
/// Topics match exactly. Messages published on a topic nobody listens to
/// are discarded, mirroring a real broker.
#[derive(Default)]
pub struct LocalBus {
    topics: DashMap<String, Vec<(u64, MessageHandler)>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning the bus ready to share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of handlers subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|subs| subs.len()).unwrap_or(0)
    }

    /// Topics with at least one subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .topics
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        topics.sort();
        topics
    }

    /// Messages published so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Handler invocations so far.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Transport for LocalBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> BlackboardResult<()> {
        self.published.fetch_add(1, Ordering::Relaxed);

        // Copy the handler list so no shard lock is held during delivery.
        let handlers: Vec<MessageHandler> = match self.topics.get(topic) {
            Some(subs) => subs.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
            None => {
                tracing::trace!("No subscribers on {}", topic);
                return Ok(());
            }
        };

        for handler in handlers {
            handler(&payload);
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> BlackboardResult<SubscriptionHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        tracing::trace!("Subscribed {} to {}", id, topic);
        Ok(SubscriptionHandle::new(id, topic))
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut subs) = self.topics.get_mut(handle.topic()) {
            subs.retain(|(id, _)| *id != handle.id());
        }
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("topics", &self.topics.len())
            .field("published", &self.published_count())
            .finish()
    }
}
