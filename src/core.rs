/// Core blackboard implementation.
///
/// This module provides the main user-facing API. A [`Blackboard`] owns the
/// key registry, one history buffer and trigger table per key, and the
/// synchronization state for every connected peer.
///
/// # Locking
///
/// All state lives behind a single reader-writer lock:
///
/// - `get_value` and the other read accessors take shared access
/// - `add_key` starts upgradable and only upgrades when the name is new
/// - `set_value`, `add_trigger` and inbound processing take exclusive
///   access for the buffer mutation only
///
/// Triggers and transport I/O always run after the lock is released, so a
/// trigger may call back into the blackboard freely.
use crate::config::BlackboardConfig;
use crate::error::{BlackboardError, BlackboardResult};
use crate::history::HistoryBuffer;
use crate::registry::KeyRegistry;
use crate::serializer::Serializer;
use crate::sync::{InboundAnnouncement, InboundValue, PeerConnection, SyncProtocol};
use crate::transport::{SubscriptionHandle, Transport};
use crate::triggers::{self, Trigger, TriggerTable};
use crate::types::{BlackboardStats, HistoryEntry, Key, Timestamp};
use crate::value::{Value, Variant};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Everything the blackboard keeps for one key.
#[derive(Default)]
struct KeySlot {
    buffer: HistoryBuffer,
    triggers: TriggerTable,
    serializer: Option<Arc<dyn Serializer>>,
    /// Value subscriptions established for this key, by peer id
    subscriptions: HashMap<String, SubscriptionHandle>,
}

impl KeySlot {
    fn new(serializer: Option<Arc<dyn Serializer>>, capacity: usize) -> Self {
        Self {
            buffer: HistoryBuffer::with_capacity(capacity),
            serializer,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct State {
    registry: KeyRegistry,
    /// Indexed by `Key`
    slots: Vec<KeySlot>,
    peers: HashMap<String, PeerConnection>,
}

impl State {
    fn slot(&self, key: Key) -> BlackboardResult<&KeySlot> {
        self.slots
            .get(key.0)
            .ok_or(BlackboardError::UnknownKey { key: key.0 })
    }

    fn slot_mut(&mut self, key: Key) -> BlackboardResult<&mut KeySlot> {
        self.slots
            .get_mut(key.0)
            .ok_or(BlackboardError::UnknownKey { key: key.0 })
    }

    /// Insert a write and collect what must happen once the lock is gone.
    fn insert(
        &mut self,
        key: Key,
        timestamp: Timestamp,
        value: Value,
    ) -> BlackboardResult<AfterWrite> {
        let name = self
            .registry
            .name(key)
            .ok_or(BlackboardError::UnknownKey { key: key.0 })?
            .to_string();
        let slot = self.slot_mut(key)?;

        let outbound = slot
            .serializer
            .clone()
            .map(|serializer| (name, serializer, value.clone()));
        slot.buffer.insert(timestamp, value);

        Ok(AfterWrite {
            key,
            timestamp,
            triggers: slot.triggers.snapshot(),
            outbound,
        })
    }
}

/// Work deferred until after the write lock is released.
struct AfterWrite {
    key: Key,
    timestamp: Timestamp,
    triggers: Vec<Trigger>,
    outbound: Option<(String, Arc<dyn Serializer>, Value)>,
}

/// A batch of writes applied under a single lock acquisition.
///
/// # Example
///
/// ```ignore
/// let update = Update::new()
///     .set(pose, 10.0, Pose::planar(1.0, 2.0, 0.0))
///     .set(battery, 10.0, 0.87);
/// blackboard.apply(update)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Update {
    writes: Vec<(Key, Timestamp, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a write to the batch.
    pub fn set(
        mut self,
        key: Key,
        timestamp: impl Into<Timestamp>,
        value: impl Into<Value>,
    ) -> Self {
        self.push(key, timestamp, value);
        self
    }

    /// Add a write to the batch in place.
    pub fn push(&mut self, key: Key, timestamp: impl Into<Timestamp>, value: impl Into<Value>) {
        self.writes.push((key, timestamp.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// A replicated, time-buffered key/value store.
///
/// Cloning is cheap (Arc internally); clones share the same state.
///
/// # Example
///
/// ```ignore
/// use blackboard::{Blackboard, BincodeSerializer, LocalBus};
/// use std::sync::Arc;
///
/// let bus = LocalBus::shared();
/// let robot1 = Blackboard::with_id("robot1", bus.clone());
/// let robot2 = Blackboard::with_id("robot2", bus.clone());
///
/// let pose1 = robot1.add_key_with("pose", Some(Arc::new(BincodeSerializer)), 100);
/// robot2.add_key_with("pose", Some(Arc::new(BincodeSerializer)), 100);
///
/// robot2.add_external("robot1")?;
/// robot1.announce_keys()?;
/// robot2.update_connections();
///
/// robot1.set_value(pose1, 1.0, 42i64)?;
/// robot2.update_values();
/// ```
#[derive(Clone)]
pub struct Blackboard {
    state: Arc<RwLock<State>>,
    sync: Arc<SyncProtocol>,
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Blackboard")
            .field("id", &self.sync.id())
            .field("keys", &state.registry.names())
            .field("peers", &state.peers.len())
            .finish()
    }
}

impl Blackboard {
    /// Create a blackboard with a generated id (`bb-xxxxxxxx`).
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let id = format!("bb-{}", &Uuid::new_v4().simple().to_string()[..8]);
        Self::with_id(id, transport)
    }

    /// Create a blackboard publishing under `id`.
    pub fn with_id(id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let sync = SyncProtocol::new(id, transport);
        tracing::debug!("Blackboard {} created", sync.id());
        Self {
            state: Arc::new(RwLock::new(State::default())),
            sync: Arc::new(sync),
        }
    }

    /// Build a blackboard from configuration: register the configured keys
    /// in order, then connect to the configured peers.
    pub fn from_config(
        config: &BlackboardConfig,
        transport: Arc<dyn Transport>,
    ) -> BlackboardResult<Self> {
        config.validate()?;

        let blackboard = match &config.id {
            Some(id) => Self::with_id(id.clone(), transport),
            None => Self::new(transport),
        };

        for key in &config.keys {
            let capacity = key.capacity.unwrap_or(config.default_capacity);
            blackboard.add_key_with(&key.name, key.serializer.build(), capacity);
        }

        for peer in &config.peers {
            blackboard.add_external(peer)?;
        }

        Ok(blackboard)
    }

    /// Identifier used as this blackboard's topic prefix.
    pub fn id(&self) -> &str {
        self.sync.id()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Keys
    // ─────────────────────────────────────────────────────────────────────

    /// Register a local-only, unbounded key.
    pub fn add_key(&self, name: &str) -> Key {
        self.add_key_with(name, None, 0)
    }

    /// Register a key with a serializer and a history capacity (0 = unbounded).
    ///
    /// Registering an existing name returns the existing key unchanged.
    /// Every new registration broadcasts the full key list to peers.
    pub fn add_key_with(
        &self,
        name: &str,
        serializer: Option<Arc<dyn Serializer>>,
        capacity: usize,
    ) -> Key {
        let (key, names) = {
            let guard = self.state.upgradable_read();
            if let Some(key) = guard.registry.find(name) {
                return key;
            }

            let mut state = RwLockUpgradableReadGuard::upgrade(guard);
            let (key, _) = state.registry.register(name);
            state.slots.push(KeySlot::new(serializer, capacity));
            tracing::debug!("{} registered '{}' as {}", self.id(), name, key);
            (key, state.registry.names().to_vec())
        };

        if let Err(e) = self.sync.announce(names) {
            tracing::warn!("{} failed to announce keys: {}", self.id(), e);
        }
        key
    }

    /// Look up a key by name. `None` means the name was never registered.
    pub fn find_key(&self, name: &str) -> Option<Key> {
        self.state.read().registry.find(name)
    }

    /// Name registered for `key`.
    pub fn key_name(&self, key: Key) -> Option<String> {
        self.state.read().registry.name(key).map(str::to_string)
    }

    /// All key names in registration order.
    pub fn key_names(&self) -> Vec<String> {
        self.state.read().registry.names().to_vec()
    }

    /// Number of registered keys.
    pub fn key_count(&self) -> usize {
        self.state.read().registry.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Triggers
    // ─────────────────────────────────────────────────────────────────────

    /// Register a callback fired after every local or replicated update of
    /// `key`. Triggers cannot be removed.
    pub fn add_trigger<F>(&self, key: Key, trigger: F) -> BlackboardResult<()>
    where
        F: Fn(&Blackboard, Key) + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        state.slot_mut(key)?.triggers.add(Arc::new(trigger));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Values
    // ─────────────────────────────────────────────────────────────────────

    /// Store a value observed at `timestamp`.
    ///
    /// The value is inserted under the write lock. Once the lock is
    /// released, triggers for `key` fire and, if the key has a serializer,
    /// the value is published to peers.
    pub fn set_value(
        &self,
        key: Key,
        timestamp: impl Into<Timestamp>,
        value: impl Into<Value>,
    ) -> BlackboardResult<()> {
        let after = self.state.write().insert(key, timestamp.into(), value.into())?;
        self.finish_write(after);
        Ok(())
    }

    /// Apply a batch of writes under one lock acquisition.
    ///
    /// Every key is checked before anything is written, so an unknown key
    /// leaves the blackboard untouched. Triggers and publications follow
    /// in batch order.
    pub fn apply(&self, update: Update) -> BlackboardResult<()> {
        let pending = {
            let mut state = self.state.write();
            for (key, _, _) in &update.writes {
                state.slot(*key)?;
            }
            update
                .writes
                .into_iter()
                .map(|(key, timestamp, value)| state.insert(key, timestamp, value))
                .collect::<BlackboardResult<Vec<_>>>()?
        };

        for after in pending {
            self.finish_write(after);
        }
        Ok(())
    }

    fn finish_write(&self, after: AfterWrite) {
        triggers::fire(&after.triggers, self, after.key);

        match after.outbound {
            Some((name, serializer, value)) => {
                if let Err(e) =
                    self.sync
                        .publish_value(&name, serializer.as_ref(), after.timestamp, &value)
                {
                    tracing::warn!("{} failed to publish '{}': {}", self.id(), name, e);
                }
            }
            None => tracing::trace!("{} has no serializer, not replicated", after.key),
        }
    }

    /// The value closest to `timestamp`, preferring the past.
    ///
    /// Returns the latest value at or before `timestamp`; if there is none,
    /// the earliest value after it; if the key has no history (or is not a
    /// key of this blackboard), `None`.
    pub fn get_value(&self, key: Key, timestamp: impl Into<Timestamp>) -> Option<Value> {
        let state = self.state.read();
        let slot = state.slots.get(key.0)?;
        slot.buffer
            .nearest(timestamp.into())
            .map(|entry| entry.value.clone())
    }

    /// Typed variant of [`get_value`](Self::get_value).
    ///
    /// Fails with `TypeMismatch` if the stored value is not a `T`.
    pub fn get_value_as<T: Variant>(
        &self,
        key: Key,
        timestamp: impl Into<Timestamp>,
    ) -> BlackboardResult<Option<T>> {
        self.get_value(key, timestamp)
            .map(|value| value.get::<T>().cloned())
            .transpose()
    }

    /// The most recent entry for `key`.
    pub fn latest(&self, key: Key) -> Option<HistoryEntry> {
        let state = self.state.read();
        state.slots.get(key.0)?.buffer.latest().cloned()
    }

    /// Every retained entry for `key`, oldest first.
    pub fn history(&self, key: Key) -> BlackboardResult<Vec<HistoryEntry>> {
        let state = self.state.read();
        Ok(state.slot(key)?.buffer.iter().cloned().collect())
    }

    /// Entries for `key` with `from <= timestamp <= to`, oldest first.
    pub fn get_range(
        &self,
        key: Key,
        from: impl Into<Timestamp>,
        to: impl Into<Timestamp>,
    ) -> BlackboardResult<Vec<HistoryEntry>> {
        let state = self.state.read();
        Ok(state
            .slot(key)?
            .buffer
            .range(from.into(), to.into())
            .cloned()
            .collect())
    }

    /// Number of retained entries for `key`.
    pub fn entry_count(&self, key: Key) -> usize {
        let state = self.state.read();
        state.slots.get(key.0).map(|s| s.buffer.len()).unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Synchronization
    // ─────────────────────────────────────────────────────────────────────

    /// Broadcast the full key list now.
    ///
    /// Keys are otherwise only announced when a new key is registered, so a
    /// peer that connects after the last registration learns nothing until
    /// the next one. Calling this closes that gap on demand.
    pub fn announce_keys(&self) -> BlackboardResult<()> {
        let names = self.key_names();
        self.sync.announce(names)
    }

    /// Start listening to the key announcements of blackboard `peer_id`.
    ///
    /// Returns `Ok(false)` if the peer is already connected (or is this
    /// blackboard itself).
    pub fn add_external(&self, peer_id: &str) -> BlackboardResult<bool> {
        if peer_id == self.id() {
            tracing::warn!("{} refusing to connect to itself", peer_id);
            return Ok(false);
        }
        if self.state.read().peers.contains_key(peer_id) {
            return Ok(false);
        }

        // Subscribe outside the lock, then re-check before recording.
        let handle = self.sync.subscribe_keys(peer_id)?;
        let mut state = self.state.write();
        if state.peers.contains_key(peer_id) {
            drop(state);
            self.sync.unsubscribe(&handle);
            return Ok(false);
        }
        state.peers.insert(
            peer_id.to_string(),
            PeerConnection {
                peer_id: peer_id.to_string(),
                keys_subscription: handle,
            },
        );
        tracing::debug!("{} connected to {}", self.id(), peer_id);
        Ok(true)
    }

    /// Drain the key-announcement queue.
    ///
    /// For every announced name that is also a local key, subscribe to the
    /// announcing peer's value stream for it (once). Names unknown locally
    /// are ignored. Returns the number of announcements processed.
    pub fn update_connections(&self) -> usize {
        let inbound = self.sync.take_announcements();
        let count = inbound.len();
        for InboundAnnouncement {
            peer_id,
            announcement,
        } in inbound
        {
            for name in &announcement.added_keys {
                self.link_value_stream(&peer_id, name);
            }
        }
        count
    }

    fn link_value_stream(&self, peer_id: &str, name: &str) {
        let key = {
            let state = self.state.read();
            let Some(key) = state.registry.find(name) else {
                tracing::trace!("{} ignoring unknown key '{}' from {}", self.id(), name, peer_id);
                return;
            };
            match state.slot(key) {
                Ok(slot) if !slot.subscriptions.contains_key(peer_id) => key,
                _ => return,
            }
        };

        let handle = match self.sync.subscribe_values(peer_id, key, name) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("{} failed to subscribe to {}/'{}': {}", self.id(), peer_id, name, e);
                return;
            }
        };

        let mut state = self.state.write();
        match state.slot_mut(key) {
            Ok(slot) if !slot.subscriptions.contains_key(peer_id) => {
                slot.subscriptions.insert(peer_id.to_string(), handle);
                tracing::debug!("{} subscribed to '{}' from {}", self.id(), name, peer_id);
            }
            _ => {
                drop(state);
                self.sync.unsubscribe(&handle);
            }
        }
    }

    /// Drain the value queue.
    ///
    /// Each payload is decoded with the key's serializer and inserted like a
    /// local write, then the key's triggers fire. Replicated values are not
    /// published again. Payloads for keys without a serializer, or that fail
    /// to decode, are dropped. Returns the number of payloads processed.
    pub fn update_values(&self) -> usize {
        let inbound = self.sync.take_values();
        let count = inbound.len();
        for msg in inbound {
            self.apply_remote(msg);
        }
        count
    }

    fn apply_remote(&self, msg: InboundValue) {
        let InboundValue {
            peer_id,
            key,
            update,
        } = msg;

        let serializer = {
            let state = self.state.read();
            state.slots.get(key.0).and_then(|slot| slot.serializer.clone())
        };
        let Some(serializer) = serializer else {
            tracing::warn!("No serializer for key {} (value from {} dropped)", key, peer_id);
            self.sync.record_dropped();
            return;
        };

        let value = match serializer.deserialize(&update) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "Failed to decode value for {} from {} with {}: {}",
                    key,
                    peer_id,
                    serializer.name(),
                    e
                );
                self.sync.record_dropped();
                return;
            }
        };

        let triggers = {
            let mut state = self.state.write();
            match state.slot_mut(key) {
                Ok(slot) => {
                    slot.buffer.insert(update.timestamp, value);
                    slot.triggers.snapshot()
                }
                Err(_) => return,
            }
        };
        tracing::trace!("{} applied {} from {} at {}", self.id(), key, peer_id, update.timestamp);
        triggers::fire(&triggers, self, key);
    }

    /// Ids of connected peers, sorted.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.state.read().peers.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Whether `add_external(peer_id)` has been called successfully.
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.state.read().peers.contains_key(peer_id)
    }

    /// Peers whose value stream for `key` is subscribed, sorted.
    pub fn value_subscriptions(&self, key: Key) -> Vec<String> {
        let state = self.state.read();
        let mut peers: Vec<String> = state
            .slots
            .get(key.0)
            .map(|slot| slot.subscriptions.keys().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    /// Snapshot of blackboard counters.
    pub fn stats(&self) -> BlackboardStats {
        let state = self.state.read();
        BlackboardStats {
            key_count: state.registry.len(),
            total_entries: state.slots.iter().map(|s| s.buffer.len()).sum(),
            peer_count: state.peers.len(),
            value_subscriptions: state.slots.iter().map(|s| s.subscriptions.len()).sum(),
            pending_announcements: self.sync.pending_announcements(),
            pending_values: self.sync.pending_values(),
            dropped_values: self.sync.dropped_values(),
        }
    }
}
