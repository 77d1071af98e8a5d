/// Wire messages and topic naming for blackboard replication.
///
/// Two message types travel between blackboards:
///
/// - [`KeyAnnouncement`] on `<id>/keys`: the complete list of key names the
///   sender has registered, re-sent in full every time it changes
/// - [`ValueUpdate`] on `<id>/data/<key-name>`: one timestamped payload
///   produced by the key's serializer
///
/// # Protocol Design
///
/// Messages are bincode-encoded, so timestamps and payload bytes travel
/// bit-exact. The transport treats them as opaque bytes; only the topic
/// carries routing information.
use crate::error::{BlackboardError, BlackboardResult};
use crate::serializer::{RBytes, WBytes};
use crate::types::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Maximum encoded message size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Bytes a `ValueUpdate` adds around its payload (timestamp + length).
const VALUE_ENVELOPE_SIZE: usize = 16;

/// Largest serializer output that still fits in one message.
pub const MAX_PAYLOAD_SIZE: usize = MAX_MESSAGE_SIZE - VALUE_ENVELOPE_SIZE;

/// Topic on which blackboard `id` announces its keys.
pub fn keys_topic(id: &str) -> String {
    format!("{}/keys", id)
}

/// Topic on which blackboard `id` publishes values of `key_name`.
pub fn data_topic(id: &str, key_name: &str) -> String {
    format!("{}/data/{}", id, key_name)
}

/// Full snapshot of the key names known to a blackboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAnnouncement {
    /// Every registered key name, in registration order
    pub added_keys: Vec<String>,
}

impl KeyAnnouncement {
    pub fn new(added_keys: Vec<String>) -> Self {
        Self { added_keys }
    }
}

/// A single replicated value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueUpdate {
    /// When the value was observed
    pub timestamp: Timestamp,
    /// Serializer output
    pub data: Vec<u8>,
}

impl ValueUpdate {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            data: Vec::new(),
        }
    }
}

impl RBytes for ValueUpdate {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl WBytes for ValueUpdate {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn resize(&mut self, size: usize) -> bool {
        if size > MAX_PAYLOAD_SIZE {
            return false;
        }
        self.data.resize(size, 0);
        true
    }
}

/// Binary encoding shared by every wire message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Serialize message to bytes.
    fn to_bytes(&self) -> BlackboardResult<Vec<u8>> {
        let size = bincode::serialized_size(self)? as usize;
        if size > MAX_MESSAGE_SIZE {
            return Err(BlackboardError::Transport(format!(
                "Message too large: {} bytes (max: {})",
                size, MAX_MESSAGE_SIZE
            )));
        }
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize message from bytes.
    fn from_bytes(bytes: &[u8]) -> BlackboardResult<Self> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(BlackboardError::Transport(format!(
                "Message too large: {} bytes (max: {})",
                bytes.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(bincode::deserialize(bytes)?)
    }
}

impl WireMessage for KeyAnnouncement {}
impl WireMessage for ValueUpdate {}
