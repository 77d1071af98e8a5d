/// Blackboard configuration.
///
/// Configuration covers exactly three things: which keys exist (with their
/// serializer and history capacity), the default capacity, and which peers
/// to mirror. It can be built in code or loaded from JSON:
///
/// ```json
/// {
///   "id": "robot1",
///   "default_capacity": 100,
///   "peers": ["robot2", "robot3"],
///   "keys": [
///     { "name": "pose", "serializer": "bincode" },
///     { "name": "map", "capacity": 1, "serializer": "json" },
///     { "name": "debug" }
///   ]
/// }
/// ```
use crate::error::{BlackboardError, BlackboardResult};
use crate::serializer::{BincodeSerializer, JsonSerializer, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Which built-in codec a key replicates with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Local only; inbound values for the key are dropped
    #[default]
    None,
    Bincode,
    Json,
}

impl SerializerKind {
    /// Instantiate the codec.
    pub fn build(&self) -> Option<Arc<dyn Serializer>> {
        match self {
            SerializerKind::None => None,
            SerializerKind::Bincode => Some(Arc::new(BincodeSerializer)),
            SerializerKind::Json => Some(Arc::new(JsonSerializer)),
        }
    }
}

/// Configuration of a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    pub name: String,
    /// History capacity; falls back to the blackboard default
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub serializer: SerializerKind,
}

impl KeyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            serializer: SerializerKind::None,
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }
}

/// Configuration for a blackboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackboardConfig {
    /// Topic prefix; generated when absent.
    pub id: Option<String>,
    /// Capacity for keys without their own (0 = unbounded).
    pub default_capacity: usize,
    /// Peers to mirror.
    pub peers: Vec<String>,
    /// Keys to register, in order.
    pub keys: Vec<KeyConfig>,
}

impl BlackboardConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> BlackboardResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the blackboard id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the default history capacity.
    pub fn default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Add a peer to mirror.
    pub fn peer(mut self, peer_id: impl Into<String>) -> Self {
        self.peers.push(peer_id.into());
        self
    }

    /// Add a key.
    pub fn key(mut self, key: KeyConfig) -> Self {
        self.keys.push(key);
        self
    }

    /// Reject empty ids, empty key names and duplicate key names.
    pub fn validate(&self) -> BlackboardResult<()> {
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(BlackboardError::InvalidConfig {
                    reason: "id must not be empty".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for key in &self.keys {
            if key.name.is_empty() {
                return Err(BlackboardError::InvalidConfig {
                    reason: "key names must not be empty".to_string(),
                });
            }
            if !seen.insert(key.name.as_str()) {
                return Err(BlackboardError::InvalidConfig {
                    reason: format!("key '{}' configured twice", key.name),
                });
            }
        }

        if self.peers.iter().any(|p| p.is_empty()) {
            return Err(BlackboardError::InvalidConfig {
                reason: "peer ids must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_document() {
        let config = BlackboardConfig::from_json_str(
            r#"{
                "id": "robot1",
                "default_capacity": 100,
                "peers": ["robot2"],
                "keys": [
                    { "name": "pose", "serializer": "bincode" },
                    { "name": "map", "capacity": 1, "serializer": "json" },
                    { "name": "debug" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.id.as_deref(), Some("robot1"));
        assert_eq!(config.default_capacity, 100);
        assert_eq!(config.peers, vec!["robot2"]);
        assert_eq!(config.keys[0].serializer, SerializerKind::Bincode);
        assert_eq!(config.keys[1].capacity, Some(1));
        assert_eq!(config.keys[2].serializer, SerializerKind::None);
    }

    #[test]
    fn test_defaults() {
        let config = BlackboardConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BlackboardConfig::default());
        assert_eq!(config.default_capacity, 0);
    }

    #[test]
    fn test_builder() {
        let config = BlackboardConfig::new()
            .id("r1")
            .default_capacity(10)
            .peer("r2")
            .key(KeyConfig::new("pose").serializer(SerializerKind::Json).capacity(5));
        assert!(config.validate().is_ok());
        assert_eq!(config.keys[0].capacity, Some(5));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let config = BlackboardConfig::new()
            .key(KeyConfig::new("pose"))
            .key(KeyConfig::new("pose"));
        assert!(matches!(
            config.validate(),
            Err(BlackboardError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(BlackboardConfig::new().id("  ").validate().is_err());
        assert!(BlackboardConfig::new().peer("").validate().is_err());
    }

    #[test]
    fn test_unknown_serializer_rejected() {
        let result =
            BlackboardConfig::from_json_str(r#"{ "keys": [{ "name": "a", "serializer": "xml" }] }"#);
        assert!(matches!(result, Err(BlackboardError::Codec(_))));
    }

    #[test]
    fn test_serializer_kind_build() {
        assert!(SerializerKind::None.build().is_none());
        assert_eq!(SerializerKind::Bincode.build().unwrap().name(), "bincode");
        assert_eq!(SerializerKind::Json.build().unwrap().name(), "json");
    }
}
