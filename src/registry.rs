/// Bidirectional mapping between key names and dense handles.
///
/// Handles are allocated in registration order and never recycled, so a
/// handle doubles as an index into any per-key arena kept alongside the
/// registry.
use crate::types::Key;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    by_name: HashMap<String, Key>,
    /// Names indexed by handle
    names: Vec<String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, returning its handle and whether it was newly added.
    ///
    /// Registering a name twice returns the existing handle.
    pub fn register(&mut self, name: &str) -> (Key, bool) {
        if let Some(key) = self.by_name.get(name) {
            return (*key, false);
        }

        let key = Key(self.names.len());
        self.by_name.insert(name.to_string(), key);
        self.names.push(name.to_string());
        (key, true)
    }

    /// Look up the handle for `name`.
    pub fn find(&self, name: &str) -> Option<Key> {
        self.by_name.get(name).copied()
    }

    /// Name registered for `key`.
    pub fn name(&self, key: Key) -> Option<&str> {
        self.names.get(key.0).map(String::as_str)
    }

    /// All names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
