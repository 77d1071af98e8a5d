/// Callbacks fired after a key is updated.
///
/// Triggers receive the blackboard and the key, not the value: a trigger
/// that wants the new value queries it back through the blackboard. The
/// table is append-only.
use crate::core::Blackboard;
use crate::types::Key;
use std::sync::Arc;

/// A registered update callback.
pub type Trigger = Arc<dyn Fn(&Blackboard, Key) + Send + Sync>;

#[derive(Clone, Default)]
pub struct TriggerTable {
    triggers: Vec<Trigger>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    /// Copy of the current trigger list, for firing outside the lock.
    pub fn snapshot(&self) -> Vec<Trigger> {
        self.triggers.clone()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl std::fmt::Debug for TriggerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerTable")
            .field("len", &self.triggers.len())
            .finish()
    }
}

/// Invoke every trigger in order.
pub(crate) fn fire(triggers: &[Trigger], blackboard: &Blackboard, key: Key) {
    for trigger in triggers {
        trigger(blackboard, key);
    }
}
