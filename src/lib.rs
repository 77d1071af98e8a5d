//! # Blackboard - Shared, Replicated Observations
//!
//! A blackboard is a key/value store where every key keeps a bounded,
//! time-ordered history of values. Independent processes (robots, agents)
//! each own a local blackboard and mirror each other's keys through a
//! publish/subscribe transport, without talking to each other directly.
//!
//! - **Time-buffered** - every key keeps the last N timestamped values
//! - **Nearest-in-time reads** - ask for any time, get the closest value,
//!   preferring the past
//! - **Triggers** - callbacks fire after every local or replicated update
//! - **Eventually consistent mirroring** - peers announce their keys and
//!   stream values for the keys both sides know
//!
//! ## Quick Start
//!
//! ```ignore
//! use blackboard::prelude::*;
//! use std::sync::Arc;
//!
//! let bus = LocalBus::shared();
//! let robot1 = Blackboard::with_id("robot1", bus.clone());
//! let robot2 = Blackboard::with_id("robot2", bus.clone());
//!
//! // Both sides register the key they want to share.
//! let pose = robot1.add_key_with("pose", Some(Arc::new(BincodeSerializer)), 100);
//! let remote_pose = robot2.add_key_with("pose", Some(Arc::new(BincodeSerializer)), 100);
//!
//! // robot2 mirrors robot1; the next announcement links the "pose" stream.
//! robot2.add_external("robot1")?;
//! robot1.announce_keys()?;
//! robot2.update_connections();
//!
//! robot1.set_value(pose, 12.0, Pose::planar(1.0, 2.0, 0.0))?;
//! robot2.update_values();
//!
//! let seen = robot2.get_value_as::<Pose>(remote_pose, 12.5)?;
//! ```
//!
//! ## Architecture
//!
//! 1. **Blackboard** (`core`) - user-facing API and locking
//! 2. **History** (`history`, `registry`, `triggers`) - per-key state
//! 3. **Sync** (`sync`, `network`, `transport`) - announcements, value
//!    streams and the two inbound queues the host drains
//!
//! ## Draining
//!
//! Nothing runs in the background. Inbound messages are queued by the
//! transport and processed only when the host calls
//! [`Blackboard::update_connections`] (key announcements) and
//! [`Blackboard::update_values`] (value payloads), on whatever thread and
//! schedule it chooses.

// Internal modules
mod core;
mod error;
mod types;

pub mod config;
pub mod history;
pub mod network;
pub mod registry;
pub mod serializer;
pub mod sync;
pub mod transport;
pub mod triggers;
pub mod value;

// Public API exports
pub use crate::core::{Blackboard, Update};
pub use config::{BlackboardConfig, KeyConfig, SerializerKind};
pub use error::{BlackboardError, BlackboardResult};
pub use history::HistoryBuffer;
pub use network::{KeyAnnouncement, ValueUpdate};
pub use registry::KeyRegistry;
pub use serializer::{BincodeSerializer, JsonSerializer, RBytes, Serializer, TypedSerializer, WBytes};
pub use transport::{LocalBus, MessageHandler, SubscriptionHandle, Transport};
pub use triggers::{Trigger, TriggerTable};
pub use types::{BlackboardStats, HistoryEntry, Key, Timestamp};
pub use value::{Pose, Value, ValueKind, Variant};

/// Prelude module for convenient imports.
///
/// Import everything you need with:
/// ```ignore
/// use blackboard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{BlackboardConfig, KeyConfig, SerializerKind};
    pub use crate::core::{Blackboard, Update};
    pub use crate::error::{BlackboardError, BlackboardResult};
    pub use crate::serializer::{BincodeSerializer, JsonSerializer, Serializer, TypedSerializer};
    pub use crate::transport::{LocalBus, Transport};
    pub use crate::types::{HistoryEntry, Key, Timestamp};
    pub use crate::value::{Pose, Value, ValueKind, Variant};
}
