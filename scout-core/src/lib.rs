//! Sync-peer discovery coordinator.
//! Host-driven: no I/O; host passes transport events and receives actions.

pub mod path;
pub mod protocol;

pub use coordinator::{Action, DeviceChange, DiscoveryConfig, DiscoveryCoordinator, DEFAULT_CAPABILITY};
pub use path::{Generation, ObjectPath, Tag};
pub use peer::{has_capability, PeerInfo};
pub use protocol::{Call, Event, PropertyMap, PropertyValue, RemoteError, Reply, Request, Scope, Signal};

mod context;
pub mod coordinator;
pub mod peer;
