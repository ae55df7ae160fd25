//! Tokio host for scout-core: drives the coordinator from a channel transport,
//! keeps the sync-device list, and publishes snapshots to the owner.

pub mod config;
pub mod devices;
pub mod driver;
pub mod transport;

pub use config::Config;
pub use devices::DeviceList;
pub use driver::{run_discovery, spawn_discovery, DiscoveryHandle, Snapshot};
pub use transport::{channel, RemoteEnd, TransportHandle};
