//! Muster Replication - cached copies of entities owned by another service
//!
//! Consumer side:
//! - `LocalEntityCache`: id -> entity map with snapshot replace and event merge
//! - `SnapshotLoader`: `GET {base}/entities/snapshot[?since=]` with bounded retry
//! - `EntityEventSubscriber`: applies `entity.created/updated/deactivated`
//! - `ReplicationRuntime`: bootstrap (resolve, snapshot, subscribe) and readiness
//!
//! Owner side:
//! - `EntityPublisher`: publishes entity change events
//! - `snapshot_routes`: serves the snapshot endpoint from a `SnapshotSource`

pub mod cache;
pub mod error;
pub mod loader;
pub mod options;
pub mod publisher;
pub mod runtime;
pub mod snapshot;
pub mod subscriber;

pub use cache::{Applied, LocalEntityCache, MergePolicy};
pub use error::ReplicationError;
pub use loader::SnapshotLoader;
pub use options::ReplicationOptions;
pub use publisher::EntityPublisher;
pub use runtime::{BootstrapStatus, ReplicationRuntime};
pub use snapshot::{SnapshotSource, snapshot_routes};
pub use subscriber::EntityEventSubscriber;
