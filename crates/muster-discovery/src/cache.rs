//! Local read cache of registry membership

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use muster_api::ServiceInstance;
use parking_lot::RwLock;

/// Read-only lookup of live instances by service name.
pub trait InstanceResolver: Send + Sync {
    /// All cached instances of `name`, in stable order.
    fn resolve(&self, name: &str) -> Vec<ServiceInstance>;

    /// First cached instance of `name` in stable order.
    fn resolve_one(&self, name: &str) -> Option<ServiceInstance> {
        self.resolve(name).into_iter().next()
    }
}

#[derive(Default)]
struct Snapshot {
    by_name: HashMap<String, Vec<ServiceInstance>>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Membership grouped by name, replaced wholesale on every refresh.
///
/// Readers take a cheap clone of the current snapshot and never wait on a
/// refresh in progress.
#[derive(Default)]
pub struct InstanceCache {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with `instances`. Each name's instances are
    /// sorted by `(host, port)`.
    pub fn replace_all(&self, instances: Vec<ServiceInstance>) {
        let mut by_name: HashMap<String, Vec<ServiceInstance>> = HashMap::new();
        for instance in instances {
            by_name.entry(instance.name.clone()).or_default().push(instance);
        }
        for group in by_name.values_mut() {
            group.sort_by(|a, b| a.host.cmp(&b.host).then(a.port.cmp(&b.port)));
            group.dedup_by(|a, b| a.same_identity(b));
        }

        let snapshot = Arc::new(Snapshot {
            by_name,
            refreshed_at: Some(Utc::now()),
        });
        *self.snapshot.write() = snapshot;
    }

    /// True once at least one refresh has landed.
    pub fn is_fresh(&self) -> bool {
        self.snapshot.read().refreshed_at.is_some()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().refreshed_at
    }

    pub fn service_names(&self) -> Vec<String> {
        let snapshot = self.current();
        let mut names: Vec<String> = snapshot.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn instance_count(&self) -> usize {
        self.current().by_name.values().map(Vec::len).sum()
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }
}

impl InstanceResolver for InstanceCache {
    fn resolve(&self, name: &str) -> Vec<ServiceInstance> {
        self.current()
            .by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn resolve_one(&self, name: &str) -> Option<ServiceInstance> {
        self.current()
            .by_name
            .get(name)
            .and_then(|group| group.first().cloned())
    }
}
