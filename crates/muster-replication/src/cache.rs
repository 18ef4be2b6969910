//! Local entity cache
//!
//! Snapshot load swaps in a whole new map; events mutate single entries.
//! Both go through one `RwLock`, so readers see either the old or the new
//! snapshot, never a half-applied one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use muster_api::{EntityEventKind, ReplicatedEntity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an incoming record competes with the cached one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Discard records whose `last_updated_at` is strictly older than the cached one
    #[default]
    NewestWins,
    /// Last record to arrive wins
    ArrivalOrder,
}

/// Outcome of applying one record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    /// Older than what the cache holds; ignored
    Stale,
}

pub struct LocalEntityCache {
    entries: RwLock<HashMap<Uuid, ReplicatedEntity>>,
    policy: MergePolicy,
}

impl LocalEntityCache {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Replace the whole cache with `entities`.
    pub fn apply_snapshot(&self, entities: Vec<ReplicatedEntity>) -> usize {
        let replacement: HashMap<Uuid, ReplicatedEntity> =
            entities.into_iter().map(|e| (e.id, e)).collect();
        let count = replacement.len();
        *self.entries.write() = replacement;
        count
    }

    /// Upsert by id.
    pub fn upsert(&self, entity: ReplicatedEntity) -> Applied {
        let mut entries = self.entries.write();
        match entries.get_mut(&entity.id) {
            Some(existing) if self.is_stale(existing, entity.last_updated_at) => Applied::Stale,
            Some(existing) => {
                *existing = entity;
                Applied::Updated
            }
            None => {
                entries.insert(entity.id, entity);
                Applied::Inserted
            }
        }
    }

    /// Mark `id` inactive, keeping every other field. An unseen id gets a
    /// minimal inactive placeholder.
    pub fn deactivate(&self, id: Uuid, at: DateTime<Utc>) -> Applied {
        self.deactivate_entity(ReplicatedEntity::deactivated_placeholder(id, at))
    }

    /// Mark `entity.id` inactive. A cached record keeps its fields; an unseen
    /// id stores the incoming record itself, so a create event arriving later
    /// with an older timestamp loses nothing.
    pub fn deactivate_entity(&self, mut entity: ReplicatedEntity) -> Applied {
        let mut entries = self.entries.write();
        match entries.get_mut(&entity.id) {
            Some(existing) if self.is_stale(existing, entity.last_updated_at) => Applied::Stale,
            Some(existing) => {
                existing.is_active = false;
                existing.last_updated_at = existing.last_updated_at.max(entity.last_updated_at);
                Applied::Updated
            }
            None => {
                entity.is_active = false;
                entries.insert(entity.id, entity);
                Applied::Inserted
            }
        }
    }

    /// Apply one change event.
    pub fn apply_event(&self, kind: EntityEventKind, entity: ReplicatedEntity) -> Applied {
        match kind {
            EntityEventKind::Created | EntityEventKind::Updated => self.upsert(entity),
            EntityEventKind::Deactivated => self.deactivate_entity(entity),
        }
    }

    /// Upsert each record without clearing the cache. Returns how many were
    /// not stale.
    pub fn merge(&self, entities: Vec<ReplicatedEntity>) -> usize {
        entities
            .into_iter()
            .map(|entity| self.upsert(entity))
            .filter(|applied| *applied != Applied::Stale)
            .count()
    }

    pub fn get(&self, id: &Uuid) -> Option<ReplicatedEntity> {
        self.entries.read().get(id).cloned()
    }

    /// Copy of every cached entity.
    pub fn all(&self) -> Vec<ReplicatedEntity> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn is_stale(&self, existing: &ReplicatedEntity, incoming: DateTime<Utc>) -> bool {
        match self.policy {
            MergePolicy::NewestWins => incoming < existing.last_updated_at,
            MergePolicy::ArrivalOrder => false,
        }
    }
}

impl Default for LocalEntityCache {
    fn default() -> Self {
        Self::new(MergePolicy::default())
    }
}
