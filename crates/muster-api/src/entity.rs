// Replicated entity and the domain event envelope carried on the bus.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ENTITY_CREATED, ENTITY_DEACTIVATED, ENTITY_UPDATED};

/// Cached, read-only copy of an identity record owned by another service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedEntity {
    pub id: Uuid,
    #[serde(default, alias = "username")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default = "epoch")]
    pub last_updated_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ReplicatedEntity {
    pub fn new(id: Uuid, display_name: &str, email: &str) -> Self {
        Self {
            id,
            display_name: display_name.to_string(),
            email: email.to_string(),
            is_active: true,
            roles: BTreeSet::new(),
            last_updated_at: Utc::now(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated_at = at;
        self
    }

    /// Minimal inactive record for an id that was deactivated before it was
    /// ever seen.
    pub fn deactivated_placeholder(id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: String::new(),
            email: String::new(),
            is_active: false,
            roles: BTreeSet::new(),
            last_updated_at: at,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Entity change kinds and their routing keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityEventKind {
    Created,
    Updated,
    Deactivated,
}

impl EntityEventKind {
    pub const ALL: [EntityEventKind; 3] = [
        EntityEventKind::Created,
        EntityEventKind::Updated,
        EntityEventKind::Deactivated,
    ];

    pub fn routing_key(self) -> &'static str {
        match self {
            EntityEventKind::Created => ENTITY_CREATED,
            EntityEventKind::Updated => ENTITY_UPDATED,
            EntityEventKind::Deactivated => ENTITY_DEACTIVATED,
        }
    }

    /// `None` for routing keys this protocol does not know about.
    pub fn from_routing_key(key: &str) -> Option<Self> {
        match key {
            ENTITY_CREATED => Some(EntityEventKind::Created),
            ENTITY_UPDATED => Some(EntityEventKind::Updated),
            ENTITY_DEACTIVATED => Some(EntityEventKind::Deactivated),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.routing_key())
    }
}

/// Event envelope. `event_type` equals the routing key it was published on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: T,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Envelope with an undecoded payload, used to inspect `type` before
/// committing to a payload shape.
pub type RawDomainEvent = DomainEvent<serde_json::Value>;

impl<T> DomainEvent<T> {
    pub fn new(event_type: &str, payload: T) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

impl DomainEvent<ReplicatedEntity> {
    pub fn entity(kind: EntityEventKind, entity: ReplicatedEntity) -> Self {
        Self::new(kind.routing_key(), entity)
    }

    pub fn kind(&self) -> Option<EntityEventKind> {
        EntityEventKind::from_routing_key(&self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_accepts_username_alias_and_defaults() {
        let json = r#"{"id":"6f1c1f8e-5f39-4d7a-9d6c-3c8e6f0f6b11","username":"alice","isActive":true}"#;
        let entity: ReplicatedEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.display_name, "alice");
        assert!(entity.roles.is_empty());
        assert_eq!(entity.last_updated_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_roles_are_an_ordered_set() {
        let entity = ReplicatedEntity::new(Uuid::new_v4(), "bob", "bob@example.com")
            .with_roles(["recruiter", "admin", "recruiter"]);
        let roles: Vec<&str> = entity.roles.iter().map(String::as_str).collect();
        assert_eq!(roles, vec!["admin", "recruiter"]);
        assert!(entity.has_role("admin"));
    }

    #[test]
    fn test_kind_routing_keys() {
        for kind in EntityEventKind::ALL {
            assert_eq!(EntityEventKind::from_routing_key(kind.routing_key()), Some(kind));
        }
        assert_eq!(EntityEventKind::from_routing_key("entity.deleted"), None);
    }

    #[test]
    fn test_envelope_wire_format() {
        let entity = ReplicatedEntity::new(Uuid::new_v4(), "carol", "carol@example.com");
        let event = DomainEvent::entity(EntityEventKind::Deactivated, entity.clone());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "entity.deactivated");
        assert_eq!(value["payload"]["displayName"], "carol");

        let raw: RawDomainEvent = serde_json::from_value(value).unwrap();
        assert_eq!(raw.event_type, "entity.deactivated");
        let decoded: ReplicatedEntity = serde_json::from_value(raw.payload).unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn test_placeholder_is_inactive() {
        let id = Uuid::new_v4();
        let placeholder = ReplicatedEntity::deactivated_placeholder(id, Utc::now());
        assert_eq!(placeholder.id, id);
        assert!(!placeholder.is_active);
        assert!(placeholder.roles.is_empty());
    }
}
