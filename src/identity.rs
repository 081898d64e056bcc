//! Legacy id -> destination id tables, one per entity kind.
//!
//! Entries are append-only: once a legacy id is mapped it is never replaced or
//! removed for the rest of the run. Iteration follows insertion order.
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::error::{MigrateError, Result};
use crate::model::EntityKind;

#[derive(Debug, Clone)]
pub struct IdentityMap {
    kind: EntityKind,
    entries: IndexMap<String, String>,
}

impl IdentityMap {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn record(&mut self, legacy_id: &str, new_id: &str) -> Result<()> {
        if self.entries.contains_key(legacy_id) {
            return Err(MigrateError::DuplicateLegacyId {
                kind: self.kind,
                legacy_id: legacy_id.to_string(),
            });
        }
        self.entries
            .insert(legacy_id.to_string(), new_id.to_string());
        Ok(())
    }

    pub fn resolve(&self, legacy_id: &str) -> Result<&str> {
        self.entries
            .get(legacy_id)
            .map(String::as_str)
            .ok_or_else(|| MigrateError::MappingNotFound {
                kind: self.kind,
                legacy_id: legacy_id.to_string(),
            })
    }

    pub fn contains(&self, legacy_id: &str) -> bool {
        self.entries.contains_key(legacy_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(legacy_id, new_id)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// All identity maps produced during one run.
#[derive(Debug, Default, Clone)]
pub struct IdentityRegistry {
    maps: HashMap<EntityKind, IdentityMap>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EntityKind, legacy_id: &str, new_id: &str) -> Result<()> {
        self.maps
            .entry(kind)
            .or_insert_with(|| IdentityMap::new(kind))
            .record(legacy_id, new_id)
    }

    pub fn resolve(&self, kind: EntityKind, legacy_id: &str) -> Result<&str> {
        match self.maps.get(&kind) {
            Some(map) => map.resolve(legacy_id),
            None => Err(MigrateError::MappingNotFound {
                kind,
                legacy_id: legacy_id.to_string(),
            }),
        }
    }

    /// Resolve an optional reference; `None` in, `None` out.
    pub fn resolve_opt(&self, kind: EntityKind, legacy_id: Option<&str>) -> Result<Option<String>> {
        legacy_id
            .map(|id| self.resolve(kind, id).map(str::to_string))
            .transpose()
    }

    pub fn contains(&self, kind: EntityKind, legacy_id: &str) -> bool {
        self.maps.get(&kind).is_some_and(|m| m.contains(legacy_id))
    }

    pub fn map(&self, kind: EntityKind) -> Option<&IdentityMap> {
        self.maps.get(&kind)
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.maps.get(&kind).map_or(0, IdentityMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_recorded_ids() {
        let mut reg = IdentityRegistry::new();
        reg.record(EntityKind::User, "u1", "auth-1").unwrap();
        assert_eq!(reg.resolve(EntityKind::User, "u1").unwrap(), "auth-1");
        assert!(matches!(
            reg.resolve(EntityKind::Project, "u1"),
            Err(MigrateError::MappingNotFound { kind: EntityKind::Project, .. })
        ));
    }

    #[test]
    fn entries_are_immutable_once_recorded() {
        let mut map = IdentityMap::new(EntityKind::Video);
        map.record("v1", "new-a").unwrap();
        let err = map.record("v1", "new-b").unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateLegacyId { .. }));
        assert_eq!(map.resolve("v1").unwrap(), "new-a");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let mut map = IdentityMap::new(EntityKind::Note);
        for (legacy, new) in [("z", "1"), ("a", "2"), ("m", "3")] {
            map.record(legacy, new).unwrap();
        }
        let order: Vec<&str> = map.iter().map(|(legacy, _)| legacy).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
    }

    #[test]
    fn resolve_opt_passes_none_through() {
        let reg = IdentityRegistry::new();
        assert_eq!(reg.resolve_opt(EntityKind::User, None).unwrap(), None);
        assert!(reg.resolve_opt(EntityKind::User, Some("ghost")).is_err());
    }
}
