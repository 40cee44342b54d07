//! Name resolution.
//!
//! Records carry names in several places. Resolution walks a fixed chain:
//! the name stored on the object, then the name of a related record, then a
//! cleaned-up identifier. Every step can fail on its own; callers turn a
//! failed chain into a generic label instead of dropping the entity.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::trace;

use crate::entity::EntityRecord;
use crate::world::{LookupError, WorldQuery};

/// Failure to produce a name for a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No step of the chain yielded a usable name.
    #[error("record has no usable name")]
    NoName,
    /// The related-record lookup failed and nothing else was available.
    #[error("related name lookup failed: {0}")]
    Lookup(#[from] LookupError),
}

/// Memoised related-record names for the current area.
#[derive(Debug, Default)]
pub struct NameCache {
    names: RwLock<AHashMap<u32, String>>,
}

impl NameCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache ready for sharing.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Cached name for a record.
    #[must_use]
    pub fn get(&self, record: u32) -> Option<String> {
        self.names.read().get(&record).cloned()
    }

    /// Looks up a related name, consulting the cache first.
    pub fn lookup(&self, world: &dyn WorldQuery, record: u32) -> Result<String, LookupError> {
        if let Some(name) = self.get(record) {
            return Ok(name);
        }
        let name = world.related_name(record)?;
        self.names.write().insert(record, name.clone());
        Ok(name)
    }

    /// Number of cached names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    /// Drops every cached name.
    pub fn clear(&self) {
        self.names.write().clear();
    }
}

/// Resolves a record's name through the fallback chain.
pub fn resolve_name(
    record: &EntityRecord,
    world: &dyn WorldQuery,
    cache: &NameCache,
) -> Result<String, ResolveError> {
    if let Some(name) = record.display_name.as_deref().map(str::trim) {
        if !name.is_empty() {
            return Ok(name.to_owned());
        }
    }

    let mut lookup_error = None;
    if let Some(related) = record.related_record {
        match cache.lookup(world, related) {
            Ok(name) if !name.trim().is_empty() => return Ok(name.trim().to_owned()),
            Ok(_) => {},
            Err(e) => {
                trace!("Related name for {} failed: {e}", record.handle);
                lookup_error = Some(e);
            },
        }
    }

    if let Some(name) = humanize_identifier(&record.identifier) {
        return Ok(name);
    }

    Err(lookup_error.map_or(ResolveError::NoName, ResolveError::Lookup))
}

/// Turns `iron_ore_02` into `Iron ore`. Returns `None` when nothing readable
/// remains.
#[must_use]
pub fn humanize_identifier(identifier: &str) -> Option<String> {
    let words: Vec<&str> = identifier
        .split(['_', '-', ' ', '.'])
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .collect();
    if words.is_empty() {
        return None;
    }
    let joined = words.join(" ").to_lowercase();
    let mut chars = joined.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Generic label for an entry whose name could not be resolved.
#[must_use]
pub fn fallback_label(ordinal: usize) -> String {
    format!("Entry {ordinal}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ObjectClass, RecordKind};
    use crate::mock::MockWorld;
    use beacon_common::{EntityHandle, Vec3};

    fn record() -> EntityRecord {
        EntityRecord::new(
            EntityHandle::new(1, 0),
            ObjectClass::Items,
            RecordKind::Item,
            Vec3::ZERO,
        )
    }

    #[test]
    fn test_display_name_first() {
        let world = MockWorld::new();
        let mut r = record();
        r.display_name = Some("Lantern".into());
        r.identifier = "lamp_01".into();
        assert_eq!(resolve_name(&r, &world, &NameCache::new()).as_deref(), Ok("Lantern"));
    }

    #[test]
    fn test_related_lookup_is_cached() {
        let mut world = MockWorld::new();
        world.set_related_name(40, "Blacksmith");
        let cache = NameCache::new();
        let mut r = record();
        r.related_record = Some(40);

        assert_eq!(resolve_name(&r, &world, &cache).as_deref(), Ok("Blacksmith"));
        assert_eq!(cache.get(40).as_deref(), Some("Blacksmith"));
        assert_eq!(world.related_lookups(), 1);

        resolve_name(&r, &world, &cache).expect("cached");
        assert_eq!(world.related_lookups(), 1);
    }

    #[test]
    fn test_failed_lookup_falls_to_identifier() {
        let world = MockWorld::new();
        let mut r = record();
        r.related_record = Some(99);
        r.identifier = "iron_ore_02".into();
        assert_eq!(resolve_name(&r, &world, &NameCache::new()).as_deref(), Ok("Iron ore"));
    }

    #[test]
    fn test_exhausted_chain_is_error() {
        let world = MockWorld::new();
        let mut r = record();
        r.display_name = Some("   ".into());
        r.related_record = Some(7);
        r.identifier = "0042".into();
        assert!(matches!(
            resolve_name(&r, &world, &NameCache::new()),
            Err(ResolveError::Lookup(LookupError::MissingRecord(7)))
        ));

        r.related_record = None;
        assert_eq!(
            resolve_name(&r, &world, &NameCache::new()),
            Err(ResolveError::NoName)
        );
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize_identifier("GATE-north").as_deref(), Some("Gate north"));
        assert_eq!(humanize_identifier("___"), None);
        assert_eq!(fallback_label(3), "Entry 3");
    }
}
