//! Kind registry: maps a generic discriminant to a typed fetcher and the
//! satellite relations the kind declares.
//!
//! The resolver never inspects runtime types. A discriminant either has an
//! entry here or the reference resolves to `Unknown`.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tagbench_store::{
    Entity, EntityId, EntityRecord, Kind, KindRow, ProfileA, ProfileB, ProfileC, ProfileD, Store,
    StoreResult, APP_LABEL,
};

/// An optional, exclusively owned record attached to one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Satellite {
    /// `profile_b` -> `profile_b_extra`
    ExtraData,
}

impl Satellite {
    pub const fn name(self) -> &'static str {
        match self {
            Satellite::ExtraData => "extra_data",
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type FetchOne = fn(&Store, EntityId) -> StoreResult<Option<Entity>>;
pub type FetchMany = fn(&Store, &[EntityId]) -> StoreResult<Vec<Entity>>;

fn fetch_one<R: EntityRecord>(store: &Store, id: EntityId) -> StoreResult<Option<Entity>> {
    Ok(store.get::<R>(id)?.map(R::into_entity))
}

fn fetch_many<R: EntityRecord>(store: &Store, ids: &[EntityId]) -> StoreResult<Vec<Entity>> {
    Ok(store
        .get_many::<R>(ids)?
        .into_iter()
        .map(R::into_entity)
        .collect())
}

/// Registry entry for one kind.
#[derive(Debug, Clone)]
pub struct KindEntry {
    pub kind: Kind,
    pub discriminant: String,
    /// Point lookup; rows decode through the kind's record type.
    pub fetch_one: FetchOne,
    /// Grouped lookup, one round trip.
    pub fetch_many: FetchMany,
    pub satellites: &'static [Satellite],
}

impl KindEntry {
    pub fn of<R: EntityRecord>(satellites: &'static [Satellite]) -> Self {
        Self {
            kind: R::KIND,
            discriminant: R::KIND.model().to_string(),
            fetch_one: fetch_one::<R>,
            fetch_many: fetch_many::<R>,
            satellites,
        }
    }

    pub fn declares(&self, satellite: Satellite) -> bool {
        self.satellites.contains(&satellite)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    entries: AHashMap<String, KindEntry>,
}

impl KindRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All four profile kinds; only `profile_b` declares `extra_data`.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(KindEntry::of::<ProfileA>(&[]));
        registry.register(KindEntry::of::<ProfileB>(&[Satellite::ExtraData]));
        registry.register(KindEntry::of::<ProfileC>(&[]));
        registry.register(KindEntry::of::<ProfileD>(&[]));
        registry
    }

    /// Add or replace an entry, returning the one it replaced.
    pub fn register(&mut self, entry: KindEntry) -> Option<KindEntry> {
        self.entries.insert(entry.discriminant.clone(), entry)
    }

    pub fn lookup(&self, discriminant: &str) -> Option<&KindEntry> {
        self.entries.get(discriminant)
    }

    pub fn entry(&self, kind: Kind) -> Option<&KindEntry> {
        self.entries.values().find(|entry| entry.kind == kind)
    }

    /// Whether `kind` declares `satellite`. Unregistered kinds declare nothing.
    pub fn declares(&self, kind: Kind, satellite: Satellite) -> bool {
        self.entry(kind).is_some_and(|entry| entry.declares(satellite))
    }

    /// Registered kinds in kind order.
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.entries.values().map(|entry| entry.kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        kinds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make sure every registered kind has a row in the store's `kinds` table.
    pub fn sync(&self, store: &Store) -> StoreResult<Vec<KindRow>> {
        self.kinds()
            .into_iter()
            .map(|kind| store.register_kind(APP_LABEL, kind.model()))
            .collect()
    }
}
