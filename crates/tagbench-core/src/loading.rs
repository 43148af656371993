//! Eager-loading strategies over a whole tag batch.
//!
//! | strategy          | generic round trips                    | explicit round trips        |
//! |-------------------|----------------------------------------|-----------------------------|
//! | `Naive`           | 1 + per row (kind + target [+ extra])  | 1 + per row (target [+ extra]) |
//! | `SingleJoin`      | 1 + per row (target [+ extra])         | 1 [+ per `profile_b` extra] |
//! | `BatchedDeferred` | 2 + distinct kinds [+ 1 extras]        | 1 + distinct kinds [+ 1 extras] |
//!
//! `BatchedDeferred` always fetches extensions for the `profile_b` rows it
//! found, so resolution never touches the store again. The other strategies
//! load satellites that were not requested lazily, one point lookup per
//! `profile_b` row, so every strategy serializes to the same output.

use crate::reference::{Encoding, RefTarget, Reference};
use crate::registry::{KindRegistry, Satellite};
use crate::resolver::{LoadedContext, Resolved, Resolver};
use crate::serializer::{serialize, OutputRecord};
use crate::{TagError, TagResult};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tagbench_store::{
    Entity, EntityId, ExplicitTag, GenericTag, Kind, KindId, KindRow, ProfileA, ProfileB,
    ProfileBExtra, ProfileC, ProfileD, Store, StoreResult,
};

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Resolve each row on its own.
    Naive,
    /// Join shared metadata into the tag read, then resolve per row.
    SingleJoin,
    /// Collect every target, fetch grouped per kind, resolve from memory.
    BatchedDeferred,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Naive,
        Strategy::SingleJoin,
        Strategy::BatchedDeferred,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::SingleJoin => "single_join",
            Strategy::BatchedDeferred => "batched_deferred",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive" => Ok(Strategy::Naive),
            "single_join" => Ok(Strategy::SingleJoin),
            "batched_deferred" | "batched" => Ok(Strategy::BatchedDeferred),
            other => Err(format!(
                "unknown strategy '{other}' (expected naive|single_join|batched_deferred)"
            )),
        }
    }
}

/// A request to eager-load a satellite relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteRequest {
    /// Load on every resolved row; faults on the first kind that lacks it.
    Everywhere(Satellite),
    /// Load only on rows of one kind.
    OnKind(Kind, Satellite),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub strategy: Strategy,
    #[serde(default)]
    pub satellites: Vec<SatelliteRequest>,
}

impl LoadPlan {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            satellites: Vec::new(),
        }
    }

    pub fn with_satellite(mut self, request: SatelliteRequest) -> Self {
        self.satellites.push(request);
        self
    }

    /// Reject kind-scoped requests for relations the kind does not declare.
    pub fn validate(&self, registry: &KindRegistry) -> TagResult<()> {
        for request in &self.satellites {
            if let SatelliteRequest::OnKind(kind, relation) = *request {
                if !registry.declares(kind, relation) {
                    return Err(TagError::MissingSatelliteRelation { relation, kind });
                }
            }
        }
        Ok(())
    }

    /// Whether rows of `kind` should eager-load `satellite`.
    ///
    /// Fails when an `Everywhere` request names a relation `kind` lacks.
    pub fn wants(
        &self,
        registry: &KindRegistry,
        kind: Kind,
        satellite: Satellite,
    ) -> TagResult<bool> {
        let mut wanted = false;
        for request in &self.satellites {
            match *request {
                SatelliteRequest::Everywhere(relation) => {
                    if !registry.declares(kind, relation) {
                        return Err(TagError::MissingSatelliteRelation { relation, kind });
                    }
                    wanted |= relation == satellite;
                }
                SatelliteRequest::OnKind(target, relation) => {
                    wanted |= target == kind && relation == satellite;
                }
            }
        }
        Ok(wanted)
    }

    /// Whether any request names `satellite`, regardless of kind.
    pub fn mentions(&self, satellite: Satellite) -> bool {
        self.satellites.iter().any(|request| match *request {
            SatelliteRequest::Everywhere(relation) | SatelliteRequest::OnKind(_, relation) => {
                relation == satellite
            }
        })
    }
}

// ============================================================================
// Preloaded batch index
// ============================================================================

/// In-memory index built by `BatchedDeferred` before any row is resolved.
#[derive(Debug, Default)]
pub struct Preloaded {
    kinds: AHashMap<KindId, KindRow>,
    entities: AHashMap<(Kind, EntityId), Entity>,
    /// Extensions of every fetched `profile_b`, keyed by profile id.
    extras: AHashMap<EntityId, ProfileBExtra>,
}

impl Preloaded {
    pub fn kind(&self, id: KindId) -> Option<&KindRow> {
        self.kinds.get(&id)
    }

    pub fn entity(&self, kind: Kind, id: EntityId) -> Option<&Entity> {
        self.entities.get(&(kind, id))
    }

    pub fn extra(&self, profile_b_id: EntityId) -> Option<&ProfileBExtra> {
        self.extras.get(&profile_b_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Fetch every target grouped by kind, then the extensions of every
    /// `profile_b` found. Satellite requests are checked for every touched
    /// kind before the first fetch.
    fn build(
        store: &Store,
        registry: &KindRegistry,
        plan: &LoadPlan,
        kinds: AHashMap<KindId, KindRow>,
        targets: BTreeMap<Kind, BTreeSet<EntityId>>,
        fetch_many: impl Fn(Kind, &[EntityId]) -> StoreResult<Vec<Entity>>,
    ) -> TagResult<Self> {
        for kind in targets.keys() {
            plan.wants(registry, *kind, Satellite::ExtraData)?;
        }

        let mut entities = AHashMap::new();
        for (kind, ids) in &targets {
            let ids: Vec<EntityId> = ids.iter().copied().collect();
            let fetched = fetch_many(*kind, &ids)?;
            tracing::debug!(%kind, requested = ids.len(), found = fetched.len(), "grouped fetch");
            for entity in fetched {
                entities.insert((entity.kind(), entity.id()), entity);
            }
        }

        let profile_b_ids: Vec<EntityId> = entities
            .keys()
            .filter(|(kind, _)| *kind == Kind::ProfileB)
            .map(|(_, id)| *id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let extras = store
            .extras_for(&profile_b_ids)?
            .into_iter()
            .map(|extra| (extra.profile_b_id, extra))
            .collect();

        Ok(Self {
            kinds,
            entities,
            extras,
        })
    }
}

fn fetch_many_static(store: &Store, kind: Kind, ids: &[EntityId]) -> StoreResult<Vec<Entity>> {
    Ok(match kind {
        Kind::ProfileA => collect(store.get_many::<ProfileA>(ids)?),
        Kind::ProfileB => collect(store.get_many::<ProfileB>(ids)?),
        Kind::ProfileC => collect(store.get_many::<ProfileC>(ids)?),
        Kind::ProfileD => collect(store.get_many::<ProfileD>(ids)?),
    })
}

fn collect<R: Into<Entity>>(rows: Vec<R>) -> Vec<Entity> {
    rows.into_iter().map(Into::into).collect()
}

/// Preload targets of a generic batch: one kind read, one grouped fetch per
/// registered kind present.
pub fn preload_generic(
    store: &Store,
    registry: &KindRegistry,
    plan: &LoadPlan,
    tags: &[GenericTag],
) -> TagResult<Preloaded> {
    let kind_ids: Vec<KindId> = tags
        .iter()
        .map(|tag| tag.kind_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let kinds: AHashMap<KindId, KindRow> = store
        .kinds_by_ids(&kind_ids)?
        .into_iter()
        .map(|row| (row.id, row))
        .collect();

    let mut targets: BTreeMap<Kind, BTreeSet<EntityId>> = BTreeMap::new();
    for tag in tags {
        let entry = kinds
            .get(&tag.kind_id)
            .and_then(|row| registry.lookup(&row.model));
        if let Some(entry) = entry {
            targets.entry(entry.kind).or_default().insert(tag.entity_id);
        }
    }

    Preloaded::build(store, registry, plan, kinds, targets, |kind, ids| {
        match registry.entry(kind) {
            Some(entry) => (entry.fetch_many)(store, ids),
            None => Ok(Vec::new()),
        }
    })
}

/// Preload targets of an explicit batch: one grouped fetch per kind linked.
pub fn preload_explicit(
    store: &Store,
    registry: &KindRegistry,
    plan: &LoadPlan,
    tags: &[ExplicitTag],
) -> TagResult<Preloaded> {
    let mut targets: BTreeMap<Kind, BTreeSet<EntityId>> = BTreeMap::new();
    for tag in tags {
        if let RefTarget::Explicit { kind, entity_id } = tag.target() {
            targets.entry(kind).or_default().insert(entity_id);
        }
    }

    Preloaded::build(store, registry, plan, AHashMap::new(), targets, |kind, ids| {
        fetch_many_static(store, kind, ids)
    })
}

// ============================================================================
// Batch drivers
// ============================================================================

/// Read every generic tag and resolve it under `plan`.
pub fn resolve_generic_batch(
    store: &Store,
    registry: &KindRegistry,
    plan: &LoadPlan,
) -> TagResult<Vec<Resolved>> {
    plan.validate(registry)?;
    let resolver = Resolver::new(store, registry, plan);

    match plan.strategy {
        Strategy::Naive => {
            let tags = store.generic_tags()?;
            tracing::debug!(rows = tags.len(), strategy = %plan.strategy, "resolving generic batch");
            tags.iter()
                .map(|tag| resolver.resolve_generic(tag, LoadedContext::default()))
                .collect()
        }
        Strategy::SingleJoin => {
            let rows = store.generic_tags_with_kinds()?;
            tracing::debug!(rows = rows.len(), strategy = %plan.strategy, "resolving generic batch");
            rows.iter()
                .map(|(tag, kind)| {
                    resolver.resolve_generic(tag, LoadedContext::default().with_kind(kind))
                })
                .collect()
        }
        Strategy::BatchedDeferred => {
            let tags = store.generic_tags()?;
            let preloaded = preload_generic(store, registry, plan, &tags)?;
            tracing::debug!(
                rows = tags.len(),
                targets = preloaded.len(),
                strategy = %plan.strategy,
                "resolving generic batch"
            );
            tags.iter()
                .map(|tag| {
                    resolver.resolve_generic(tag, LoadedContext::default().with_preloaded(&preloaded))
                })
                .collect()
        }
    }
}

/// Read every explicit tag and resolve it under `plan`.
pub fn resolve_explicit_batch(
    store: &Store,
    registry: &KindRegistry,
    plan: &LoadPlan,
) -> TagResult<Vec<Resolved>> {
    plan.validate(registry)?;
    let resolver = Resolver::new(store, registry, plan);

    match plan.strategy {
        Strategy::Naive => {
            let tags = store.explicit_tags()?;
            tracing::debug!(rows = tags.len(), strategy = %plan.strategy, "resolving explicit batch");
            tags.iter()
                .map(|tag| resolver.resolve_explicit(tag, LoadedContext::default()))
                .collect()
        }
        Strategy::SingleJoin => {
            let rows = store.explicit_tags_joined(plan.mentions(Satellite::ExtraData))?;
            tracing::debug!(rows = rows.len(), strategy = %plan.strategy, "resolving explicit batch");
            rows.iter()
                .map(|row| {
                    resolver.resolve_explicit(&row.tag, LoadedContext::default().with_joined(row))
                })
                .collect()
        }
        Strategy::BatchedDeferred => {
            let tags = store.explicit_tags()?;
            let preloaded = preload_explicit(store, registry, plan, &tags)?;
            tracing::debug!(
                rows = tags.len(),
                targets = preloaded.len(),
                strategy = %plan.strategy,
                "resolving explicit batch"
            );
            tags.iter()
                .map(|tag| {
                    resolver.resolve_explicit(tag, LoadedContext::default().with_preloaded(&preloaded))
                })
                .collect()
        }
    }
}

pub fn resolve_batch(
    store: &Store,
    registry: &KindRegistry,
    encoding: Encoding,
    plan: &LoadPlan,
) -> TagResult<Vec<Resolved>> {
    match encoding {
        Encoding::Generic => resolve_generic_batch(store, registry, plan),
        Encoding::Explicit => resolve_explicit_batch(store, registry, plan),
    }
}

/// Resolve and serialize a whole batch.
pub fn serialize_batch(
    store: &Store,
    registry: &KindRegistry,
    encoding: Encoding,
    plan: &LoadPlan,
) -> TagResult<Vec<OutputRecord>> {
    Ok(resolve_batch(store, registry, encoding, plan)?
        .iter()
        .map(serialize)
        .collect())
}
