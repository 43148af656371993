//! Deterministic seed data.
//!
//! Every kind gets `per_kind` rows named after their index (`A0`, `B7`, ...),
//! every `profile_b` gets an extension reading `Extra info for B{i}` unless
//! it falls in the trailing `missing_extras`, and the tag batches reference
//! every seeded row exactly once, plus the optional edge-case rows.

use crate::config::BenchConfig;
use crate::reference::{self, Encoding};
use crate::registry::KindRegistry;
use crate::TagResult;
use std::collections::BTreeMap;
use tagbench_store::{
    EntityId, Kind, KindRow, NewExplicitTag, NewGenericTag, NewProfileA, NewProfileB,
    NewProfileBExtra, NewProfileC, NewProfileD, Store, APP_LABEL,
};

/// Model name of a kind that exists in the store but not in the registry.
pub const RETIRED_MODEL: &str = "retired_profile";

/// Offset added past the largest seeded id for dangling generic tags.
const DANGLING_OFFSET: EntityId = 1_000_000;

#[derive(Debug, Clone, Default)]
pub struct Seeded {
    pub kinds: BTreeMap<Kind, KindRow>,
    /// Present once unregistered references were requested.
    pub retired_kind: Option<KindRow>,
    pub ids: BTreeMap<Kind, Vec<EntityId>>,
    pub extras: usize,
}

impl Seeded {
    pub fn entities(&self) -> usize {
        self.ids.values().map(Vec::len).sum()
    }
}

/// Register kinds and bulk insert every profile and extension.
pub fn seed(store: &Store, registry: &KindRegistry, config: &BenchConfig) -> TagResult<Seeded> {
    let n = config.per_kind;
    let mut seeded = Seeded::default();

    for row in registry.sync(store)? {
        if let Some(kind) = Kind::from_model(&row.model) {
            seeded.kinds.insert(kind, row);
        }
    }
    if config.unregistered_refs > 0 {
        seeded.retired_kind = Some(store.register_kind(APP_LABEL, RETIRED_MODEL)?);
    }

    let a: Vec<_> = (0..n)
        .map(|i| NewProfileA {
            name: format!("A{i}"),
            age: i as i64,
        })
        .collect();
    let b: Vec<_> = (0..n)
        .map(|i| NewProfileB {
            name: format!("B{i}"),
            email: "fakemail@gmail.com".to_string(),
        })
        .collect();
    let c: Vec<_> = (0..n)
        .map(|i| NewProfileC {
            name: format!("C{i}"),
            address: "123 Main St".to_string(),
        })
        .collect();
    let d: Vec<_> = (0..n)
        .map(|i| NewProfileD {
            name: format!("D{i}"),
            phone: "123-456-7890".to_string(),
        })
        .collect();

    seeded.ids.insert(Kind::ProfileA, store.bulk_insert(&a)?);
    let b_ids = store.bulk_insert(&b)?;
    seeded.ids.insert(Kind::ProfileC, store.bulk_insert(&c)?);
    seeded.ids.insert(Kind::ProfileD, store.bulk_insert(&d)?);

    let with_extra = n.saturating_sub(config.missing_extras);
    let extras: Vec<_> = b_ids
        .iter()
        .take(with_extra)
        .enumerate()
        .map(|(i, id)| NewProfileBExtra {
            profile_b_id: *id,
            info: format!("Extra info for B{i}"),
        })
        .collect();
    seeded.extras = store.bulk_insert(&extras)?.len();
    seeded.ids.insert(Kind::ProfileB, b_ids);

    tracing::debug!(
        per_kind = n,
        extras = seeded.extras,
        "seeded entities"
    );
    Ok(seeded)
}

/// One generic tag per seeded entity, then dangling and unregistered ones.
pub fn generic_tag_batch(seeded: &Seeded, config: &BenchConfig) -> Vec<NewGenericTag> {
    let mut tags = Vec::new();
    for (kind, ids) in &seeded.ids {
        if let Some(row) = seeded.kinds.get(kind) {
            tags.extend(ids.iter().map(|id| reference::generic(row, *id)));
        }
    }

    let registered: Vec<&KindRow> = seeded.kinds.values().collect();
    let ceiling = seeded
        .ids
        .values()
        .flat_map(|ids| ids.iter().copied())
        .max()
        .unwrap_or(0);
    if !registered.is_empty() {
        for i in 0..config.dangling_refs {
            let row = registered[i % registered.len()];
            tags.push(reference::generic(row, ceiling + DANGLING_OFFSET + i as EntityId));
        }
    }

    if let Some(retired) = &seeded.retired_kind {
        for i in 0..config.unregistered_refs {
            tags.push(reference::generic(retired, i as EntityId + 1));
        }
    }
    tags
}

/// One explicit tag per seeded entity, then the empty ones.
pub fn explicit_tag_batch(seeded: &Seeded, config: &BenchConfig) -> Vec<NewExplicitTag> {
    let mut tags: Vec<NewExplicitTag> = seeded
        .ids
        .iter()
        .flat_map(|(kind, ids)| ids.iter().map(|id| reference::explicit(*kind, *id)))
        .collect();
    tags.extend((0..config.empty_explicit).map(|_| NewExplicitTag::empty()));
    tags
}

/// Insert the tag batch for `encoding`, returning the number of tags written.
pub fn insert_tags(
    store: &Store,
    seeded: &Seeded,
    config: &BenchConfig,
    encoding: Encoding,
) -> TagResult<usize> {
    let written = match encoding {
        Encoding::Generic => store.bulk_insert(&generic_tag_batch(seeded, config))?.len(),
        Encoding::Explicit => store.bulk_insert(&explicit_tag_batch(seeded, config))?.len(),
    };
    tracing::debug!(%encoding, tags = written, "inserted tags");
    Ok(written)
}
