//! Turn one tag into a [`Resolved`] value.
//!
//! The resolver reads whatever the [`LoadedContext`] already holds (a joined
//! kind row, joined targets, or a preloaded batch index) and only goes to the
//! store for what is missing.

use crate::loading::{LoadPlan, Preloaded, Strategy};
use crate::registry::{KindRegistry, Satellite};
use crate::TagResult;
use tagbench_store::{
    Entity, EntityId, ExplicitTag, GenericTag, JoinedExplicitTag, Kind, KindRow, ProfileA,
    ProfileB, ProfileBExtra, ProfileC, ProfileD, Store, StoreResult, TagId,
};

/// Outcome of resolving one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Found(ResolvedEntity),
    /// Unregistered discriminant or missing target. Raw values are preserved.
    Unknown {
        tag_id: TagId,
        discriminant: String,
        entity_id: EntityId,
    },
    /// Explicit tag with no populated link.
    Empty { tag_id: TagId },
}

impl Resolved {
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Resolved::Found(found) => Some(found.entity.kind()),
            _ => None,
        }
    }
}

/// A resolved target plus its satellite, when the kind has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub entity: Entity,
    pub extra: Option<ProfileBExtra>,
}

/// Data the caller already loaded for this row.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadedContext<'a> {
    pub kind: Option<&'a KindRow>,
    pub joined: Option<&'a JoinedExplicitTag>,
    pub preloaded: Option<&'a Preloaded>,
}

impl<'a> LoadedContext<'a> {
    pub fn with_kind(mut self, kind: &'a KindRow) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_joined(mut self, joined: &'a JoinedExplicitTag) -> Self {
        self.joined = Some(joined);
        self
    }

    pub fn with_preloaded(mut self, preloaded: &'a Preloaded) -> Self {
        self.preloaded = Some(preloaded);
        self
    }
}

/// Statically dispatched point lookup, used by the explicit encoding.
pub(crate) fn fetch_kind(store: &Store, kind: Kind, id: EntityId) -> StoreResult<Option<Entity>> {
    Ok(match kind {
        Kind::ProfileA => store.get::<ProfileA>(id)?.map(Entity::from),
        Kind::ProfileB => store.get::<ProfileB>(id)?.map(Entity::from),
        Kind::ProfileC => store.get::<ProfileC>(id)?.map(Entity::from),
        Kind::ProfileD => store.get::<ProfileD>(id)?.map(Entity::from),
    })
}

pub struct Resolver<'a> {
    store: &'a Store,
    registry: &'a KindRegistry,
    plan: &'a LoadPlan,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a Store, registry: &'a KindRegistry, plan: &'a LoadPlan) -> Self {
        Self {
            store,
            registry,
            plan,
        }
    }

    pub fn resolve_generic(&self, tag: &GenericTag, ctx: LoadedContext<'_>) -> TagResult<Resolved> {
        let loaded_kind = ctx
            .kind
            .or_else(|| ctx.preloaded.and_then(|pre| pre.kind(tag.kind_id)));
        let fetched_kind;
        let kind_row = match loaded_kind {
            Some(row) => row,
            None => match self.store.kind(tag.kind_id)? {
                Some(row) => {
                    fetched_kind = row;
                    &fetched_kind
                }
                None => {
                    tracing::debug!(tag_id = tag.id, kind_id = tag.kind_id, "missing kind row");
                    return Ok(unknown(tag.id, &tag.kind_id.to_string(), tag.entity_id));
                }
            },
        };

        let Some(entry) = self.registry.lookup(&kind_row.model) else {
            tracing::debug!(
                tag_id = tag.id,
                discriminant = %kind_row.model,
                "unregistered discriminant"
            );
            return Ok(unknown(tag.id, &kind_row.model, tag.entity_id));
        };
        let wants_extra = self
            .plan
            .wants(self.registry, entry.kind, Satellite::ExtraData)?;

        let found = match ctx.preloaded {
            Some(pre) => pre.entity(entry.kind, tag.entity_id).cloned().map(|e| (e, None)),
            None if wants_extra
                && entry.kind == Kind::ProfileB
                && self.plan.strategy == Strategy::SingleJoin =>
            {
                self.store
                    .profile_b_with_extra(tag.entity_id)?
                    .map(|(profile, extra)| (Entity::from(profile), Some(extra)))
            }
            None => (entry.fetch_one)(self.store, tag.entity_id)?.map(|e| (e, None)),
        };

        match found {
            Some((entity, joined_extra)) => Ok(Resolved::Found(self.complete(
                entity,
                joined_extra,
                ctx,
            )?)),
            None => Ok(unknown(tag.id, &kind_row.model, tag.entity_id)),
        }
    }

    pub fn resolve_explicit(
        &self,
        tag: &ExplicitTag,
        ctx: LoadedContext<'_>,
    ) -> TagResult<Resolved> {
        let Some((kind, entity_id)) = tag.links.first() else {
            return Ok(Resolved::Empty { tag_id: tag.id });
        };
        // Validates satellite requests against this row's kind.
        self.plan.wants(self.registry, kind, Satellite::ExtraData)?;

        let found = if let Some(joined) = ctx.joined {
            joined
                .entity(kind)
                .cloned()
                .map(|entity| (entity, joined.extra.clone()))
        } else if let Some(pre) = ctx.preloaded {
            pre.entity(kind, entity_id).cloned().map(|e| (e, None))
        } else {
            fetch_kind(self.store, kind, entity_id)?.map(|e| (e, None))
        };

        match found {
            Some((entity, joined_extra)) => Ok(Resolved::Found(self.complete(
                entity,
                joined_extra,
                ctx,
            )?)),
            None => Ok(unknown(tag.id, kind.model(), entity_id)),
        }
    }

    /// Attach the satellite: joined value, then preloaded index, then a lazy
    /// point lookup. A preloaded batch never falls through to the store.
    fn complete(
        &self,
        entity: Entity,
        joined_extra: Option<Option<ProfileBExtra>>,
        ctx: LoadedContext<'_>,
    ) -> TagResult<ResolvedEntity> {
        if entity.kind() != Kind::ProfileB {
            return Ok(ResolvedEntity {
                entity,
                extra: None,
            });
        }

        let profile_id = entity.id();
        let extra = match (joined_extra, ctx.preloaded) {
            (Some(extra), _) => extra,
            (None, Some(pre)) => pre.extra(profile_id).cloned(),
            (None, None) => self.store.extra_for(profile_id)?,
        };
        Ok(ResolvedEntity { entity, extra })
    }
}

fn unknown(tag_id: TagId, discriminant: &str, entity_id: EntityId) -> Resolved {
    Resolved::Unknown {
        tag_id,
        discriminant: discriminant.to_string(),
        entity_id,
    }
}
