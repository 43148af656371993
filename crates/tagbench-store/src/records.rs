//! Row types for every table in the store.
//!
//! Each persisted type implements [`Record`] (table name, selected columns and
//! a positional decoder). The four profile kinds additionally implement
//! [`EntityRecord`], which ties them to a [`Kind`]. Insertable rows implement
//! [`NewRecord`].

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a profile row.
pub type EntityId = i64;
/// Identity of a tag row (either encoding).
pub type TagId = i64;
/// Identity of a row in the `kinds` table.
pub type KindId = i64;

/// App label every built-in kind is registered under.
pub const APP_LABEL: &str = "tagging";

// ============================================================================
// Kinds
// ============================================================================

/// The fixed set of entity kinds a tag may point at.
///
/// Ordering follows declaration order, which is also the order explicit links
/// are checked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    ProfileA,
    ProfileB,
    ProfileC,
    ProfileD,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::ProfileA, Kind::ProfileB, Kind::ProfileC, Kind::ProfileD];

    /// Model name, used both as table name and as the generic discriminant.
    pub const fn model(self) -> &'static str {
        match self {
            Kind::ProfileA => "profile_a",
            Kind::ProfileB => "profile_b",
            Kind::ProfileC => "profile_c",
            Kind::ProfileD => "profile_d",
        }
    }

    pub fn from_model(model: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|kind| kind.model() == model)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model())
    }
}

// ============================================================================
// Record traits
// ============================================================================

/// A row type that can be selected from a single table.
pub trait Record: Sized {
    const TABLE: &'static str;
    /// Selected columns, in the order [`Record::decode`] reads them.
    const FIELDS: &'static [&'static str];

    /// Decode the row starting at column `at`.
    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self>;

    /// Decode a left-joined row; a NULL id at `at` means no match.
    fn decode_joined(row: &Row<'_>, at: usize) -> rusqlite::Result<Option<Self>> {
        match row.get::<_, Option<i64>>(at)? {
            Some(_) => Self::decode(row, at).map(Some),
            None => Ok(None),
        }
    }

    /// `alias.col, alias.col, ...` for use in joins.
    fn qualified_fields(alias: &str) -> String {
        Self::FIELDS
            .iter()
            .map(|field| format!("{alias}.{field}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A profile kind that tags may reference.
pub trait EntityRecord: Record {
    const KIND: Kind;

    fn into_entity(self) -> Entity;
}

/// A row that can be bulk inserted.
pub trait NewRecord {
    const TABLE: &'static str;
    const FIELDS: &'static [&'static str];

    /// Bound values, one per entry of `FIELDS`.
    fn values(&self) -> Vec<Value>;
}

fn nullable(id: Option<i64>) -> Value {
    id.map_or(Value::Null, Value::Integer)
}

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileA {
    pub id: EntityId,
    pub name: String,
    pub age: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileB {
    pub id: EntityId,
    pub name: String,
    pub email: String,
}

/// One-to-one satellite of [`ProfileB`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBExtra {
    pub id: i64,
    pub info: String,
    pub profile_b_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileC {
    pub id: EntityId,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileD {
    pub id: EntityId,
    pub name: String,
    pub phone: String,
}

impl Record for ProfileA {
    const TABLE: &'static str = "profile_a";
    const FIELDS: &'static [&'static str] = &["id", "name", "age"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            name: row.get(at + 1)?,
            age: row.get(at + 2)?,
        })
    }
}

impl Record for ProfileB {
    const TABLE: &'static str = "profile_b";
    const FIELDS: &'static [&'static str] = &["id", "name", "email"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            name: row.get(at + 1)?,
            email: row.get(at + 2)?,
        })
    }
}

impl Record for ProfileBExtra {
    const TABLE: &'static str = "profile_b_extra";
    const FIELDS: &'static [&'static str] = &["id", "info", "profile_b_id"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            info: row.get(at + 1)?,
            profile_b_id: row.get(at + 2)?,
        })
    }
}

impl Record for ProfileC {
    const TABLE: &'static str = "profile_c";
    const FIELDS: &'static [&'static str] = &["id", "name", "address"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            name: row.get(at + 1)?,
            address: row.get(at + 2)?,
        })
    }
}

impl Record for ProfileD {
    const TABLE: &'static str = "profile_d";
    const FIELDS: &'static [&'static str] = &["id", "name", "phone"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            name: row.get(at + 1)?,
            phone: row.get(at + 2)?,
        })
    }
}

macro_rules! entity_record {
    ($ty:ident, $kind:ident) => {
        impl EntityRecord for $ty {
            const KIND: Kind = Kind::$kind;

            fn into_entity(self) -> Entity {
                Entity::$kind(self)
            }
        }

        impl From<$ty> for Entity {
            fn from(record: $ty) -> Self {
                Entity::$kind(record)
            }
        }
    };
}

entity_record!(ProfileA, ProfileA);
entity_record!(ProfileB, ProfileB);
entity_record!(ProfileC, ProfileC);
entity_record!(ProfileD, ProfileD);

/// A loaded profile of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    ProfileA(ProfileA),
    ProfileB(ProfileB),
    ProfileC(ProfileC),
    ProfileD(ProfileD),
}

impl Entity {
    pub fn kind(&self) -> Kind {
        match self {
            Entity::ProfileA(_) => Kind::ProfileA,
            Entity::ProfileB(_) => Kind::ProfileB,
            Entity::ProfileC(_) => Kind::ProfileC,
            Entity::ProfileD(_) => Kind::ProfileD,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Entity::ProfileA(p) => p.id,
            Entity::ProfileB(p) => p.id,
            Entity::ProfileC(p) => p.id,
            Entity::ProfileD(p) => p.id,
        }
    }
}

// ============================================================================
// Kind metadata and tags
// ============================================================================

/// A row of the `kinds` table. `model` is the generic discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KindRow {
    pub id: KindId,
    pub app_label: String,
    pub model: String,
}

impl Record for KindRow {
    const TABLE: &'static str = "kinds";
    const FIELDS: &'static [&'static str] = &["id", "app_label", "model"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            app_label: row.get(at + 1)?,
            model: row.get(at + 2)?,
        })
    }
}

/// Generic reference: `(kind_id, entity_id)` with no integrity on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericTag {
    pub id: TagId,
    pub kind_id: KindId,
    pub entity_id: EntityId,
}

impl Record for GenericTag {
    const TABLE: &'static str = "tag_generic";
    const FIELDS: &'static [&'static str] = &["id", "kind_id", "entity_id"];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            kind_id: row.get(at + 1)?,
            entity_id: row.get(at + 2)?,
        })
    }
}

/// One nullable link per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Links {
    pub profile_a: Option<EntityId>,
    pub profile_b: Option<EntityId>,
    pub profile_c: Option<EntityId>,
    pub profile_d: Option<EntityId>,
}

impl Links {
    pub fn to(kind: Kind, id: EntityId) -> Self {
        let mut links = Self::default();
        links.set(kind, Some(id));
        links
    }

    pub fn get(&self, kind: Kind) -> Option<EntityId> {
        match kind {
            Kind::ProfileA => self.profile_a,
            Kind::ProfileB => self.profile_b,
            Kind::ProfileC => self.profile_c,
            Kind::ProfileD => self.profile_d,
        }
    }

    pub fn set(&mut self, kind: Kind, id: Option<EntityId>) {
        let slot = match kind {
            Kind::ProfileA => &mut self.profile_a,
            Kind::ProfileB => &mut self.profile_b,
            Kind::ProfileC => &mut self.profile_c,
            Kind::ProfileD => &mut self.profile_d,
        };
        *slot = id;
    }

    /// Links in fixed kind order.
    pub fn iter(&self) -> impl Iterator<Item = (Kind, Option<EntityId>)> + '_ {
        Kind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }

    /// First populated link in kind order.
    pub fn first(&self) -> Option<(Kind, EntityId)> {
        self.iter().find_map(|(kind, id)| id.map(|id| (kind, id)))
    }

    pub fn populated(&self) -> usize {
        self.iter().filter(|(_, id)| id.is_some()).count()
    }
}

/// Explicit reference: a tag row with four optional typed links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExplicitTag {
    pub id: TagId,
    pub links: Links,
}

impl Record for ExplicitTag {
    const TABLE: &'static str = "tag_explicit";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "profile_a_id",
        "profile_b_id",
        "profile_c_id",
        "profile_d_id",
    ];

    fn decode(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            links: Links {
                profile_a: row.get(at + 1)?,
                profile_b: row.get(at + 2)?,
                profile_c: row.get(at + 3)?,
                profile_d: row.get(at + 4)?,
            },
        })
    }
}

/// An explicit tag fetched together with its left-joined targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedExplicitTag {
    pub tag: ExplicitTag,
    /// Joined targets, at most one per kind.
    pub entities: Vec<Entity>,
    /// `None` when the extension table was not part of the join.
    pub extra: Option<Option<ProfileBExtra>>,
}

impl JoinedExplicitTag {
    pub fn entity(&self, kind: Kind) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.kind() == kind)
    }
}

// ============================================================================
// Insertable rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileA {
    pub name: String,
    pub age: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileB {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileBExtra {
    pub profile_b_id: EntityId,
    pub info: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileC {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileD {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewGenericTag {
    pub kind_id: KindId,
    pub entity_id: EntityId,
}

impl NewGenericTag {
    pub fn pointing_at(kind: &KindRow, entity_id: EntityId) -> Self {
        Self {
            kind_id: kind.id,
            entity_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewExplicitTag {
    pub links: Links,
}

impl NewExplicitTag {
    pub fn pointing_at(kind: Kind, entity_id: EntityId) -> Self {
        Self {
            links: Links::to(kind, entity_id),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl NewRecord for NewProfileA {
    const TABLE: &'static str = "profile_a";
    const FIELDS: &'static [&'static str] = &["name", "age"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone()), Value::Integer(self.age)]
    }
}

impl NewRecord for NewProfileB {
    const TABLE: &'static str = "profile_b";
    const FIELDS: &'static [&'static str] = &["name", "email"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone()), Value::Text(self.email.clone())]
    }
}

impl NewRecord for NewProfileBExtra {
    const TABLE: &'static str = "profile_b_extra";
    const FIELDS: &'static [&'static str] = &["info", "profile_b_id"];

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.info.clone()),
            Value::Integer(self.profile_b_id),
        ]
    }
}

impl NewRecord for NewProfileC {
    const TABLE: &'static str = "profile_c";
    const FIELDS: &'static [&'static str] = &["name", "address"];

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.address.clone()),
        ]
    }
}

impl NewRecord for NewProfileD {
    const TABLE: &'static str = "profile_d";
    const FIELDS: &'static [&'static str] = &["name", "phone"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone()), Value::Text(self.phone.clone())]
    }
}

impl NewRecord for NewGenericTag {
    const TABLE: &'static str = "tag_generic";
    const FIELDS: &'static [&'static str] = &["kind_id", "entity_id"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.kind_id), Value::Integer(self.entity_id)]
    }
}

impl NewRecord for NewExplicitTag {
    const TABLE: &'static str = "tag_explicit";
    const FIELDS: &'static [&'static str] =
        &["profile_a_id", "profile_b_id", "profile_c_id", "profile_d_id"];

    fn values(&self) -> Vec<Value> {
        self.links.iter().map(|(_, id)| nullable(id)).collect()
    }
}
