//! The two reference encodings.
//!
//! - **Generic**: `(kind_id, entity_id)`. Two columns per tag whatever the
//!   number of kinds; resolving it needs a dispatch through the
//!   [`KindRegistry`](crate::registry::KindRegistry).
//! - **Explicit**: one nullable link column per kind. Resolution is a plain
//!   left join or multi-key lookup, at the price of `kinds - 1` null columns
//!   per tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tagbench_store::{
    EntityId, ExplicitTag, GenericTag, Kind, KindId, KindRow, NewExplicitTag, NewGenericTag, TagId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Generic,
    Explicit,
}

impl Encoding {
    pub const ALL: [Encoding; 2] = [Encoding::Generic, Encoding::Explicit];

    pub const fn name(self) -> &'static str {
        match self {
            Encoding::Generic => "generic",
            Encoding::Explicit => "explicit",
        }
    }

    /// Reference columns stored per tag.
    pub const fn reference_columns(self) -> usize {
        match self {
            Encoding::Generic => 2,
            Encoding::Explicit => Kind::ALL.len(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" | "gfk" => Ok(Encoding::Generic),
            "explicit" => Ok(Encoding::Explicit),
            other => Err(format!("unknown encoding '{other}' (expected generic|explicit)")),
        }
    }
}

/// What a stored reference points at, before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTarget {
    /// Kind metadata row plus raw id; the target may not exist.
    Generic { kind_id: KindId, entity_id: EntityId },
    /// First populated link in kind order.
    Explicit { kind: Kind, entity_id: EntityId },
    Empty,
}

/// Common view over both encodings.
pub trait Reference {
    fn tag_id(&self) -> TagId;

    fn target(&self) -> RefTarget;

    fn is_set(&self) -> bool {
        !matches!(self.target(), RefTarget::Empty)
    }
}

impl Reference for GenericTag {
    fn tag_id(&self) -> TagId {
        self.id
    }

    fn target(&self) -> RefTarget {
        RefTarget::Generic {
            kind_id: self.kind_id,
            entity_id: self.entity_id,
        }
    }
}

impl Reference for ExplicitTag {
    fn tag_id(&self) -> TagId {
        self.id
    }

    fn target(&self) -> RefTarget {
        match self.links.first() {
            Some((kind, entity_id)) => RefTarget::Explicit { kind, entity_id },
            None => RefTarget::Empty,
        }
    }
}

/// Build a generic reference to `entity_id` of the kind described by `kind`.
pub fn generic(kind: &KindRow, entity_id: EntityId) -> NewGenericTag {
    NewGenericTag::pointing_at(kind, entity_id)
}

/// Build an explicit reference with only `kind`'s link populated.
pub fn explicit(kind: Kind, entity_id: EntityId) -> NewExplicitTag {
    NewExplicitTag::pointing_at(kind, entity_id)
}
