//! Flat output records.

use crate::resolver::{Resolved, ResolvedEntity};
use crate::TagResult;
use serde::{Deserialize, Serialize};
use tagbench_store::{Entity, EntityId, TagId};

/// One serialized tag target. Field order is fixed, so serializing the same
/// value twice gives identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputRecord {
    ProfileA {
        id: EntityId,
        name: String,
        age: i64,
    },
    ProfileB {
        id: EntityId,
        name: String,
        email: String,
        extra_info: Option<String>,
    },
    ProfileC {
        id: EntityId,
        name: String,
        address: String,
    },
    ProfileD {
        id: EntityId,
        name: String,
        phone: String,
    },
    Unknown {
        id: TagId,
        raw_kind_discriminant: String,
        raw_entity_id: EntityId,
    },
    Empty {
        id: TagId,
        profile_a: Option<EntityId>,
        profile_b: Option<EntityId>,
        profile_c: Option<EntityId>,
        profile_d: Option<EntityId>,
    },
}

impl OutputRecord {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutputRecord::ProfileA { .. } => "profile_a",
            OutputRecord::ProfileB { .. } => "profile_b",
            OutputRecord::ProfileC { .. } => "profile_c",
            OutputRecord::ProfileD { .. } => "profile_d",
            OutputRecord::Unknown { .. } => "unknown",
            OutputRecord::Empty { .. } => "empty",
        }
    }

    pub fn to_json_bytes(&self) -> TagResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub fn serialize(resolved: &Resolved) -> OutputRecord {
    match resolved {
        Resolved::Found(found) => serialize_entity(found),
        Resolved::Unknown {
            tag_id,
            discriminant,
            entity_id,
        } => OutputRecord::Unknown {
            id: *tag_id,
            raw_kind_discriminant: discriminant.clone(),
            raw_entity_id: *entity_id,
        },
        Resolved::Empty { tag_id } => OutputRecord::Empty {
            id: *tag_id,
            profile_a: None,
            profile_b: None,
            profile_c: None,
            profile_d: None,
        },
    }
}

fn serialize_entity(found: &ResolvedEntity) -> OutputRecord {
    match &found.entity {
        Entity::ProfileA(p) => OutputRecord::ProfileA {
            id: p.id,
            name: p.name.clone(),
            age: p.age,
        },
        Entity::ProfileB(p) => OutputRecord::ProfileB {
            id: p.id,
            name: p.name.clone(),
            email: p.email.clone(),
            extra_info: found.extra.as_ref().map(|extra| extra.info.clone()),
        },
        Entity::ProfileC(p) => OutputRecord::ProfileC {
            id: p.id,
            name: p.name.clone(),
            address: p.address.clone(),
        },
        Entity::ProfileD(p) => OutputRecord::ProfileD {
            id: p.id,
            name: p.name.clone(),
            phone: p.phone.clone(),
        },
    }
}

pub fn serialize_all(resolved: &[Resolved]) -> Vec<OutputRecord> {
    resolved.iter().map(serialize).collect()
}

/// Serialize a whole batch as one JSON array.
pub fn to_json_bytes(records: &[OutputRecord]) -> TagResult<Vec<u8>> {
    Ok(serde_json::to_vec(records)?)
}
