use serde::Deserialize;

use super::account::{self, RawAccount};
use super::{merge_opt, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub id: String,
    pub display_name: Option<String>,
    pub note: Option<String>,
    pub avatar: Option<String>,
    pub members_count: Option<u64>,
    pub owner_id: Option<String>,
}

impl Entity for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.display_name, newer.display_name);
        merge_opt(&mut self.note, newer.note);
        merge_opt(&mut self.avatar, newer.avatar);
        merge_opt(&mut self.members_count, newer.members_count);
        merge_opt(&mut self.owner_id, newer.owner_id);
    }

    fn into_record(self) -> Record {
        Record::Group(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Group(group) => Some(group),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Group(group) => Some(group),
            _ => None,
        }
    }
}

/// Viewer-to-group relationship, keyed by group id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupRelationship {
    pub id: String,
    pub member: Option<bool>,
    pub requested: Option<bool>,
    pub role: Option<String>,
}

impl Entity for GroupRelationship {
    const KIND: EntityKind = EntityKind::GroupRelationship;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.member, newer.member);
        merge_opt(&mut self.requested, newer.requested);
        merge_opt(&mut self.role, newer.role);
    }

    fn into_record(self) -> Record {
        Record::GroupRelationship(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::GroupRelationship(rel) => Some(rel),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::GroupRelationship(rel) => Some(rel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawGroup {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    #[serde(default)]
    pub(crate) note: Option<String>,
    #[serde(default)]
    pub(crate) avatar: Option<String>,
    #[serde(default)]
    pub(crate) members_count: Option<u64>,
    #[serde(default)]
    pub(crate) owner: Option<IdOrObject<RawAccount>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawGroupRelationship {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) member: Option<bool>,
    #[serde(default)]
    pub(crate) requested: Option<bool>,
    #[serde(default)]
    pub(crate) role: Option<String>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawGroup =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("group id is empty".into()));
    }
    Ok(flatten(raw, sink))
}

pub(crate) fn flatten(raw: RawGroup, sink: &mut Extracted) -> String {
    let id = raw.id;
    if !sink.enter(EntityKind::Group, &id) {
        return id;
    }
    let owner_id = raw.owner.map(|o| account::resolve(o, sink));
    sink.push(Record::Group(Group {
        id: id.clone(),
        display_name: raw.display_name,
        note: raw.note,
        avatar: raw.avatar,
        members_count: raw.members_count,
        owner_id,
    }));
    id
}

pub(crate) fn parse_relationship(
    value: serde_json::Value,
    sink: &mut Extracted,
) -> Result<String, FetchError> {
    let raw: RawGroupRelationship =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("group relationship id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::GroupRelationship, &id) {
        return Ok(id);
    }
    sink.push(Record::GroupRelationship(GroupRelationship {
        id: id.clone(),
        member: raw.member,
        requested: raw.requested,
        role: raw.role,
    }));
    Ok(id)
}

pub(crate) fn resolve(field: IdOrObject<RawGroup>, sink: &mut Extracted) -> String {
    match field {
        IdOrObject::Id(id) => id,
        IdOrObject::Object(raw) => flatten(*raw, sink),
    }
}
