use serde::Deserialize;

use super::{merge_opt, Entity, EntityKind, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

/// Viewer-to-account relationship. The id is the other account's id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub following: Option<bool>,
    pub followed_by: Option<bool>,
    pub blocking: Option<bool>,
    pub blocked_by: Option<bool>,
    pub muting: Option<bool>,
    pub muting_notifications: Option<bool>,
    pub requested: Option<bool>,
    pub note: Option<String>,
}

impl Entity for Relationship {
    const KIND: EntityKind = EntityKind::Relationship;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.following, newer.following);
        merge_opt(&mut self.followed_by, newer.followed_by);
        merge_opt(&mut self.blocking, newer.blocking);
        merge_opt(&mut self.blocked_by, newer.blocked_by);
        merge_opt(&mut self.muting, newer.muting);
        merge_opt(&mut self.muting_notifications, newer.muting_notifications);
        merge_opt(&mut self.requested, newer.requested);
        merge_opt(&mut self.note, newer.note);
    }

    fn into_record(self) -> Record {
        Record::Relationship(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Relationship(relationship) => Some(relationship),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Relationship(relationship) => Some(relationship),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawRelationship {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) following: Option<bool>,
    #[serde(default)]
    pub(crate) followed_by: Option<bool>,
    #[serde(default)]
    pub(crate) blocking: Option<bool>,
    #[serde(default)]
    pub(crate) blocked_by: Option<bool>,
    #[serde(default)]
    pub(crate) muting: Option<bool>,
    #[serde(default)]
    pub(crate) muting_notifications: Option<bool>,
    #[serde(default)]
    pub(crate) requested: Option<bool>,
    #[serde(default)]
    pub(crate) note: Option<String>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawRelationship =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("relationship id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::Relationship, &id) {
        return Ok(id);
    }
    sink.push(Record::Relationship(Relationship {
        id: id.clone(),
        following: raw.following,
        followed_by: raw.followed_by,
        blocking: raw.blocking,
        blocked_by: raw.blocked_by,
        muting: raw.muting,
        muting_notifications: raw.muting_notifications,
        requested: raw.requested,
        note: raw.note,
    }));
    Ok(id)
}
