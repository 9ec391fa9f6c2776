use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{lenient_datetime, merge_opt, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poll {
    pub id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: Option<bool>,
    pub multiple: Option<bool>,
    pub votes_count: Option<u64>,
    pub voters_count: Option<u64>,
    pub voted: Option<bool>,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOption {
    pub title: String,
    pub votes_count: Option<u64>,
}

impl Entity for Poll {
    const KIND: EntityKind = EntityKind::Poll;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.expires_at, newer.expires_at);
        merge_opt(&mut self.expired, newer.expired);
        merge_opt(&mut self.multiple, newer.multiple);
        merge_opt(&mut self.votes_count, newer.votes_count);
        merge_opt(&mut self.voters_count, newer.voters_count);
        merge_opt(&mut self.voted, newer.voted);
        if !newer.options.is_empty() {
            self.options = newer.options;
        }
    }

    fn into_record(self) -> Record {
        Record::Poll(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Poll(poll) => Some(poll),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Poll(poll) => Some(poll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPoll {
    pub(crate) id: String,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub(crate) expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) expired: Option<bool>,
    #[serde(default)]
    pub(crate) multiple: Option<bool>,
    #[serde(default)]
    pub(crate) votes_count: Option<u64>,
    #[serde(default)]
    pub(crate) voters_count: Option<u64>,
    #[serde(default)]
    pub(crate) voted: Option<bool>,
    #[serde(default)]
    pub(crate) options: Vec<RawPollOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPollOption {
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) votes_count: Option<u64>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawPoll =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("poll id is empty".into()));
    }
    Ok(flatten(raw, sink))
}

pub(crate) fn flatten(raw: RawPoll, sink: &mut Extracted) -> String {
    let id = raw.id;
    if !sink.enter(EntityKind::Poll, &id) {
        return id;
    }
    sink.push(Record::Poll(Poll {
        id: id.clone(),
        expires_at: raw.expires_at,
        expired: raw.expired,
        multiple: raw.multiple,
        votes_count: raw.votes_count,
        voters_count: raw.voters_count,
        voted: raw.voted,
        options: raw
            .options
            .into_iter()
            .map(|o| PollOption {
                title: o.title,
                votes_count: o.votes_count,
            })
            .collect(),
    }));
    id
}

pub(crate) fn resolve(field: IdOrObject<RawPoll>, sink: &mut Extracted) -> String {
    match field {
        IdOrObject::Id(id) => id,
        IdOrObject::Object(raw) => flatten(*raw, sink),
    }
}
