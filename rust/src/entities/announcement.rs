use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{lenient_datetime, merge_opt, Entity, EntityKind, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Announcement {
    pub id: String,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub read: Option<bool>,
    pub reactions: Vec<AnnouncementReaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementReaction {
    pub name: String,
    pub count: u64,
    pub me: Option<bool>,
}

impl Announcement {
    /// Replace one reaction tally, adding the entry when it is new.
    pub fn apply_reaction(&mut self, name: &str, count: u64) {
        match self.reactions.iter_mut().find(|r| r.name == name) {
            Some(reaction) => reaction.count = count,
            None => self.reactions.push(AnnouncementReaction {
                name: name.to_string(),
                count,
                me: None,
            }),
        }
    }
}

impl Entity for Announcement {
    const KIND: EntityKind = EntityKind::Announcement;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.content, newer.content);
        merge_opt(&mut self.published_at, newer.published_at);
        merge_opt(&mut self.read, newer.read);
        if !newer.reactions.is_empty() {
            self.reactions = newer.reactions;
        }
    }

    fn into_record(self) -> Record {
        Record::Announcement(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Announcement(announcement) => Some(announcement),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Announcement(announcement) => Some(announcement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAnnouncement {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub(crate) published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) read: Option<bool>,
    #[serde(default)]
    pub(crate) reactions: Vec<RawAnnouncementReaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAnnouncementReaction {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) count: u64,
    #[serde(default)]
    pub(crate) me: Option<bool>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawAnnouncement =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("announcement id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::Announcement, &id) {
        return Ok(id);
    }
    sink.push(Record::Announcement(Announcement {
        id: id.clone(),
        content: raw.content,
        published_at: raw.published_at,
        read: raw.read,
        reactions: raw
            .reactions
            .into_iter()
            .map(|r| AnnouncementReaction {
                name: r.name,
                count: r.count,
                me: r.me,
            })
            .collect(),
    }));
    Ok(id)
}
