//! Entity types, their wire payloads, and the normalized record forms the
//! store keeps. Records reference related entities by id only; the raw
//! nested payload shapes live beside each type together with the flatten
//! step that extracts the nested objects.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

pub(crate) mod account;
pub(crate) mod announcement;
pub(crate) mod chat;
pub(crate) mod conversation;
pub(crate) mod filter;
pub(crate) mod group;
pub(crate) mod marker;
pub(crate) mod notification;
pub(crate) mod poll;
pub(crate) mod relationship;
pub(crate) mod status;

pub use account::Account;
pub use announcement::{Announcement, AnnouncementReaction};
pub use chat::Chat;
pub use conversation::Conversation;
pub use filter::Filter;
pub use group::{Group, GroupRelationship};
pub use marker::Marker;
pub use notification::{Notification, NotificationKind};
pub use poll::{Poll, PollOption};
pub use relationship::Relationship;
pub use status::Status;

/// Closed set of entity types the store keeps a table for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Status,
    Relationship,
    Group,
    GroupRelationship,
    Poll,
    Notification,
    Conversation,
    Chat,
    Announcement,
    Marker,
    Filter,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Status => "status",
            EntityKind::Relationship => "relationship",
            EntityKind::Group => "group",
            EntityKind::GroupRelationship => "group_relationship",
            EntityKind::Poll => "poll",
            EntityKind::Notification => "notification",
            EntityKind::Conversation => "conversation",
            EntityKind::Chat => "chat",
            EntityKind::Announcement => "announcement",
            EntityKind::Marker => "marker",
            EntityKind::Filter => "filter",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized record. The variant always matches the table the record
/// is stored in; a record never embeds another record, only ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Account(Account),
    Status(Status),
    Relationship(Relationship),
    Group(Group),
    GroupRelationship(GroupRelationship),
    Poll(Poll),
    Notification(Notification),
    Conversation(Conversation),
    Chat(Chat),
    Announcement(Announcement),
    Marker(Marker),
    Filter(Filter),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Account(_) => EntityKind::Account,
            Record::Status(_) => EntityKind::Status,
            Record::Relationship(_) => EntityKind::Relationship,
            Record::Group(_) => EntityKind::Group,
            Record::GroupRelationship(_) => EntityKind::GroupRelationship,
            Record::Poll(_) => EntityKind::Poll,
            Record::Notification(_) => EntityKind::Notification,
            Record::Conversation(_) => EntityKind::Conversation,
            Record::Chat(_) => EntityKind::Chat,
            Record::Announcement(_) => EntityKind::Announcement,
            Record::Marker(_) => EntityKind::Marker,
            Record::Filter(_) => EntityKind::Filter,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Account(r) => &r.id,
            Record::Status(r) => &r.id,
            Record::Relationship(r) => &r.id,
            Record::Group(r) => &r.id,
            Record::GroupRelationship(r) => &r.id,
            Record::Poll(r) => &r.id,
            Record::Notification(r) => &r.id,
            Record::Conversation(r) => &r.id,
            Record::Chat(r) => &r.id,
            Record::Announcement(r) => &r.id,
            Record::Marker(r) => &r.id,
            Record::Filter(r) => &r.id,
        }
    }

    /// Field-set last-write-wins merge. Kinds always match because tables
    /// are keyed by kind; a mismatch falls back to replacement.
    pub(crate) fn merge_from(&mut self, newer: Record) {
        match (self, newer) {
            (Record::Account(cur), Record::Account(new)) => cur.merge_from(new),
            (Record::Status(cur), Record::Status(new)) => cur.merge_from(new),
            (Record::Relationship(cur), Record::Relationship(new)) => cur.merge_from(new),
            (Record::Group(cur), Record::Group(new)) => cur.merge_from(new),
            (Record::GroupRelationship(cur), Record::GroupRelationship(new)) => {
                cur.merge_from(new)
            }
            (Record::Poll(cur), Record::Poll(new)) => cur.merge_from(new),
            (Record::Notification(cur), Record::Notification(new)) => cur.merge_from(new),
            (Record::Conversation(cur), Record::Conversation(new)) => cur.merge_from(new),
            (Record::Chat(cur), Record::Chat(new)) => cur.merge_from(new),
            (Record::Announcement(cur), Record::Announcement(new)) => cur.merge_from(new),
            (Record::Marker(cur), Record::Marker(new)) => cur.merge_from(new),
            (Record::Filter(cur), Record::Filter(new)) => cur.merge_from(new),
            (cur, new) => *cur = new,
        }
    }
}

/// Implemented by every normalized record type. `merge_from` keeps the
/// previously-known value for any field the newer snapshot omits.
pub trait Entity: Sized + Clone {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn merge_from(&mut self, newer: Self);
    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;
    fn as_record_ref(record: &Record) -> Option<&Self>;
}

/// A relational field on the wire: either a bare id or a full nested object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum IdOrObject<T> {
    Id(String),
    Object(Box<T>),
}

pub(crate) fn merge_opt<T>(slot: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *slot = newer;
    }
}

/// Timestamps arrive in enough broken shapes that an unparseable value is
/// treated as absent rather than failing the whole payload.
pub(crate) fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}
