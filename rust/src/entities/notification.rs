use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::account::{self, RawAccount};
use super::status::{self, RawStatus};
use super::{lenient_datetime, merge_opt, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

/// Notification categories the server emits. Unrecognized tags are kept
/// verbatim so newer server versions degrade to pass-through instead of
/// dropping the notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Follow,
    FollowRequest,
    Mention,
    Reblog,
    Favourite,
    Poll,
    Status,
    Update,
    EmojiReaction,
    Move,
    Other(String),
}

impl NotificationKind {
    pub(crate) fn from_wire(tag: &str) -> Self {
        match tag {
            "follow" => NotificationKind::Follow,
            "follow_request" => NotificationKind::FollowRequest,
            "mention" => NotificationKind::Mention,
            "reblog" => NotificationKind::Reblog,
            "favourite" => NotificationKind::Favourite,
            "poll" => NotificationKind::Poll,
            "status" => NotificationKind::Status,
            "update" => NotificationKind::Update,
            "emoji_reaction" | "pleroma:emoji_reaction" => NotificationKind::EmojiReaction,
            "move" => NotificationKind::Move,
            other => NotificationKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::FollowRequest => "follow_request",
            NotificationKind::Mention => "mention",
            NotificationKind::Reblog => "reblog",
            NotificationKind::Favourite => "favourite",
            NotificationKind::Poll => "poll",
            NotificationKind::Status => "status",
            NotificationKind::Update => "update",
            NotificationKind::EmojiReaction => "emoji_reaction",
            NotificationKind::Move => "move",
            NotificationKind::Other(tag) => tag,
        }
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        NotificationKind::Other(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub created_at: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
    pub status_id: Option<String>,
    pub target_id: Option<String>,
    pub emoji: Option<String>,
}

impl Entity for Notification {
    const KIND: EntityKind = EntityKind::Notification;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        self.kind = newer.kind;
        merge_opt(&mut self.created_at, newer.created_at);
        merge_opt(&mut self.account_id, newer.account_id);
        merge_opt(&mut self.status_id, newer.status_id);
        merge_opt(&mut self.target_id, newer.target_id);
        merge_opt(&mut self.emoji, newer.emoji);
    }

    fn into_record(self) -> Record {
        Record::Notification(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Notification(notification) => Some(notification),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Notification(notification) => Some(notification),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawNotification {
    pub(crate) id: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub(crate) created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) account: Option<IdOrObject<RawAccount>>,
    #[serde(default)]
    pub(crate) status: Option<IdOrObject<RawStatus>>,
    #[serde(default)]
    pub(crate) target: Option<IdOrObject<RawAccount>>,
    #[serde(default)]
    pub(crate) emoji: Option<String>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawNotification =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("notification id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::Notification, &id) {
        return Ok(id);
    }
    let account_id = raw.account.map(|a| account::resolve(a, sink));
    let status_id = raw.status.map(|s| status::resolve(s, sink));
    let target_id = raw.target.map(|t| account::resolve(t, sink));
    sink.push(Record::Notification(Notification {
        id: id.clone(),
        kind: NotificationKind::from_wire(&raw.kind),
        created_at: raw.created_at,
        account_id,
        status_id,
        target_id,
        emoji: raw.emoji,
    }));
    Ok(id)
}
