use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::account::{self, RawAccount};
use super::{lenient_datetime, merge_opt, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chat {
    pub id: String,
    pub account_id: Option<String>,
    pub unread: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_message_id: Option<String>,
}

impl Entity for Chat {
    const KIND: EntityKind = EntityKind::Chat;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.account_id, newer.account_id);
        merge_opt(&mut self.unread, newer.unread);
        merge_opt(&mut self.updated_at, newer.updated_at);
        merge_opt(&mut self.last_message_id, newer.last_message_id);
    }

    fn into_record(self) -> Record {
        Record::Chat(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Chat(chat) => Some(chat),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Chat(chat) => Some(chat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawChat {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) account: Option<IdOrObject<RawAccount>>,
    #[serde(default)]
    pub(crate) unread: Option<u64>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) last_message: Option<RawChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawChatMessage {
    pub(crate) id: String,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawChat =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("chat id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::Chat, &id) {
        return Ok(id);
    }
    let account_id = raw.account.map(|a| account::resolve(a, sink));
    sink.push(Record::Chat(Chat {
        id: id.clone(),
        account_id,
        unread: raw.unread,
        updated_at: raw.updated_at,
        last_message_id: raw.last_message.map(|m| m.id),
    }));
    Ok(id)
}
