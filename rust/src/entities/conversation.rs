use serde::Deserialize;

use super::account::{self, RawAccount};
use super::status::{self, RawStatus};
use super::{merge_opt, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub unread: Option<bool>,
    pub account_ids: Vec<String>,
    pub last_status_id: Option<String>,
}

impl Entity for Conversation {
    const KIND: EntityKind = EntityKind::Conversation;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.unread, newer.unread);
        if !newer.account_ids.is_empty() {
            self.account_ids = newer.account_ids;
        }
        merge_opt(&mut self.last_status_id, newer.last_status_id);
    }

    fn into_record(self) -> Record {
        Record::Conversation(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Conversation(conversation) => Some(conversation),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Conversation(conversation) => Some(conversation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawConversation {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) unread: Option<bool>,
    #[serde(default)]
    pub(crate) accounts: Vec<IdOrObject<RawAccount>>,
    #[serde(default)]
    pub(crate) last_status: Option<IdOrObject<RawStatus>>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawConversation =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("conversation id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::Conversation, &id) {
        return Ok(id);
    }
    let account_ids = raw
        .accounts
        .into_iter()
        .map(|a| account::resolve(a, sink))
        .collect();
    let last_status_id = raw.last_status.map(|s| status::resolve(s, sink));
    sink.push(Record::Conversation(Conversation {
        id: id.clone(),
        unread: raw.unread,
        account_ids,
        last_status_id,
    }));
    Ok(id)
}
