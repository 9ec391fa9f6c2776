use serde::Deserialize;

use super::{merge_opt, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: String,
    pub acct: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub note: Option<String>,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub followers_count: Option<u64>,
    pub following_count: Option<u64>,
    pub statuses_count: Option<u64>,
    pub moved_to_id: Option<String>,
}

impl Account {
    /// A record carrying only an id, for payloads that patch a few fields
    /// (mention references, follow count updates from the stream).
    pub fn partial(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Case-insensitive handle match, tolerating a leading `@`.
    pub fn matches_acct(&self, handle: &str) -> bool {
        let handle = handle.trim_start_matches('@');
        self.acct
            .as_deref()
            .is_some_and(|acct| acct.eq_ignore_ascii_case(handle))
    }
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.acct, newer.acct);
        merge_opt(&mut self.username, newer.username);
        merge_opt(&mut self.display_name, newer.display_name);
        merge_opt(&mut self.note, newer.note);
        merge_opt(&mut self.url, newer.url);
        merge_opt(&mut self.avatar, newer.avatar);
        merge_opt(&mut self.followers_count, newer.followers_count);
        merge_opt(&mut self.following_count, newer.following_count);
        merge_opt(&mut self.statuses_count, newer.statuses_count);
        merge_opt(&mut self.moved_to_id, newer.moved_to_id);
    }

    fn into_record(self) -> Record {
        Record::Account(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Account(account) => Some(account),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Account(account) => Some(account),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAccount {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) acct: Option<String>,
    #[serde(default)]
    pub(crate) username: Option<String>,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    #[serde(default)]
    pub(crate) note: Option<String>,
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) avatar: Option<String>,
    #[serde(default)]
    pub(crate) followers_count: Option<u64>,
    #[serde(default)]
    pub(crate) following_count: Option<u64>,
    #[serde(default)]
    pub(crate) statuses_count: Option<u64>,
    #[serde(default)]
    pub(crate) moved: Option<IdOrObject<RawAccount>>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawAccount =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("account id is empty".into()));
    }
    Ok(flatten(raw, sink))
}

pub(crate) fn flatten(raw: RawAccount, sink: &mut Extracted) -> String {
    let id = raw.id;
    if !sink.enter(EntityKind::Account, &id) {
        return id;
    }
    let moved_to_id = raw.moved.map(|m| resolve(m, sink));
    sink.push(Record::Account(Account {
        id: id.clone(),
        acct: raw.acct,
        username: raw.username,
        display_name: raw.display_name,
        note: raw.note,
        url: raw.url,
        avatar: raw.avatar,
        followers_count: raw.followers_count,
        following_count: raw.following_count,
        statuses_count: raw.statuses_count,
        moved_to_id,
    }));
    id
}

pub(crate) fn resolve(field: IdOrObject<RawAccount>, sink: &mut Extracted) -> String {
    match field {
        IdOrObject::Id(id) => id,
        IdOrObject::Object(raw) => flatten(*raw, sink),
    }
}
