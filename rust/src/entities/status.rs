use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::account::{self, RawAccount};
use super::group::{self, RawGroup};
use super::poll::{self, RawPoll};
use super::{lenient_datetime, merge_opt, Account, Entity, EntityKind, IdOrObject, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

/// Normalized post. Author, reblog/quote targets, poll, group, and mentions
/// are kept as ids into their own tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub id: String,
    pub uri: Option<String>,
    pub content: Option<String>,
    pub spoiler_text: Option<String>,
    pub visibility: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
    pub reblog_id: Option<String>,
    pub quote_id: Option<String>,
    pub in_reply_to_id: Option<String>,
    pub poll_id: Option<String>,
    pub group_id: Option<String>,
    pub mention_ids: Vec<String>,
    pub replies_count: Option<u64>,
    pub reblogs_count: Option<u64>,
    pub favourites_count: Option<u64>,
    pub favourited: Option<bool>,
    pub reblogged: Option<bool>,
}

impl Entity for Status {
    const KIND: EntityKind = EntityKind::Status;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.uri, newer.uri);
        merge_opt(&mut self.content, newer.content);
        merge_opt(&mut self.spoiler_text, newer.spoiler_text);
        merge_opt(&mut self.visibility, newer.visibility);
        merge_opt(&mut self.created_at, newer.created_at);
        merge_opt(&mut self.account_id, newer.account_id);
        merge_opt(&mut self.reblog_id, newer.reblog_id);
        merge_opt(&mut self.quote_id, newer.quote_id);
        merge_opt(&mut self.in_reply_to_id, newer.in_reply_to_id);
        merge_opt(&mut self.poll_id, newer.poll_id);
        merge_opt(&mut self.group_id, newer.group_id);
        if !newer.mention_ids.is_empty() {
            self.mention_ids = newer.mention_ids;
        }
        merge_opt(&mut self.replies_count, newer.replies_count);
        merge_opt(&mut self.reblogs_count, newer.reblogs_count);
        merge_opt(&mut self.favourites_count, newer.favourites_count);
        merge_opt(&mut self.favourited, newer.favourited);
        merge_opt(&mut self.reblogged, newer.reblogged);
    }

    fn into_record(self) -> Record {
        Record::Status(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Status(status) => Some(status),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Status(status) => Some(status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawStatus {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) uri: Option<String>,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) spoiler_text: Option<String>,
    #[serde(default)]
    pub(crate) visibility: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub(crate) created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) account: Option<IdOrObject<RawAccount>>,
    #[serde(default)]
    pub(crate) reblog: Option<IdOrObject<RawStatus>>,
    #[serde(default)]
    pub(crate) quote: Option<IdOrObject<RawStatus>>,
    #[serde(default)]
    pub(crate) in_reply_to_id: Option<String>,
    #[serde(default)]
    pub(crate) poll: Option<IdOrObject<RawPoll>>,
    #[serde(default)]
    pub(crate) group: Option<IdOrObject<RawGroup>>,
    #[serde(default)]
    pub(crate) mentions: Vec<RawMention>,
    #[serde(default)]
    pub(crate) replies_count: Option<u64>,
    #[serde(default)]
    pub(crate) reblogs_count: Option<u64>,
    #[serde(default)]
    pub(crate) favourites_count: Option<u64>,
    #[serde(default)]
    pub(crate) favourited: Option<bool>,
    #[serde(default)]
    pub(crate) reblogged: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawMention {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) acct: Option<String>,
    #[serde(default)]
    pub(crate) username: Option<String>,
    #[serde(default)]
    pub(crate) url: Option<String>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawStatus =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("status id is empty".into()));
    }
    Ok(flatten(raw, sink))
}

pub(crate) fn flatten(raw: RawStatus, sink: &mut Extracted) -> String {
    let id = raw.id;
    if !sink.enter(EntityKind::Status, &id) {
        return id;
    }
    let account_id = raw.account.map(|a| account::resolve(a, sink));
    let reblog_id = raw.reblog.map(|s| resolve(s, sink));
    let quote_id = raw.quote.map(|s| resolve(s, sink));
    let poll_id = raw.poll.map(|p| poll::resolve(p, sink));
    let group_id = raw.group.map(|g| group::resolve(g, sink));
    let mention_ids = raw
        .mentions
        .into_iter()
        .map(|m| flatten_mention(m, sink))
        .collect();
    sink.push(Record::Status(Status {
        id: id.clone(),
        uri: raw.uri,
        content: raw.content,
        spoiler_text: raw.spoiler_text,
        visibility: raw.visibility,
        created_at: raw.created_at,
        account_id,
        reblog_id,
        quote_id,
        in_reply_to_id: raw.in_reply_to_id,
        poll_id,
        group_id,
        mention_ids,
        replies_count: raw.replies_count,
        reblogs_count: raw.reblogs_count,
        favourites_count: raw.favourites_count,
        favourited: raw.favourited,
        reblogged: raw.reblogged,
    }));
    id
}

// Mentions carry a skeleton of the account; imported as a partial record so
// a later full fetch can fill in the rest.
fn flatten_mention(raw: RawMention, sink: &mut Extracted) -> String {
    let id = raw.id;
    if !sink.enter(EntityKind::Account, &id) {
        return id;
    }
    sink.push(Record::Account(Account {
        acct: raw.acct,
        username: raw.username,
        url: raw.url,
        ..Account::partial(id.clone())
    }));
    id
}

pub(crate) fn resolve(field: IdOrObject<RawStatus>, sink: &mut Extracted) -> String {
    match field {
        IdOrObject::Id(id) => id,
        IdOrObject::Object(raw) => flatten(*raw, sink),
    }
}
