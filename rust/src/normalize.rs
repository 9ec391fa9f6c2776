//! Splits a nested wire payload into flat per-type records.
//!
//! Every entry point (list fetch, single fetch, stream frame) funnels
//! through [`normalize_value`], so a pushed event and a fetch response are
//! indistinguishable by the time records reach the store.

use std::collections::HashSet;

use serde_json::Value;

use crate::entities::{
    account, announcement, chat, conversation, filter, group, marker, notification, poll,
    relationship, status, EntityKind, Record,
};
use crate::error::FetchError;

/// Accumulates the flattened records of one payload walk, with a visited
/// set guarding against self-referential payloads.
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    visited: HashSet<(EntityKind, String)>,
    records: Vec<Record>,
}

impl Extracted {
    /// Marks `(kind, id)` as visited. Returns false when the id was already
    /// seen in this walk; the caller must then reference the id without
    /// descending again.
    pub(crate) fn enter(&mut self, kind: EntityKind, id: &str) -> bool {
        self.visited.insert((kind, id.to_string()))
    }

    pub(crate) fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub(crate) fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Parse and flatten one raw payload of the given kind. Returns the primary
/// entity's id; every extracted record (the primary one included) lands in
/// `sink` in dependency order.
pub(crate) fn normalize_value(
    kind: EntityKind,
    value: Value,
    sink: &mut Extracted,
) -> Result<String, FetchError> {
    match kind {
        EntityKind::Account => account::parse(value, sink),
        EntityKind::Status => status::parse(value, sink),
        EntityKind::Relationship => relationship::parse(value, sink),
        EntityKind::Group => group::parse(value, sink),
        EntityKind::GroupRelationship => group::parse_relationship(value, sink),
        EntityKind::Poll => poll::parse(value, sink),
        EntityKind::Notification => notification::parse(value, sink),
        EntityKind::Conversation => conversation::parse(value, sink),
        EntityKind::Chat => chat::parse(value, sink),
        EntityKind::Announcement => announcement::parse(value, sink),
        EntityKind::Marker => marker::parse(value, sink),
        EntityKind::Filter => filter::parse(value, sink),
    }
}
