//! Process-wide keyed tables: one record table plus one list table per
//! entity kind. Pure data and mutation primitives, no I/O; both the fetch
//! completion path and the streaming path mutate through these and nothing
//! else.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::entities::{EntityKind, Record};
use crate::error::FetchError;

/// Opaque pagination token. Only the caller's fetch function interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageCursor {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Identifies one paginated view over one entity kind, e.g.
/// `ListKey::new("home")` or `ListKey::new("search").with(query)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListKey {
    parts: Vec<String>,
}

impl ListKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            parts: vec![name.into()],
        }
    }

    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join(":"))
    }
}

/// Where a page's ids land relative to the ids already in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPosition {
    Start,
    End,
}

/// Pagination and freshness state of one list. Created lazily on first
/// access; destroyed only by a process-wide reset.
#[derive(Debug, Clone, Default)]
pub struct ListState {
    pub ids: Vec<String>,
    pub fetching: bool,
    pub fetched: bool,
    pub error: Option<FetchError>,
    pub invalid: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub next: Option<PageCursor>,
    pub prev: Option<PageCursor>,
    pub total: Option<u64>,
}

impl ListState {
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match self.last_fetched_at {
            Some(at) => now >= at + stale_after,
            None => true,
        }
    }

    /// Whether an `ensure` access should trigger a fetch right now.
    pub fn needs_fetch(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        !self.fetched || self.invalid || self.is_stale(now, stale_after)
    }

    /// Merge a page of ids. Duplicates resolve to their first occurrence in
    /// the concatenation: new ids come first for `Start`, last for `End`.
    pub(crate) fn merge_ids(&mut self, new_ids: Vec<String>, position: ListPosition, overwrite: bool) {
        if overwrite {
            self.ids = dedup_ids(new_ids);
            return;
        }
        match position {
            ListPosition::End => {
                let mut seen: HashSet<String> = self.ids.iter().cloned().collect();
                for id in new_ids {
                    if seen.insert(id.clone()) {
                        self.ids.push(id);
                    }
                }
            }
            ListPosition::Start => {
                let mut merged = dedup_ids(new_ids);
                let seen: HashSet<String> = merged.iter().cloned().collect();
                merged.extend(self.ids.drain(..).filter(|id| !seen.contains(id)));
                self.ids = merged;
            }
        }
    }
}

fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[derive(Debug, Default)]
struct Table {
    records: HashMap<String, Record>,
    lists: HashMap<ListKey, ListState>,
}

/// The shared mutable cache. Records are immutable snapshots: an update
/// always replaces the slot through [`EntityStore::merge`], never patches a
/// stored value in place.
#[derive(Debug, Default)]
pub struct EntityStore {
    tables: HashMap<EntityKind, Table>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a batch of already-normalized records. Existing records merge
    /// field-set last-write-wins; absent fields never revert known values.
    /// Returns `(kind, id)` for every affected record.
    pub fn merge(&mut self, records: Vec<Record>) -> Vec<(EntityKind, String)> {
        let mut affected = Vec::with_capacity(records.len());
        for record in records {
            let kind = record.kind();
            let id = record.id().to_string();
            let table = self.tables.entry(kind).or_default();
            match table.records.entry(id.clone()) {
                Entry::Occupied(mut slot) => slot.get_mut().merge_from(record),
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
            affected.push((kind, id));
        }
        affected
    }

    /// Delete one record. List id sequences are left untouched; reads
    /// filter the dangling id out.
    pub fn remove(&mut self, kind: EntityKind, id: &str) -> bool {
        self.tables
            .get_mut(&kind)
            .is_some_and(|table| table.records.remove(id).is_some())
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Record> {
        self.tables.get(&kind).and_then(|table| table.records.get(id))
    }

    pub fn records(&self, kind: EntityKind) -> impl Iterator<Item = &Record> + '_ {
        self.tables
            .get(&kind)
            .into_iter()
            .flat_map(|table| table.records.values())
    }

    pub fn list(&self, kind: EntityKind, key: &ListKey) -> Option<&ListState> {
        self.tables.get(&kind).and_then(|table| table.lists.get(key))
    }

    pub fn list_mut(&mut self, kind: EntityKind, key: &ListKey) -> &mut ListState {
        self.tables
            .entry(kind)
            .or_default()
            .lists
            .entry(key.clone())
            .or_default()
    }

    /// The list's entities in id order, skipping ids whose record has been
    /// removed. The stored id sequence itself is not mutated.
    pub fn resolve_list(&self, kind: EntityKind, key: &ListKey) -> Vec<Record> {
        let Some(table) = self.tables.get(&kind) else {
            return Vec::new();
        };
        let Some(list) = table.lists.get(key) else {
            return Vec::new();
        };
        list.ids
            .iter()
            .filter_map(|id| table.records.get(id).cloned())
            .collect()
    }

    pub fn reset(&mut self) {
        self.tables.clear();
    }
}
