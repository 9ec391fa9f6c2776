//! Read/subscribe/fetch surface over the entity store.
//!
//! Reads are pure (`get`, `list`, `find`); network I/O only happens through
//! the explicitly invoked `ensure_*` / `fetch_*` / `refetch_*` operations,
//! each driven by a caller-supplied fetch function. One `EntityCache` is
//! constructed per session and torn down with `reset` at logout.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;
use crate::dedup::{fold_notifications, NotificationGroup};
use crate::entities::{Entity, EntityKind, Notification, Record};
use crate::error::FetchError;
use crate::normalize::{self, Extracted};
use crate::store::{EntityStore, ListKey, ListPosition, PageCursor};

/// One page of a paginated endpoint, as returned by a [`PageFetcher`].
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<PageCursor>,
    pub prev: Option<PageCursor>,
    pub total: Option<u64>,
}

/// Caller-supplied paginated request. `cursor` is `None` for the first
/// page, otherwise a token previously returned in [`Page`].
pub trait PageFetcher: Send + Sync {
    fn page(&self, cursor: Option<PageCursor>) -> BoxFuture<'static, Result<Page, FetchError>>;
}

impl<F> PageFetcher for F
where
    F: Fn(Option<PageCursor>) -> BoxFuture<'static, Result<Page, FetchError>> + Send + Sync,
{
    fn page(&self, cursor: Option<PageCursor>) -> BoxFuture<'static, Result<Page, FetchError>> {
        (self)(cursor)
    }
}

/// Caller-supplied single-entity request.
pub trait EntityFetcher: Send + Sync {
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>>;
}

impl<F> EntityFetcher for F
where
    F: Fn() -> BoxFuture<'static, Result<Value, FetchError>> + Send + Sync,
{
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>> {
        (self)()
    }
}

/// Caller-supplied batched request: one call for many ids.
pub trait BatchFetcher: Send + Sync {
    fn fetch(&self, ids: Vec<String>) -> BoxFuture<'static, Result<Vec<Value>, FetchError>>;
}

impl<F> BatchFetcher for F
where
    F: Fn(Vec<String>) -> BoxFuture<'static, Result<Vec<Value>, FetchError>> + Send + Sync,
{
    fn fetch(&self, ids: Vec<String>) -> BoxFuture<'static, Result<Vec<Value>, FetchError>> {
        (self)(ids)
    }
}

/// Change notifications for consumers that re-derive views from the store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Merged { kind: EntityKind, ids: Vec<String> },
    Removed { kind: EntityKind, id: String },
    ListChanged { kind: EntityKind, key: ListKey },
    Reset,
}

/// What a list fetch operation did.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A request ran and the list was updated.
    Fetched,
    /// The list was fresh; no request was issued.
    Fresh,
    /// Another fetch already owned this list; this call was a no-op.
    InFlight,
    /// A next/previous page was requested but no cursor is stored.
    NoCursor,
    /// The request ran and failed; the error is also stored on the list.
    Failed(FetchError),
}

/// Point-in-time view of one list: live-resolved entities plus the list's
/// fetch state. Dangling ids are filtered out here, not in storage.
#[derive(Debug, Clone)]
pub struct ListSnapshot<T> {
    pub entities: Vec<T>,
    pub fetching: bool,
    pub fetched: bool,
    pub error: Option<FetchError>,
    pub invalid: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub has_next: bool,
    pub has_previous: bool,
    pub total: Option<u64>,
}

impl<T> ListSnapshot<T> {
    fn empty() -> Self {
        Self {
            entities: Vec::new(),
            fetching: false,
            fetched: false,
            error: None,
            invalid: false,
            last_fetched_at: None,
            has_next: false,
            has_previous: false,
            total: None,
        }
    }

    /// Server-reported total when known, resolved length otherwise.
    pub fn count(&self) -> usize {
        self.total.map_or(self.entities.len(), |t| t as usize)
    }
}

/// Result of a predicate lookup. The fetched fallback lives only in this
/// handle; it is used until a matching record shows up in the table.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    fallback: Option<T>,
}

impl<T: Entity> Lookup<T> {
    pub fn resolve<P>(&self, cache: &EntityCache, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        cache.find(predicate).or_else(|| self.fallback.clone())
    }

    pub fn fallback(&self) -> Option<&T> {
        self.fallback.as_ref()
    }
}

pub struct EntityCache {
    store: RwLock<EntityStore>,
    events: broadcast::Sender<StoreEvent>,
    config: CacheConfig,
}

impl EntityCache {
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.events_capacity.max(1));
        Self {
            store: RwLock::new(EntityStore::new()),
            events,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ---- pure reads ----

    pub fn get<T: Entity>(&self, id: &str) -> Option<T> {
        let store = self.store.read();
        store.get(T::KIND, id).and_then(T::as_record_ref).cloned()
    }

    pub fn get_record(&self, kind: EntityKind, id: &str) -> Option<Record> {
        self.store.read().get(kind, id).cloned()
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.store.read().get(kind, id).is_some()
    }

    /// Scan the cached records of `T` for the first predicate match.
    pub fn find<T, P>(&self, predicate: P) -> Option<T>
    where
        T: Entity,
        P: Fn(&T) -> bool,
    {
        let store = self.store.read();
        let found = store
            .records(T::KIND)
            .filter_map(T::as_record_ref)
            .find(|entity| predicate(entity))
            .cloned();
        found
    }

    pub fn list<T: Entity>(&self, key: &ListKey) -> ListSnapshot<T> {
        let store = self.store.read();
        let Some(state) = store.list(T::KIND, key) else {
            return ListSnapshot::empty();
        };
        let entities = state
            .ids
            .iter()
            .filter_map(|id| store.get(T::KIND, id))
            .filter_map(T::as_record_ref)
            .cloned()
            .collect();
        ListSnapshot {
            entities,
            fetching: state.fetching,
            fetched: state.fetched,
            error: state.error.clone(),
            invalid: state.invalid,
            last_fetched_at: state.last_fetched_at,
            has_next: state.next.is_some(),
            has_previous: state.prev.is_some(),
            total: state.total,
        }
    }

    /// The notifications list folded into display groups.
    pub fn grouped_notifications(&self, key: &ListKey) -> Vec<NotificationGroup> {
        let snapshot = self.list::<Notification>(key);
        fold_notifications(&snapshot.entities)
    }

    // ---- mutation primitives ----

    /// Upsert already-normalized records. Both the fetch completion path
    /// and the streaming path land here.
    pub fn merge_records(&self, records: Vec<Record>) {
        self.apply_merge(records);
    }

    pub fn remove_entity(&self, kind: EntityKind, id: &str) {
        let removed = self.store.write().remove(kind, id);
        if removed {
            debug!(kind = %kind, id = %id, "removed record");
            let _ = self.events.send(StoreEvent::Removed {
                kind,
                id: id.to_string(),
            });
        }
    }

    /// Insert one id into a list without touching records.
    pub fn insert_into_list(
        &self,
        kind: EntityKind,
        key: &ListKey,
        id: impl Into<String>,
        position: ListPosition,
    ) {
        {
            let mut store = self.store.write();
            store
                .list_mut(kind, key)
                .merge_ids(vec![id.into()], position, false);
        }
        self.notify_list(kind, key);
    }

    /// Force the next `ensure_list` to refetch while keeping the current
    /// ids visible (stale-while-revalidate).
    pub fn invalidate_list(&self, kind: EntityKind, key: &ListKey) {
        {
            let mut store = self.store.write();
            store.list_mut(kind, key).invalid = true;
        }
        self.notify_list(kind, key);
    }

    /// Wipe everything. Used on logout / session switch.
    pub fn reset(&self) {
        self.store.write().reset();
        let _ = self.events.send(StoreEvent::Reset);
    }

    // ---- fetch operations ----

    /// Fetch the first page iff the list was never fetched, is invalidated,
    /// or is older than the configured staleness window.
    pub async fn ensure_list<T: Entity>(
        &self,
        key: &ListKey,
        fetcher: &dyn PageFetcher,
    ) -> FetchOutcome {
        let needs = {
            let store = self.store.read();
            store
                .list(T::KIND, key)
                .map_or(true, |state| state.needs_fetch(Utc::now(), self.config.stale_after()))
        };
        if !needs {
            return FetchOutcome::Fresh;
        }
        self.fetch_page_inner(T::KIND, key, fetcher, None, ListPosition::End, true, true)
            .await
    }

    /// Manually triggered full refetch. Deliberately skips the in-flight
    /// guard: two call sites refetching the same key concurrently race,
    /// and the later resolution wins.
    pub async fn refetch_list<T: Entity>(
        &self,
        key: &ListKey,
        fetcher: &dyn PageFetcher,
    ) -> FetchOutcome {
        self.fetch_page_inner(T::KIND, key, fetcher, None, ListPosition::End, true, false)
            .await
    }

    pub async fn fetch_next_page<T: Entity>(
        &self,
        key: &ListKey,
        fetcher: &dyn PageFetcher,
    ) -> FetchOutcome {
        let cursor = {
            let store = self.store.read();
            store.list(T::KIND, key).and_then(|state| state.next.clone())
        };
        let Some(cursor) = cursor else {
            return FetchOutcome::NoCursor;
        };
        self.fetch_page_inner(
            T::KIND,
            key,
            fetcher,
            Some(cursor),
            ListPosition::End,
            false,
            true,
        )
        .await
    }

    pub async fn fetch_previous_page<T: Entity>(
        &self,
        key: &ListKey,
        fetcher: &dyn PageFetcher,
    ) -> FetchOutcome {
        let cursor = {
            let store = self.store.read();
            store.list(T::KIND, key).and_then(|state| state.prev.clone())
        };
        let Some(cursor) = cursor else {
            return FetchOutcome::NoCursor;
        };
        self.fetch_page_inner(
            T::KIND,
            key,
            fetcher,
            Some(cursor),
            ListPosition::Start,
            false,
            true,
        )
        .await
    }

    /// Fetch one entity and merge it (with everything nested inside it).
    /// Validation failure fails the whole call for single-entity fetches.
    pub async fn fetch_entity<T: Entity>(
        &self,
        fetcher: &dyn EntityFetcher,
    ) -> Result<T, FetchError> {
        let value = fetcher.fetch().await?;
        let id = self.ingest_value(T::KIND, value)?;
        self.get::<T>(&id)
            .ok_or_else(|| FetchError::Validation("record absent after merge".into()))
    }

    /// Fetch only when no record for `id` is cached yet.
    pub async fn ensure_entity<T: Entity>(
        &self,
        id: &str,
        fetcher: &dyn EntityFetcher,
    ) -> Result<T, FetchError> {
        if let Some(existing) = self.get::<T>(id) {
            return Ok(existing);
        }
        self.fetch_entity::<T>(fetcher).await
    }

    /// Predicate search with a single-fetch fallback. The fetched value is
    /// returned in the [`Lookup`] handle without entering the global table;
    /// it stands in only until a matching record appears there.
    pub async fn lookup<T, P>(
        &self,
        predicate: P,
        fetcher: &dyn EntityFetcher,
    ) -> Result<Lookup<T>, FetchError>
    where
        T: Entity,
        P: Fn(&T) -> bool,
    {
        if self.find::<T, _>(&predicate).is_some() {
            return Ok(Lookup { fallback: None });
        }
        let value = fetcher.fetch().await?;
        let mut sink = Extracted::default();
        let id = normalize::normalize_value(T::KIND, value, &mut sink)?;
        let fallback = sink
            .into_records()
            .into_iter()
            .rev()
            .find(|record| record.kind() == T::KIND && record.id() == id)
            .and_then(T::from_record);
        Ok(Lookup { fallback })
    }

    /// One batched request for the subset of `ids` that has no cached
    /// record. Invalid items in the response are dropped, not fatal.
    pub async fn fetch_missing<T: Entity>(
        &self,
        ids: &[String],
        fetcher: &dyn BatchFetcher,
    ) -> Result<Vec<T>, FetchError> {
        let missing: Vec<String> = {
            let store = self.store.read();
            ids.iter()
                .filter(|id| store.get(T::KIND, id).is_none())
                .cloned()
                .collect()
        };
        if missing.is_empty() {
            return Ok(Vec::new());
        }
        let values = fetcher.fetch(missing).await?;
        let mut records = Vec::new();
        let mut fetched_ids = Vec::new();
        for value in values {
            let mut sink = Extracted::default();
            match normalize::normalize_value(T::KIND, value, &mut sink) {
                Ok(id) => {
                    fetched_ids.push(id);
                    records.extend(sink.into_records());
                }
                Err(e) => warn!(kind = %T::KIND, error = %e, "dropping invalid batch item"),
            }
        }
        self.apply_merge(records);
        Ok(fetched_ids
            .iter()
            .filter_map(|id| self.get::<T>(id))
            .collect())
    }

    /// Run a creation request, merge the result optimistically, and return
    /// the merged record. Optionally inserts the new id into a list.
    pub async fn create_entity<T, Fut>(
        &self,
        create: Fut,
        into: Option<(ListKey, ListPosition)>,
    ) -> Result<T, FetchError>
    where
        T: Entity,
        Fut: Future<Output = Result<Value, FetchError>>,
    {
        let value = create.await?;
        let id = self.ingest_value(T::KIND, value)?;
        if let Some((key, position)) = into {
            self.insert_into_list(T::KIND, &key, id.clone(), position);
        }
        self.get::<T>(&id)
            .ok_or_else(|| FetchError::Validation("record absent after merge".into()))
    }

    /// Run a deletion request and remove the record only after the server
    /// confirms. Never removes optimistically.
    pub async fn delete_entity<Fut>(
        &self,
        kind: EntityKind,
        id: &str,
        delete: Fut,
    ) -> Result<(), FetchError>
    where
        Fut: Future<Output = Result<(), FetchError>>,
    {
        delete.await?;
        self.remove_entity(kind, id);
        Ok(())
    }

    // ---- internals ----

    /// Normalize one payload and merge everything it contained. Returns the
    /// primary entity's id. Shared by fetch and streaming ingestion.
    pub(crate) fn ingest_value(&self, kind: EntityKind, value: Value) -> Result<String, FetchError> {
        let mut sink = Extracted::default();
        let id = normalize::normalize_value(kind, value, &mut sink)?;
        self.apply_merge(sink.into_records());
        Ok(id)
    }

    fn apply_merge(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        let affected = self.store.write().merge(records);
        let mut by_kind: HashMap<EntityKind, Vec<String>> = HashMap::new();
        for (kind, id) in affected {
            by_kind.entry(kind).or_default().push(id);
        }
        for (kind, ids) in by_kind {
            debug!(kind = %kind, count = ids.len(), "merged records");
            let _ = self.events.send(StoreEvent::Merged { kind, ids });
        }
    }

    fn notify_list(&self, kind: EntityKind, key: &ListKey) {
        let _ = self.events.send(StoreEvent::ListChanged {
            kind,
            key: key.clone(),
        });
    }

    /// The single list-fetch path. The in-flight flag is re-read from the
    /// authoritative store here, never from a caller-captured snapshot.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_page_inner(
        &self,
        kind: EntityKind,
        key: &ListKey,
        fetcher: &dyn PageFetcher,
        cursor: Option<PageCursor>,
        position: ListPosition,
        overwrite: bool,
        guarded: bool,
    ) -> FetchOutcome {
        {
            let mut store = self.store.write();
            let state = store.list_mut(kind, key);
            if guarded && state.fetching {
                return FetchOutcome::InFlight;
            }
            state.fetching = true;
            state.error = None;
        }
        self.notify_list(kind, key);

        match fetcher.page(cursor).await {
            Ok(page) => {
                let mut ids = Vec::with_capacity(page.items.len());
                let mut records = Vec::new();
                for item in page.items {
                    let mut sink = Extracted::default();
                    match normalize::normalize_value(kind, item, &mut sink) {
                        Ok(id) => {
                            ids.push(id);
                            records.extend(sink.into_records());
                        }
                        Err(e) => {
                            warn!(kind = %kind, key = %key, error = %e, "dropping invalid page item")
                        }
                    }
                }
                self.apply_merge(records);
                {
                    let mut store = self.store.write();
                    let state = store.list_mut(kind, key);
                    state.merge_ids(ids, position, overwrite);
                    state.fetching = false;
                    state.fetched = true;
                    state.invalid = false;
                    state.last_fetched_at = Some(Utc::now());
                    if overwrite {
                        state.next = page.next;
                        state.prev = page.prev;
                    } else {
                        match position {
                            ListPosition::End => state.next = page.next,
                            ListPosition::Start => state.prev = page.prev,
                        }
                    }
                    if page.total.is_some() {
                        state.total = page.total;
                    }
                }
                self.notify_list(kind, key);
                FetchOutcome::Fetched
            }
            Err(e) => {
                error!(kind = %kind, key = %key, error = %e, "list fetch failed");
                {
                    let mut store = self.store.write();
                    let state = store.list_mut(kind, key);
                    state.fetching = false;
                    state.error = Some(e.clone());
                }
                self.notify_list(kind, key);
                FetchOutcome::Failed(e)
            }
        }
    }
}
