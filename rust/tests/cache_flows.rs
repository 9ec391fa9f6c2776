use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use kestrel_core::{
    Account, CacheConfig, EntityCache, EntityKind, FetchError, FetchOutcome, ListKey,
    ListPosition, Page, PageCursor, Relationship, Status, StoreEvent,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

fn status_json(id: &str) -> Value {
    json!({
        "id": id,
        "content": format!("<p>post {id}</p>"),
        "created_at": "2025-06-01T12:00:00Z",
        "account": {"id": format!("author-{id}"), "acct": format!("author-{id}@example.social")}
    })
}

fn account_json(id: &str, acct: &str) -> Value {
    json!({"id": id, "acct": acct, "username": acct.split('@').next().unwrap()})
}

/// Serves a two-page home timeline: s1+s2, then s3 behind cursor "p2".
fn home_fetcher(
    calls: Arc<AtomicUsize>,
) -> impl Fn(Option<PageCursor>) -> BoxFuture<'static, Result<Page, FetchError>> + Send + Sync {
    move |cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            match cursor {
                None => Ok(Page {
                    items: vec![status_json("s1"), status_json("s2")],
                    next: Some(PageCursor::new("p2")),
                    prev: None,
                    total: Some(3),
                }),
                Some(c) if c.as_str() == "p2" => Ok(Page {
                    items: vec![status_json("s3")],
                    next: None,
                    prev: None,
                    total: None,
                }),
                Some(other) => Err(FetchError::Network(format!(
                    "unexpected cursor {}",
                    other.as_str()
                ))),
            }
        })
    }
}

#[tokio::test]
async fn end_to_end_home_timeline() {
    let cache = EntityCache::new(CacheConfig::default());
    let key = ListKey::new("home");
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = home_fetcher(calls.clone());

    let outcome = cache.ensure_list::<Status>(&key, &fetcher).await;
    assert_eq!(outcome, FetchOutcome::Fetched);

    let snapshot = cache.list::<Status>(&key);
    assert!(snapshot.fetched);
    assert!(!snapshot.fetching);
    assert!(snapshot.error.is_none());
    assert_eq!(
        snapshot.entities.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["s1", "s2"]
    );
    assert!(snapshot.has_next);
    assert_eq!(snapshot.count(), 3);
    // Nested authors were extracted into their own table.
    assert!(cache.get::<Account>("author-s1").is_some());

    let outcome = cache.fetch_next_page::<Status>(&key, &fetcher).await;
    assert_eq!(outcome, FetchOutcome::Fetched);

    let snapshot = cache.list::<Status>(&key);
    assert_eq!(
        snapshot.entities.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["s1", "s2", "s3"]
    );
    assert!(!snapshot.has_next);

    let outcome = cache.fetch_next_page::<Status>(&key, &fetcher).await;
    assert_eq!(outcome, FetchOutcome::NoCursor);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_fetch_is_noop_while_first_in_flight() {
    let cache = Arc::new(EntityCache::new(CacheConfig::default()));
    let key = ListKey::new("favourites");
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let blocking_fetcher = {
        let gate = gate.clone();
        let calls = calls.clone();
        move |_cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
            let gate = gate.clone();
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(Page {
                    items: vec![status_json("s1")],
                    ..Page::default()
                })
            })
        }
    };

    let first = {
        let cache = cache.clone();
        let key = key.clone();
        let fetcher = blocking_fetcher.clone();
        tokio::spawn(async move { cache.ensure_list::<Status>(&key, &fetcher).await })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // The authoritative fetching flag makes this a no-op.
    let outcome = cache.ensure_list::<Status>(&key, &blocking_fetcher).await;
    assert_eq!(outcome, FetchOutcome::InFlight);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    assert_eq!(first.await.unwrap(), FetchOutcome::Fetched);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.list::<Status>(&key).entities.len(), 1);
}

#[tokio::test]
async fn manual_refetch_skips_the_in_flight_guard() {
    let cache = Arc::new(EntityCache::new(CacheConfig::default()));
    let key = ListKey::new("home");
    let gate = Arc::new(Notify::new());
    let blocked_calls = Arc::new(AtomicUsize::new(0));

    let blocking_fetcher = {
        let gate = gate.clone();
        let calls = blocked_calls.clone();
        move |_cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
            let gate = gate.clone();
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(Page {
                    items: vec![status_json("s1")],
                    ..Page::default()
                })
            })
        }
    };

    let first = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.ensure_list::<Status>(&key, &blocking_fetcher).await })
    };
    while blocked_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // An overwrite refetch from a second call site races the in-flight
    // fetch instead of being rejected.
    let quick_calls = Arc::new(AtomicUsize::new(0));
    let quick_fetcher = {
        let calls = quick_calls.clone();
        move |_cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(Page {
                    items: vec![status_json("s9")],
                    ..Page::default()
                })
            })
        }
    };
    let outcome = cache.refetch_list::<Status>(&key, &quick_fetcher).await;
    assert_eq!(outcome, FetchOutcome::Fetched);
    assert_eq!(quick_calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    assert_eq!(first.await.unwrap(), FetchOutcome::Fetched);
}

#[tokio::test]
async fn stale_list_refetches_and_fresh_list_does_not() {
    let stale_now = EntityCache::new(CacheConfig {
        stale_after_secs: 0,
        ..CacheConfig::default()
    });
    let key = ListKey::new("home");
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = home_fetcher(calls.clone());

    assert_eq!(stale_now.ensure_list::<Status>(&key, &fetcher).await, FetchOutcome::Fetched);
    assert_eq!(stale_now.ensure_list::<Status>(&key, &fetcher).await, FetchOutcome::Fetched);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let fresh = EntityCache::new(CacheConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = home_fetcher(calls.clone());
    assert_eq!(fresh.ensure_list::<Status>(&key, &fetcher).await, FetchOutcome::Fetched);
    assert_eq!(fresh.ensure_list::<Status>(&key, &fetcher).await, FetchOutcome::Fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidation_refetches_but_keeps_stale_data_visible() {
    let cache = EntityCache::new(CacheConfig::default());
    let key = ListKey::new("home");
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = home_fetcher(calls.clone());

    cache.ensure_list::<Status>(&key, &fetcher).await;
    cache.invalidate_list(EntityKind::Status, &key);

    let snapshot = cache.list::<Status>(&key);
    assert!(snapshot.invalid);
    assert_eq!(snapshot.entities.len(), 2);

    assert_eq!(cache.ensure_list::<Status>(&key, &fetcher).await, FetchOutcome::Fetched);
    assert!(!cache.list::<Status>(&key).invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_fetch_keeps_existing_ids() {
    let cache = EntityCache::new(CacheConfig::default());
    let key = ListKey::new("home");
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = home_fetcher(calls.clone());
    cache.ensure_list::<Status>(&key, &fetcher).await;

    let failing = |_cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
        Box::pin(async { Err(FetchError::Network("connection reset".into())) })
    };
    let outcome = cache.refetch_list::<Status>(&key, &failing).await;
    assert_eq!(
        outcome,
        FetchOutcome::Failed(FetchError::Network("connection reset".into()))
    );

    let snapshot = cache.list::<Status>(&key);
    assert!(snapshot.error.is_some());
    assert!(!snapshot.fetching);
    assert_eq!(snapshot.entities.len(), 2);
}

#[tokio::test]
async fn invalid_page_items_are_dropped_not_fatal() {
    let cache = EntityCache::new(CacheConfig::default());
    let key = ListKey::new("home");
    let fetcher = |_cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
        Box::pin(async {
            Ok(Page {
                items: vec![status_json("s1"), json!({"content": "missing id"})],
                ..Page::default()
            })
        })
    };
    assert_eq!(cache.ensure_list::<Status>(&key, &fetcher).await, FetchOutcome::Fetched);
    assert_eq!(cache.list::<Status>(&key).entities.len(), 1);
}

#[tokio::test]
async fn unauthorized_and_forbidden_are_typed() {
    let cache = EntityCache::new(CacheConfig::default());
    let unauthorized = || -> BoxFuture<'static, Result<Value, FetchError>> {
        Box::pin(async { Err(FetchError::Unauthorized) })
    };
    let err = cache.fetch_entity::<Account>(&unauthorized).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(!err.is_forbidden());

    let forbidden = || -> BoxFuture<'static, Result<Value, FetchError>> {
        Box::pin(async { Err(FetchError::Forbidden) })
    };
    let err = cache.fetch_entity::<Account>(&forbidden).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn ensure_entity_skips_the_fetch_when_cached() {
    let cache = EntityCache::new(CacheConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = {
        let calls = calls.clone();
        move || -> BoxFuture<'static, Result<Value, FetchError>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(account_json("a1", "alice@example.social")) })
        }
    };

    let fetched = cache.ensure_entity::<Account>("a1", &fetcher).await.unwrap();
    assert_eq!(fetched.id, "a1");
    let cached = cache.ensure_entity::<Account>("a1", &fetcher).await.unwrap();
    assert_eq!(cached.id, "a1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batched_fetch_requests_only_missing_ids() {
    let cache = EntityCache::new(CacheConfig::default());
    cache.merge_records(vec![kestrel_core::Record::Relationship(Relationship {
        id: "r1".into(),
        following: Some(true),
        ..Relationship::default()
    })]);

    let requested = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let fetcher = {
        let requested = requested.clone();
        move |ids: Vec<String>| -> BoxFuture<'static, Result<Vec<Value>, FetchError>> {
            *requested.lock().unwrap() = ids.clone();
            Box::pin(async move {
                Ok(ids
                    .into_iter()
                    .map(|id| json!({"id": id, "following": false}))
                    .collect())
            })
        }
    };

    let ids = vec!["r1".to_string(), "r2".to_string(), "r3".to_string()];
    let fetched = cache
        .fetch_missing::<Relationship>(&ids, &fetcher)
        .await
        .unwrap();
    assert_eq!(
        *requested.lock().unwrap(),
        vec!["r2".to_string(), "r3".to_string()]
    );
    assert_eq!(fetched.len(), 2);
    assert!(cache.get::<Relationship>("r2").is_some());
    // The cached record was not clobbered by the batch.
    assert_eq!(cache.get::<Relationship>("r1").unwrap().following, Some(true));

    // Nothing missing: no request at all.
    *requested.lock().unwrap() = Vec::new();
    let fetched = cache
        .fetch_missing::<Relationship>(&ids, &fetcher)
        .await
        .unwrap();
    assert!(fetched.is_empty());
    assert!(requested.lock().unwrap().is_empty());
}

#[tokio::test]
async fn create_merges_and_prepends_delete_confirms_first() {
    let cache = EntityCache::new(CacheConfig::default());
    let key = ListKey::new("home");
    let fetcher = home_fetcher(Arc::new(AtomicUsize::new(0)));
    cache.ensure_list::<Status>(&key, &fetcher).await;

    let created = cache
        .create_entity::<Status, _>(
            async { Ok(status_json("s-new")) },
            Some((key.clone(), ListPosition::Start)),
        )
        .await
        .unwrap();
    assert_eq!(created.id, "s-new");
    let snapshot = cache.list::<Status>(&key);
    assert_eq!(snapshot.entities[0].id, "s-new");

    // A failed deletion must not remove the record.
    let result = cache
        .delete_entity(EntityKind::Status, "s-new", async {
            Err(FetchError::Network("timeout".into()))
        })
        .await;
    assert!(result.is_err());
    assert!(cache.get::<Status>("s-new").is_some());

    cache
        .delete_entity(EntityKind::Status, "s-new", async { Ok(()) })
        .await
        .unwrap();
    assert!(cache.get::<Status>("s-new").is_none());
    // The stored id sequence still references it; reads filter it out.
    assert!(cache
        .list::<Status>(&key)
        .entities
        .iter()
        .all(|s| s.id != "s-new"));
}

#[tokio::test]
async fn lookup_fallback_yields_to_a_table_match() {
    let cache = EntityCache::new(CacheConfig::default());
    let by_handle = |account: &Account| account.matches_acct("alice@example.social");

    let fetcher = || -> BoxFuture<'static, Result<Value, FetchError>> {
        Box::pin(async { Ok(account_json("a1", "alice@example.social")) })
    };
    let lookup = cache.lookup::<Account, _>(by_handle, &fetcher).await.unwrap();

    // The fallback never entered the global table.
    assert!(cache.get::<Account>("a1").is_none());
    let resolved = lookup.resolve(&cache, by_handle).unwrap();
    assert_eq!(resolved.id, "a1");

    // Once the table has a match, it wins over the fallback.
    cache.merge_records(vec![kestrel_core::Record::Account(Account {
        display_name: Some("Alice".into()),
        acct: Some("alice@example.social".into()),
        ..Account::partial("a1")
    })]);
    let resolved = lookup.resolve(&cache, by_handle).unwrap();
    assert_eq!(resolved.display_name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn reset_leaves_an_empty_cache() {
    let cache = EntityCache::new(CacheConfig::default());
    let key = ListKey::new("home");
    let fetcher = home_fetcher(Arc::new(AtomicUsize::new(0)));
    cache.ensure_list::<Status>(&key, &fetcher).await;
    assert!(!cache.list::<Status>(&key).entities.is_empty());

    cache.reset();
    assert!(cache.get::<Status>("s1").is_none());
    let snapshot = cache.list::<Status>(&key);
    assert!(snapshot.entities.is_empty());
    assert!(!snapshot.fetched);
}

#[tokio::test]
async fn merges_notify_subscribers() {
    let cache = EntityCache::new(CacheConfig::default());
    let mut events = cache.subscribe();
    cache.merge_records(vec![kestrel_core::Record::Account(Account::partial("a1"))]);

    match events.try_recv().unwrap() {
        StoreEvent::Merged { kind, ids } => {
            assert_eq!(kind, EntityKind::Account);
            assert_eq!(ids, vec!["a1".to_string()]);
        }
        other => panic!("unexpected event {other:?}"),
    }

    cache.remove_entity(EntityKind::Account, "a1");
    assert!(matches!(
        events.try_recv().unwrap(),
        StoreEvent::Removed { .. }
    ));
}
