use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use kestrel_core::{
    Account, Announcement, CacheConfig, Chat, EntityCache, EntityKind, FetchError, Handled,
    ListKey, Marker, Notification, Page, PageCursor, PollFallback, Record, Status,
    StreamLifecycle, StreamingDispatcher, TopicPhase,
};
use serde_json::{json, Value};

fn status_json(id: &str) -> Value {
    json!({
        "id": id,
        "content": format!("<p>post {id}</p>"),
        "created_at": "2025-06-01T12:00:00Z",
        "account": {"id": "a1", "acct": "alice@example.social"}
    })
}

fn frame(event: &str, payload: &Value) -> String {
    json!({
        "event": event,
        "payload": serde_json::to_string(payload).unwrap(),
    })
    .to_string()
}

fn frame_raw(event: &str, payload: &str) -> String {
    json!({"event": event, "payload": payload}).to_string()
}

fn dispatcher() -> (Arc<EntityCache>, StreamingDispatcher) {
    let cache = Arc::new(EntityCache::new(CacheConfig::default()));
    let dispatcher = StreamingDispatcher::new(cache.clone());
    (cache, dispatcher)
}

#[tokio::test]
async fn stream_and_fetch_paths_yield_identical_store_contents() {
    let payload = status_json("s1");

    // HTTP fetch path.
    let fetched = EntityCache::new(CacheConfig::default());
    let page_payload = payload.clone();
    let fetcher = move |_cursor: Option<PageCursor>| -> BoxFuture<'static, Result<Page, FetchError>> {
        let item = page_payload.clone();
        Box::pin(async move {
            Ok(Page {
                items: vec![item],
                ..Page::default()
            })
        })
    };
    fetched
        .ensure_list::<Status>(&ListKey::new("public"), &fetcher)
        .await;

    // Streaming path.
    let (streamed, dispatcher) = dispatcher();
    dispatcher.connected("public");
    let handled = dispatcher
        .handle_frame("public", &frame("update", &payload))
        .unwrap();
    assert_eq!(handled, Handled::Applied);

    assert_eq!(
        fetched.get_record(EntityKind::Status, "s1"),
        streamed.get_record(EntityKind::Status, "s1")
    );
    assert_eq!(
        fetched.get_record(EntityKind::Account, "a1"),
        streamed.get_record(EntityKind::Account, "a1")
    );
    // The streamed status also landed in the topic's timeline.
    assert_eq!(streamed.list::<Status>(&ListKey::new("public")).entities.len(), 1);
}

#[tokio::test]
async fn updates_prepend_newest_first() {
    let (cache, dispatcher) = dispatcher();
    dispatcher
        .handle_frame("user", &frame("update", &status_json("s1")))
        .unwrap();
    dispatcher
        .handle_frame("user", &frame("update", &status_json("s2")))
        .unwrap();

    let snapshot = cache.list::<Status>(&ListKey::new("home"));
    let ids: Vec<_> = snapshot.entities.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["s2", "s1"]);
}

#[tokio::test]
async fn status_update_edits_without_touching_timelines() {
    let (cache, dispatcher) = dispatcher();
    dispatcher
        .handle_frame("user", &frame("update", &status_json("s1")))
        .unwrap();

    let mut edited = status_json("s1");
    edited["content"] = json!("<p>edited</p>");
    dispatcher
        .handle_frame("user", &frame("status.update", &edited))
        .unwrap();

    assert_eq!(
        cache.get::<Status>("s1").unwrap().content.as_deref(),
        Some("<p>edited</p>")
    );
    assert_eq!(cache.list::<Status>(&ListKey::new("home")).entities.len(), 1);
}

#[tokio::test]
async fn delete_frames_remove_the_record() {
    let (cache, dispatcher) = dispatcher();
    dispatcher
        .handle_frame("user", &frame("update", &status_json("s1")))
        .unwrap();
    assert!(cache.get::<Status>("s1").is_some());

    dispatcher.handle_frame("user", &frame_raw("delete", "s1")).unwrap();
    assert!(cache.get::<Status>("s1").is_none());
    assert!(cache.list::<Status>(&ListKey::new("home")).entities.is_empty());
}

#[tokio::test]
async fn notification_frames_feed_the_grouped_view() {
    let (cache, dispatcher) = dispatcher();
    let mk = |id: &str, kind: &str, account: &str| {
        json!({
            "id": id,
            "type": kind,
            "account": {"id": account, "acct": format!("{account}@example.social")},
            "status": status_json("s1"),
        })
    };
    for (id, kind, account) in [
        ("n1", "favourite", "A"),
        ("n2", "favourite", "B"),
        ("n3", "favourite", "C"),
        ("n4", "reblog", "D"),
    ] {
        dispatcher
            .handle_frame("user", &frame("notification", &mk(id, kind, account)))
            .unwrap();
    }

    let groups = cache.grouped_notifications(&ListKey::new("notifications"));
    assert_eq!(groups.len(), 2);
    let favourites = groups
        .iter()
        .find(|g| g.notification.kind == kestrel_core::NotificationKind::Favourite)
        .unwrap();
    assert_eq!(favourites.account_ids.len(), 3);
    assert_eq!(favourites.folded_ids.len(), 2);
    assert!(cache.get::<Notification>("n1").is_some());
}

#[tokio::test]
async fn follow_relationship_updates_merge_partially() {
    let (cache, dispatcher) = dispatcher();
    cache.merge_records(vec![Record::Account(Account {
        acct: Some("alice@example.social".into()),
        followers_count: Some(1),
        ..Account::partial("a1")
    })]);

    let payload = json!({
        "follower": {"id": "a1", "follower_count": 10, "following_count": 2},
        "following": {"id": "a2", "follower_count": 5, "following_count": 1},
    });
    dispatcher
        .handle_frame("user", &frame("follow_relationships_update", &payload))
        .unwrap();

    let alice = cache.get::<Account>("a1").unwrap();
    assert_eq!(alice.followers_count, Some(10));
    // The partial payload must not clobber previously known fields.
    assert_eq!(alice.acct.as_deref(), Some("alice@example.social"));
    assert_eq!(cache.get::<Account>("a2").unwrap().followers_count, Some(5));
}

#[tokio::test]
async fn announcement_lifecycle_via_frames() {
    let (cache, dispatcher) = dispatcher();
    let announcement = json!({
        "id": "ann1",
        "content": "<p>maintenance window</p>",
        "reactions": [{"name": "👍", "count": 1}],
    });
    dispatcher
        .handle_frame("user", &frame("announcement", &announcement))
        .unwrap();
    assert_eq!(
        cache.list::<Announcement>(&ListKey::new("announcements")).entities.len(),
        1
    );

    let reaction = json!({"announcement_id": "ann1", "name": "👍", "count": 4});
    dispatcher
        .handle_frame("user", &frame("announcement.reaction", &reaction))
        .unwrap();
    let stored = cache.get::<Announcement>("ann1").unwrap();
    assert_eq!(stored.reactions[0].count, 4);

    dispatcher
        .handle_frame("user", &frame_raw("announcement.delete", "ann1"))
        .unwrap();
    assert!(cache.get::<Announcement>("ann1").is_none());
}

#[tokio::test]
async fn marker_frames_store_one_record_per_timeline() {
    let (cache, dispatcher) = dispatcher();
    let payload = json!({
        "home": {"last_read_id": "s42", "version": 3},
        "notifications": {"last_read_id": "n7", "version": 1},
    });
    dispatcher.handle_frame("user", &frame("marker", &payload)).unwrap();

    assert_eq!(
        cache.get::<Marker>("home").unwrap().last_read_id.as_deref(),
        Some("s42")
    );
    assert_eq!(
        cache.get::<Marker>("notifications").unwrap().last_read_id.as_deref(),
        Some("n7")
    );
}

#[tokio::test]
async fn chat_updates_promote_to_the_front() {
    let (cache, dispatcher) = dispatcher();
    let chat = |id: &str| json!({"id": id, "account": {"id": "a1"}, "unread": 1});
    dispatcher.handle_frame("user", &frame("chat_update", &chat("c1"))).unwrap();
    dispatcher.handle_frame("user", &frame("chat_update", &chat("c2"))).unwrap();
    dispatcher.handle_frame("user", &frame("chat_update", &chat("c1"))).unwrap();

    let ids: Vec<_> = cache
        .list::<Chat>(&ListKey::new("chats"))
        .entities
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(ids, vec!["c1", "c2"]);

    dispatcher
        .handle_frame("user", &frame_raw("chat_deleted", "c2"))
        .unwrap();
    assert!(cache.get::<Chat>("c2").is_none());
}

#[tokio::test]
async fn unknown_events_are_ignored_and_bad_frames_are_errors() {
    let (_cache, dispatcher) = dispatcher();
    let handled = dispatcher
        .handle_frame("user", &frame_raw("some.future.event", "{}"))
        .unwrap();
    assert_eq!(handled, Handled::Ignored);

    assert!(dispatcher.handle_frame("user", "not json").is_err());
    assert!(dispatcher
        .handle_frame("user", &frame_raw("update", "not json"))
        .is_err());
}

struct RecordingFallback {
    topics: Mutex<Vec<String>>,
}

impl PollFallback for RecordingFallback {
    fn poll(&self, topic: &str) {
        self.topics.lock().unwrap().push(topic.to_string());
    }
}

#[tokio::test]
async fn disconnect_marks_the_timeline_stale_and_invokes_the_poll_fallback() {
    let (cache, dispatcher) = dispatcher();
    let fallback = Arc::new(RecordingFallback {
        topics: Mutex::new(Vec::new()),
    });
    dispatcher.set_poll_fallback(fallback.clone());
    let mut lifecycle = dispatcher.subscribe();

    dispatcher.connecting("user");
    assert_eq!(dispatcher.phase("user"), TopicPhase::Connecting);
    dispatcher.connected("user");
    assert!(matches!(
        lifecycle.try_recv().unwrap(),
        StreamLifecycle::Connected { .. }
    ));

    dispatcher.handle_frame("user", &frame("update", &status_json("s1"))).unwrap();
    dispatcher.disconnected("user");

    assert_eq!(dispatcher.phase("user"), TopicPhase::Disconnected);
    assert!(matches!(
        lifecycle.try_recv().unwrap(),
        StreamLifecycle::Disconnected { .. }
    ));
    assert_eq!(*fallback.topics.lock().unwrap(), vec!["user".to_string()]);
    assert!(cache.list::<Status>(&ListKey::new("home")).invalid);

    dispatcher.close("user");
    assert_eq!(dispatcher.phase("user"), TopicPhase::Closed);
    // Closed is terminal: later transport callbacks are ignored.
    dispatcher.connected("user");
    assert_eq!(dispatcher.phase("user"), TopicPhase::Closed);
}
