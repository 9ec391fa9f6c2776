//! Decodes push frames and folds them into the entity cache.
//!
//! The socket itself lives outside this crate; its owner drives the
//! per-topic connection state and hands every received frame to
//! [`StreamingDispatcher::handle_frame`]. Frames are processed
//! synchronously in arrival order, and every handler mutates the cache
//! through the same primitives a completed fetch uses.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::EntityCache;
use crate::entities::{Account, Announcement, Entity, EntityKind};
use crate::error::StreamError;
use crate::store::{ListKey, ListPosition};

/// Connection state of one topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicPhase {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: explicit teardown because no consumer remains interested.
    Closed,
}

#[derive(Debug, Clone)]
pub enum StreamLifecycle {
    Connected { topic: String },
    Disconnected { topic: String },
    Closed { topic: String },
}

/// What `handle_frame` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Applied,
    /// Unknown event tag; logged and skipped.
    Ignored,
}

/// Invoked on involuntary disconnect so the host can approximate missed
/// updates by polling until the connection is back.
pub trait PollFallback: Send + Sync {
    fn poll(&self, topic: &str);
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnnouncementReactionEvent {
    announcement_id: String,
    name: String,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct FollowRelationshipsEvent {
    follower: RawFollowCounts,
    following: RawFollowCounts,
}

#[derive(Debug, Deserialize)]
struct RawFollowCounts {
    id: String,
    #[serde(default)]
    follower_count: Option<u64>,
    #[serde(default)]
    following_count: Option<u64>,
}

pub struct StreamingDispatcher {
    cache: Arc<EntityCache>,
    topics: RwLock<HashMap<String, TopicPhase>>,
    lifecycle: broadcast::Sender<StreamLifecycle>,
    poll_fallback: RwLock<Option<Arc<dyn PollFallback>>>,
}

impl StreamingDispatcher {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        let (lifecycle, _) = broadcast::channel(64);
        Self {
            cache,
            topics: RwLock::new(HashMap::new()),
            lifecycle,
            poll_fallback: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamLifecycle> {
        self.lifecycle.subscribe()
    }

    pub fn set_poll_fallback(&self, fallback: Arc<dyn PollFallback>) {
        *self.poll_fallback.write() = Some(fallback);
    }

    pub fn phase(&self, topic: &str) -> TopicPhase {
        self.topics
            .read()
            .get(topic)
            .copied()
            .unwrap_or(TopicPhase::Disconnected)
    }

    pub fn connecting(&self, topic: &str) {
        self.topics
            .write()
            .insert(topic.to_string(), TopicPhase::Connecting);
    }

    pub fn connected(&self, topic: &str) {
        {
            let mut topics = self.topics.write();
            if topics.get(topic) == Some(&TopicPhase::Closed) {
                return;
            }
            topics.insert(topic.to_string(), TopicPhase::Connected);
        }
        debug!(topic = %topic, "stream connected");
        let _ = self.lifecycle.send(StreamLifecycle::Connected {
            topic: topic.to_string(),
        });
    }

    /// Involuntary drop. Marks the topic's timeline stale so the next
    /// access refetches, and hands the topic to the poll fallback.
    pub fn disconnected(&self, topic: &str) {
        {
            let mut topics = self.topics.write();
            if topics.get(topic) == Some(&TopicPhase::Closed) {
                return;
            }
            topics.insert(topic.to_string(), TopicPhase::Disconnected);
        }
        debug!(topic = %topic, "stream disconnected");
        if let Some(key) = timeline_key(topic) {
            self.cache.invalidate_list(EntityKind::Status, &key);
        }
        let _ = self.lifecycle.send(StreamLifecycle::Disconnected {
            topic: topic.to_string(),
        });
        let fallback = self.poll_fallback.read().clone();
        if let Some(fallback) = fallback {
            fallback.poll(topic);
        }
    }

    pub fn close(&self, topic: &str) {
        self.topics
            .write()
            .insert(topic.to_string(), TopicPhase::Closed);
        let _ = self.lifecycle.send(StreamLifecycle::Closed {
            topic: topic.to_string(),
        });
    }

    /// Decode one frame and apply it. Unknown event tags are ignored;
    /// malformed envelopes or payloads are errors the caller may log, the
    /// dispatcher itself stays usable either way.
    pub fn handle_frame(&self, topic: &str, raw: &str) -> Result<Handled, StreamError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| StreamError::Envelope(e.to_string()))?;
        let payload = envelope.payload.unwrap_or_default();
        let event = envelope.event.as_str();
        debug!(topic = %topic, event = %event, "stream frame");

        match event {
            "update" => {
                let id = self.ingest(EntityKind::Status, event, &payload)?;
                if let Some(key) = timeline_key(topic) {
                    self.cache
                        .insert_into_list(EntityKind::Status, &key, id, ListPosition::Start);
                }
                Ok(Handled::Applied)
            }
            "status.update" => {
                self.ingest(EntityKind::Status, event, &payload)?;
                Ok(Handled::Applied)
            }
            "delete" => {
                if let Some(id) = payload_id(&payload) {
                    self.cache.remove_entity(EntityKind::Status, &id);
                }
                Ok(Handled::Applied)
            }
            "notification" => {
                let id = self.ingest(EntityKind::Notification, event, &payload)?;
                self.cache.insert_into_list(
                    EntityKind::Notification,
                    &ListKey::new("notifications"),
                    id,
                    ListPosition::Start,
                );
                Ok(Handled::Applied)
            }
            "conversation" => {
                let id = self.ingest(EntityKind::Conversation, event, &payload)?;
                self.cache.insert_into_list(
                    EntityKind::Conversation,
                    &ListKey::new("conversations"),
                    id,
                    ListPosition::Start,
                );
                Ok(Handled::Applied)
            }
            "filters_changed" => {
                self.cache
                    .invalidate_list(EntityKind::Filter, &ListKey::new("filters"));
                Ok(Handled::Applied)
            }
            "chat_update" => {
                let id = self.ingest(EntityKind::Chat, event, &payload)?;
                // Most recent chat first.
                self.cache.insert_into_list(
                    EntityKind::Chat,
                    &ListKey::new("chats"),
                    id,
                    ListPosition::Start,
                );
                Ok(Handled::Applied)
            }
            "chat_deleted" => {
                if let Some(id) = payload_id(&payload) {
                    self.cache.remove_entity(EntityKind::Chat, &id);
                }
                Ok(Handled::Applied)
            }
            "follow_relationships_update" => {
                let update: FollowRelationshipsEvent = payload_json(event, &payload)?;
                let records = [update.follower, update.following]
                    .into_iter()
                    .map(|counts| {
                        Account {
                            followers_count: counts.follower_count,
                            following_count: counts.following_count,
                            ..Account::partial(counts.id)
                        }
                        .into_record()
                    })
                    .collect();
                self.cache.merge_records(records);
                Ok(Handled::Applied)
            }
            "announcement" => {
                let id = self.ingest(EntityKind::Announcement, event, &payload)?;
                self.cache.insert_into_list(
                    EntityKind::Announcement,
                    &ListKey::new("announcements"),
                    id,
                    ListPosition::End,
                );
                Ok(Handled::Applied)
            }
            "announcement.reaction" => {
                let reaction: AnnouncementReactionEvent = payload_json(event, &payload)?;
                if let Some(mut announcement) =
                    self.cache.get::<Announcement>(&reaction.announcement_id)
                {
                    announcement.apply_reaction(&reaction.name, reaction.count);
                    self.cache.merge_records(vec![announcement.into_record()]);
                }
                Ok(Handled::Applied)
            }
            "announcement.delete" => {
                if let Some(id) = payload_id(&payload) {
                    self.cache.remove_entity(EntityKind::Announcement, &id);
                }
                Ok(Handled::Applied)
            }
            "marker" => {
                let map: serde_json::Map<String, Value> =
                    payload_json(event, &payload)?;
                for (timeline, entry) in map {
                    let Value::Object(mut fields) = entry else {
                        continue;
                    };
                    fields.insert("timeline".to_string(), Value::String(timeline));
                    if let Err(e) = self
                        .cache
                        .ingest_value(EntityKind::Marker, Value::Object(fields))
                    {
                        warn!(error = %e, "dropping invalid marker entry");
                    }
                }
                Ok(Handled::Applied)
            }
            other => {
                warn!(topic = %topic, event = %other, "ignoring unknown stream event");
                Ok(Handled::Ignored)
            }
        }
    }

    fn ingest(&self, kind: EntityKind, event: &str, payload: &str) -> Result<String, StreamError> {
        let value: Value = serde_json::from_str(payload).map_err(|e| StreamError::Payload {
            event: event.to_string(),
            message: e.to_string(),
        })?;
        self.cache
            .ingest_value(kind, value)
            .map_err(|e| StreamError::Payload {
                event: event.to_string(),
                message: e.to_string(),
            })
    }
}

fn payload_json<T: serde::de::DeserializeOwned>(
    event: &str,
    payload: &str,
) -> Result<T, StreamError> {
    serde_json::from_str(payload).map_err(|e| StreamError::Payload {
        event: event.to_string(),
        message: e.to_string(),
    })
}

/// Delete-style payloads arrive as a bare id, a JSON string, or an object
/// with an `id` field depending on the server.
fn payload_id(payload: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(payload) {
        match value {
            Value::String(id) => return Some(id),
            Value::Object(map) => {
                if let Some(Value::String(id)) = map.get("id") {
                    return Some(id.clone());
                }
            }
            _ => {}
        }
    }
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The timeline list a topic's `update` frames feed into.
fn timeline_key(topic: &str) -> Option<ListKey> {
    let (name, params) = match topic.split_once('&') {
        Some((name, params)) => (name, Some(params)),
        None => (topic, None),
    };
    match name {
        "user" => Some(ListKey::new("home")),
        "public" | "public:local" | "public:remote" | "direct" => Some(ListKey::new(name)),
        "hashtag" => topic_param(params?, "tag").map(|tag| ListKey::new("hashtag").with(tag)),
        "list" => topic_param(params?, "list").map(|id| ListKey::new("list").with(id)),
        "group" => topic_param(params?, "group").map(|id| ListKey::new("group").with(id)),
        _ => None,
    }
}

fn topic_param(params: &str, key: &str) -> Option<String> {
    params.split('&').find_map(|pair| {
        pair.split_once('=')
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
}
