//! Client-resident entity cache and real-time synchronization core for a
//! federated social-media client.
//!
//! Remote objects fetched in paginated batches over HTTP and patched by a
//! push-event stream are normalized into one record table per entity kind,
//! so every concurrently-rendering consumer observes the same
//! de-duplicated state. The HTTP client and the socket transport stay
//! outside this crate; callers supply fetch functions and drive the
//! streaming dispatcher with received frames.

mod cache;
mod config;
mod dedup;
mod entities;
mod error;
mod logging;
mod normalize;
mod store;
mod streaming;

pub use cache::{
    BatchFetcher, EntityCache, EntityFetcher, FetchOutcome, ListSnapshot, Lookup, Page,
    PageFetcher, StoreEvent,
};
pub use config::{load_cache_config, CacheConfig};
pub use dedup::{fold_notifications, NotificationGroup};
pub use entities::{
    Account, Announcement, AnnouncementReaction, Chat, Conversation, Entity, EntityKind, Filter,
    Group, GroupRelationship, Marker, Notification, NotificationKind, Poll, PollOption, Record,
    Relationship, Status,
};
pub use error::{FetchError, StreamError};
pub use logging::init_logging;
pub use store::{EntityStore, ListKey, ListPosition, ListState, PageCursor};
pub use streaming::{
    Handled, PollFallback, StreamLifecycle, StreamingDispatcher, TopicPhase,
};
