//! Folds semantically-equivalent notifications into one display entry.
//!
//! Five "liked your post" notifications for the same status become a single
//! entry carrying all five actors. Grouping is independent of arrival
//! order; the first-seen member of a group is its representative.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::entities::{Notification, NotificationKind};

/// One display entry: a representative notification plus the actors and
/// ids of every notification folded into it.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationGroup {
    pub notification: Notification,
    /// Actor ids in arrival order, representative's actor first.
    pub account_ids: Vec<String>,
    /// Ids folded away into this group. Excluded from by-id lookups that
    /// expect a single representative per group.
    pub folded_ids: Vec<String>,
}

impl NotificationGroup {
    pub fn represents(&self, id: &str) -> bool {
        self.notification.id == id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    /// Reactions to the same status of the same kind fold together.
    Status {
        kind: NotificationKind,
        status_id: String,
    },
    /// Emoji reactions additionally split by the reaction identifier.
    Reaction { status_id: String, emoji: String },
    /// Follows fold into one "followed you" entry.
    Follow,
    /// Everything else stays its own entry.
    Single { id: String },
}

fn group_key(notification: &Notification) -> GroupKey {
    match &notification.kind {
        NotificationKind::Favourite | NotificationKind::Reblog => {
            match &notification.status_id {
                Some(status_id) => GroupKey::Status {
                    kind: notification.kind.clone(),
                    status_id: status_id.clone(),
                },
                None => GroupKey::Single {
                    id: notification.id.clone(),
                },
            }
        }
        NotificationKind::EmojiReaction => {
            match (&notification.status_id, &notification.emoji) {
                (Some(status_id), Some(emoji)) => GroupKey::Reaction {
                    status_id: status_id.clone(),
                    emoji: emoji.clone(),
                },
                _ => GroupKey::Single {
                    id: notification.id.clone(),
                },
            }
        }
        NotificationKind::Follow => GroupKey::Follow,
        _ => GroupKey::Single {
            id: notification.id.clone(),
        },
    }
}

/// Fold an ordered batch. Order of first appearance is preserved; later
/// duplicates contribute only their actor to the earliest equivalent entry.
pub fn fold_notifications(items: &[Notification]) -> Vec<NotificationGroup> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, NotificationGroup> = HashMap::new();

    for notification in items {
        let key = group_key(notification);
        match groups.entry(key) {
            Entry::Occupied(mut entry) => {
                let group = entry.get_mut();
                if let Some(account_id) = &notification.account_id {
                    if !group.account_ids.contains(account_id) {
                        group.account_ids.push(account_id.clone());
                    }
                }
                group.folded_ids.push(notification.id.clone());
            }
            Entry::Vacant(entry) => {
                order.push(entry.key().clone());
                entry.insert(NotificationGroup {
                    notification: notification.clone(),
                    account_ids: notification.account_id.iter().cloned().collect(),
                    folded_ids: Vec::new(),
                });
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::fold_notifications;
    use crate::entities::{Notification, NotificationKind};

    fn notification(id: &str, kind: NotificationKind, account: &str, status: Option<&str>) -> Notification {
        Notification {
            id: id.to_string(),
            kind,
            account_id: Some(account.to_string()),
            status_id: status.map(str::to_string),
            ..Notification::default()
        }
    }

    #[test]
    fn favourites_of_one_status_fold_into_one_entry() {
        let items = vec![
            notification("n1", NotificationKind::Favourite, "A", Some("s1")),
            notification("n2", NotificationKind::Favourite, "B", Some("s1")),
            notification("n3", NotificationKind::Favourite, "C", Some("s1")),
            notification("n4", NotificationKind::Reblog, "D", Some("s1")),
        ];
        let groups = fold_notifications(&items);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].notification.id, "n1");
        assert_eq!(groups[0].account_ids, vec!["A", "B", "C"]);
        assert_eq!(groups[0].folded_ids, vec!["n2", "n3"]);
        assert_eq!(groups[1].notification.id, "n4");
        assert_eq!(groups[1].account_ids, vec!["D"]);
    }

    #[test]
    fn emoji_reactions_split_by_emoji() {
        let mut first = notification("n1", NotificationKind::EmojiReaction, "A", Some("s1"));
        first.emoji = Some("🔥".to_string());
        let mut second = notification("n2", NotificationKind::EmojiReaction, "B", Some("s1"));
        second.emoji = Some("🎉".to_string());
        let mut third = notification("n3", NotificationKind::EmojiReaction, "C", Some("s1"));
        third.emoji = Some("🔥".to_string());

        let groups = fold_notifications(&[first, second, third]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].account_ids, vec!["A", "C"]);
        assert_eq!(groups[1].account_ids, vec!["B"]);
    }

    #[test]
    fn mentions_never_fold() {
        let items = vec![
            notification("n1", NotificationKind::Mention, "A", Some("s1")),
            notification("n2", NotificationKind::Mention, "B", Some("s1")),
        ];
        let groups = fold_notifications(&items);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn representative_lookup_excludes_folded_duplicates() {
        let items = vec![
            notification("n1", NotificationKind::Favourite, "A", Some("s1")),
            notification("n2", NotificationKind::Favourite, "B", Some("s1")),
        ];
        let groups = fold_notifications(&items);
        assert!(groups[0].represents("n1"));
        assert!(!groups[0].represents("n2"));
        assert!(groups[0].folded_ids.contains(&"n2".to_string()));
    }

    #[test]
    fn same_actor_is_counted_once() {
        let items = vec![
            notification("n1", NotificationKind::Follow, "A", None),
            notification("n2", NotificationKind::Follow, "A", None),
            notification("n3", NotificationKind::Follow, "B", None),
        ];
        let groups = fold_notifications(&items);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].account_ids, vec!["A", "B"]);
    }
}
