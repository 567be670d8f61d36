//! Typed live feeds for each screen.
//!
//! A feed owns one [`LiveSlot`] keyed by the inputs its query depends on.
//! Binding with new inputs closes the previous subscription before the next
//! one opens; binding with no identity just closes it.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use stridopt_shared::{Chat, DocId, Event, FriendEdge, FriendRequest, Identity, Message, Notification, Task, UserId};
use stridopt_store::{DocumentStore, Query};
use stridopt_sync::{catalog, LiveEvent, LiveQuery, LiveSlot, LiveStatus, RetryPolicy, SyncError};

use crate::aggregates::{current_streak, joined_events, unread_count};
use crate::commands::friends::enrich_friends;
use crate::error::Result;
use crate::state::Backend;

pub struct Feed<K, T> {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    slot: LiveSlot<K, T>,
}

impl<K, T> Feed<K, T>
where
    K: PartialEq + Debug,
    T: DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(backend: &Backend, policy: RetryPolicy) -> Self {
        Self {
            store: backend.docs.clone(),
            policy,
            slot: LiveSlot::new(),
        }
    }

    /// Subscribe to `query(key)` unless `key` is already bound.
    pub fn bind_query(&mut self, key: K, query: impl FnOnce(&K) -> Query) -> bool {
        let store = self.store.clone();
        let policy = self.policy;
        self.slot
            .bind(key, |key| LiveQuery::decoded(store, query(key), policy))
    }

    /// Next event of the bound subscription. `None` when unbound or closed.
    pub async fn next(&mut self) -> Option<LiveEvent<T>> {
        self.slot.next().await
    }

    pub fn items(&self) -> &[T] {
        self.slot.items()
    }

    /// `None` while nothing is bound.
    pub fn status(&self) -> Option<&LiveStatus> {
        self.slot.get().map(LiveQuery::status)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some_and(|live| live.view().loaded)
    }

    pub fn key(&self) -> Option<&K> {
        self.slot.key()
    }

    /// Re-establish a failed subscription.
    pub fn retry(&self) -> Result<()> {
        match self.slot.get() {
            Some(live) => Ok(live.retry()?),
            None => Err(SyncError::Closed.into()),
        }
    }

    pub fn clear(&mut self) {
        self.slot.clear();
    }

    fn bind_user(&mut self, me: Option<&Identity>, query: fn(&UserId) -> Query) -> bool
    where
        K: From<UserId>,
    {
        match me {
            Some(me) => self.bind_query(K::from(me.id.clone()), |_| query(&me.id)),
            None => {
                self.clear();
                false
            }
        }
    }
}

pub type TasksFeed = Feed<UserId, Task>;
pub type RequestsFeed = Feed<UserId, FriendRequest>;
pub type ChatsFeed = Feed<UserId, Chat>;
pub type NotificationsFeed = Feed<UserId, Notification>;
pub type MessagesFeed = Feed<DocId, Message>;
pub type EventsFeed = Feed<(UserId, Vec<UserId>), Event>;

impl Feed<UserId, Task> {
    pub fn bind(&mut self, me: Option<&Identity>) -> bool {
        self.bind_user(me, catalog::tasks_for)
    }
}

impl Feed<UserId, FriendRequest> {
    /// Pending requests addressed to `me`.
    pub fn bind(&mut self, me: Option<&Identity>) -> bool {
        self.bind_user(me, catalog::incoming_requests)
    }
}

impl Feed<UserId, Chat> {
    pub fn bind(&mut self, me: Option<&Identity>) -> bool {
        self.bind_user(me, catalog::chats_for)
    }
}

impl Feed<UserId, Notification> {
    pub fn bind(&mut self, me: Option<&Identity>) -> bool {
        self.bind_user(me, catalog::notifications_for)
    }

    pub fn unread_count(&self) -> usize {
        unread_count(self.items())
    }
}

impl Feed<DocId, Message> {
    pub fn bind(&mut self, chat: Option<&DocId>) -> bool {
        match chat {
            Some(chat) => self.bind_query(chat.clone(), catalog::messages_in),
            None => {
                self.clear();
                false
            }
        }
    }

    /// Messages are delivered newest first; conversations read oldest first.
    pub fn oldest_first(&self) -> Vec<Message> {
        self.items().iter().rev().cloned().collect()
    }
}

impl Feed<(UserId, Vec<UserId>), Event> {
    /// Events visible to `me` given the current friend set. Reordering or
    /// repeating friend ids does not re-subscribe.
    pub fn bind(&mut self, me: Option<&Identity>, friend_ids: &[UserId]) -> bool {
        let Some(me) = me else {
            self.clear();
            return false;
        };
        let mut friends = friend_ids.to_vec();
        friends.sort();
        friends.dedup();
        self.bind_query((me.id.clone(), friends), |(me, friends)| {
            catalog::visible_events(me, friends)
        })
    }
}

/// Accepted friends of `me`, enriched from profile documents on every
/// snapshot.
pub struct FriendsFeed {
    backend: Backend,
    feed: Feed<UserId, FriendEdge>,
    friends: Vec<FriendEdge>,
}

impl FriendsFeed {
    pub fn new(backend: &Backend, policy: RetryPolicy) -> Self {
        Self {
            backend: backend.clone(),
            feed: Feed::new(backend, policy),
            friends: Vec::new(),
        }
    }

    pub fn bind(&mut self, me: Option<&Identity>) -> bool {
        let rebound = self.feed.bind_user(me, catalog::accepted_friends);
        if rebound || me.is_none() {
            self.friends.clear();
        }
        rebound
    }

    /// Snapshots are passed on after enrichment.
    pub async fn next(&mut self) -> Option<LiveEvent<FriendEdge>> {
        match self.feed.next().await? {
            LiveEvent::Snapshot(edges) => {
                self.friends = enrich_friends(&self.backend, edges).await;
                debug!(count = self.friends.len(), "friends refreshed");
                Some(LiveEvent::Snapshot(self.friends.clone()))
            }
            other => Some(other),
        }
    }

    pub fn friends(&self) -> &[FriendEdge] {
        &self.friends
    }

    pub fn friend_ids(&self) -> Vec<UserId> {
        self.friends.iter().map(|f| f.friend_id.clone()).collect()
    }

    pub fn status(&self) -> Option<&LiveStatus> {
        self.feed.status()
    }

    pub fn retry(&self) -> Result<()> {
        self.feed.retry()
    }

    pub fn clear(&mut self) {
        self.feed.clear();
        self.friends.clear();
    }
}

/// Attendance streak of `me`, recomputed on every snapshot of all events.
pub struct StreakTracker {
    feed: Feed<UserId, Event>,
    me: Option<UserId>,
    streak: u32,
}

impl StreakTracker {
    pub fn new(backend: &Backend, policy: RetryPolicy) -> Self {
        Self {
            feed: Feed::new(backend, policy),
            me: None,
            streak: 0,
        }
    }

    /// Follow `me`. Without an identity the streak is zero and nothing is
    /// subscribed.
    pub fn bind(&mut self, me: Option<&Identity>) -> bool {
        let uid = me.map(|m| m.id.clone());
        if uid != self.me {
            self.me = uid;
            self.streak = 0;
        }
        self.feed.bind_user(me, |_| catalog::all_events())
    }

    /// Wait for the next feed event and return the streak after it.
    pub async fn next(&mut self) -> Option<u32> {
        let event = self.feed.next().await?;
        Some(self.observe(&event, Utc::now()))
    }

    /// Fold one event. Only snapshots change the streak.
    pub fn observe(&mut self, event: &LiveEvent<Event>, now: DateTime<Utc>) -> u32 {
        if let LiveEvent::Snapshot(events) = event {
            self.streak = current_streak(events, self.me.as_ref(), now);
            debug!(streak = self.streak, events = events.len(), "streak recomputed");
        }
        self.streak
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Events `me` has joined, from the latest snapshot.
    pub fn joined_events(&self) -> usize {
        self.me
            .as_ref()
            .map_or(0, |me| joined_events(self.feed.items(), me))
    }

    pub fn status(&self) -> Option<&LiveStatus> {
        self.feed.status()
    }

    pub fn retry(&self) -> Result<()> {
        self.feed.retry()
    }
}
