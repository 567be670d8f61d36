//! Queries for every collection the client subscribes to.

use stridopt_shared::constants::{CHATS, EVENTS, FRIENDS, FRIEND_REQUESTS, MESSAGES, NOTIFICATIONS, TASKS, USERS};
use stridopt_shared::{DocId, EventVisibility, FriendStatus, UserId};
use stridopt_store::{Direction, Filter, Query};

/// Events `me` may see: their own, public ones, and friends-only events
/// owned by someone in `friend_ids`.
pub fn visible_events(me: &UserId, friend_ids: &[UserId]) -> Query {
    let mut branches = vec![
        Filter::eq("userId", me.as_str()),
        Filter::eq("visibility", EventVisibility::Public.as_str()),
    ];
    if !friend_ids.is_empty() {
        branches.push(Filter::and([
            Filter::eq("visibility", EventVisibility::Friends.as_str()),
            Filter::one_of("userId", friend_ids.iter().map(UserId::as_str)),
        ]));
    }
    Query::collection(EVENTS)
        .filter(Filter::or(branches))
        .order_by("date", Direction::Ascending)
}

/// Every event regardless of visibility; the attendance streak counts them all.
pub fn all_events() -> Query {
    Query::collection(EVENTS).order_by("date", Direction::Ascending)
}

pub fn accepted_friends(me: &UserId) -> Query {
    Query::collection(FRIENDS)
        .filter(Filter::eq("userId", me.as_str()))
        .filter(Filter::eq("status", FriendStatus::Accepted.as_str()))
}

/// Directional edges `a -> b`, any status.
pub fn edges_between(a: &UserId, b: &UserId) -> Query {
    Query::collection(FRIENDS)
        .filter(Filter::eq("userId", a.as_str()))
        .filter(Filter::eq("friendId", b.as_str()))
}

pub fn incoming_requests(me: &UserId) -> Query {
    Query::collection(FRIEND_REQUESTS)
        .filter(Filter::eq("receiverId", me.as_str()))
        .filter(Filter::eq("status", FriendStatus::Pending.as_str()))
}

pub fn pending_request(from: &UserId, to: &UserId) -> Query {
    Query::collection(FRIEND_REQUESTS)
        .filter(Filter::eq("senderId", from.as_str()))
        .filter(Filter::eq("receiverId", to.as_str()))
        .filter(Filter::eq("status", FriendStatus::Pending.as_str()))
}

pub fn accepted_requests_involving(me: &UserId) -> Query {
    Query::collection(FRIEND_REQUESTS)
        .filter(Filter::eq("status", FriendStatus::Accepted.as_str()))
        .filter(Filter::or([
            Filter::eq("senderId", me.as_str()),
            Filter::eq("receiverId", me.as_str()),
        ]))
}

pub fn chats_for(me: &UserId) -> Query {
    Query::collection(CHATS)
        .filter(Filter::contains("participants", me.as_str()))
        .order_by("lastMessageTime", Direction::Descending)
}

pub fn messages_in(chat: &DocId) -> Query {
    Query::collection(MESSAGES)
        .filter(Filter::eq("chatId", chat.as_str()))
        .order_by("timestamp", Direction::Descending)
}

pub fn notifications_for(me: &UserId) -> Query {
    Query::collection(NOTIFICATIONS)
        .filter(Filter::eq("receiverId", me.as_str()))
        .order_by("createdAt", Direction::Descending)
}

pub fn unread_notifications_for(me: &UserId) -> Query {
    Query::collection(NOTIFICATIONS)
        .filter(Filter::eq("receiverId", me.as_str()))
        .filter(Filter::eq("read", false))
}

pub fn tasks_for(me: &UserId) -> Query {
    Query::collection(TASKS)
        .filter(Filter::eq("userId", me.as_str()))
        .order_by("createdAt", Direction::Ascending)
}

pub fn all_users() -> Query {
    Query::collection(USERS).order_by("fullName", Direction::Ascending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stridopt_store::{fields, Document};

    fn event(id: &str, owner: &str, visibility: &str) -> Document {
        Document::new(
            id,
            fields(json!({ "userId": owner, "visibility": visibility, "date": "2024-05-01" })),
        )
    }

    #[test]
    fn visible_events_without_friends() {
        let me = UserId::new("me");
        let q = visible_events(&me, &[]);
        assert!(q.matches(&event("1", "me", "private")));
        assert!(q.matches(&event("2", "x", "public")));
        assert!(!q.matches(&event("3", "x", "friends")));
    }

    #[test]
    fn visible_events_with_friends() {
        let me = UserId::new("me");
        let q = visible_events(&me, &[UserId::new("bob")]);
        assert!(q.matches(&event("1", "bob", "friends")));
        assert!(!q.matches(&event("2", "bob", "private")));
        assert!(!q.matches(&event("3", "eve", "friends")));
    }

    #[test]
    fn accepted_requests_either_side() {
        let me = UserId::new("me");
        let q = accepted_requests_involving(&me);
        let sent = Document::new("r1", fields(json!({ "senderId": "me", "receiverId": "b", "status": "accepted" })));
        let got = Document::new("r2", fields(json!({ "senderId": "b", "receiverId": "me", "status": "accepted" })));
        let pending = Document::new("r3", fields(json!({ "senderId": "me", "receiverId": "c", "status": "pending" })));
        assert!(q.matches(&sent));
        assert!(q.matches(&got));
        assert!(!q.matches(&pending));
    }
}
