//! Values derived from feed snapshots. All pure; recomputed from scratch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use stridopt_shared::constants::DAY_MS;
use stridopt_shared::{Event, FriendEdge, Notification, UserId};

/// Consecutive-day attendance streak ending at `now`.
///
/// Walks events from the most recent backwards. Each step measures whole days
/// between the cursor and the event; a gap of more than one day, or an event
/// `me` did not attend, ends the streak. Events with unparseable dates are
/// ignored. Without an identity the streak is zero.
pub fn current_streak(events: &[Event], me: Option<&UserId>, now: DateTime<Utc>) -> u32 {
    let Some(me) = me else {
        return 0;
    };

    let mut dated: Vec<(DateTime<Utc>, &Event)> = events
        .iter()
        .filter_map(|e| e.parsed_date().map(|d| (d, e)))
        .collect();
    dated.sort_by_key(|(date, _)| *date);

    let mut streak = 0;
    let mut cursor = now;
    for (date, event) in dated.iter().rev() {
        let days = (cursor - *date).num_milliseconds().div_euclid(DAY_MS);
        if days > 1 {
            break;
        }
        if !event.is_attended_by(me) {
            break;
        }
        streak += 1;
        cursor = *date;
    }
    streak
}

/// Number of events `me` is listed as attending.
pub fn joined_events(events: &[Event], me: &UserId) -> usize {
    events.iter().filter(|e| e.is_attended_by(me)).count()
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

/// Keep the first edge per friend id, preserving order.
pub fn dedupe_friends(edges: Vec<FriendEdge>) -> Vec<FriendEdge> {
    let mut seen = HashSet::new();
    edges
        .into_iter()
        .filter(|edge| seen.insert(edge.friend_id.clone()))
        .collect()
}
