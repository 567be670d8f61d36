//! Document models mirrored from the backend collections.
//!
//! Field names serialize in camelCase so a model can be written to, and read
//! from, the document store as-is. The `id` of every document is assigned by
//! the backend and injected on read; it is never written back as a field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{IMAGE_MESSAGE_PREVIEW, UNKNOWN_USER};
use crate::types::*;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The profile document of an authenticated user (`users/{uid}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(rename = "uid")]
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_color: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Name shown to other users: full name, else the email's local part,
    /// else a fixed placeholder.
    pub fn display_label(&self) -> String {
        display_label(Some(&self.full_name), Some(&self.email))
    }
}

/// Shared fallback chain for denormalized display names.
pub fn display_label(name: Option<&str>, email: Option<&str>) -> String {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .and_then(|e| e.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One entry of an event's embedded attendee array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AttendeeStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Event day as stored by the backend. Kept raw: documents written by
    /// older clients may carry values that do not parse.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Owner of the event.
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub creator_id: UserId,
    #[serde(default)]
    pub visibility: EventVisibility,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_attended_by(&self, user: &UserId) -> bool {
        self.attendees.iter().any(|a| &a.user_id == user)
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }

    /// Parse [`Event::date`]. Accepts RFC 3339 timestamps, naive
    /// `YYYY-MM-DDTHH:MM:SS` (read as UTC) and bare `YYYY-MM-DD` (UTC
    /// midnight). Returns `None` for anything else.
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        parse_event_date(&self.date)
    }
}

pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Friends
// ---------------------------------------------------------------------------

/// One directional friend record, owned by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FriendEdge {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    pub user_id: UserId,
    pub friend_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub status: FriendStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub status: FriendStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FriendRequest {
    /// The other side of the request as seen from `me`.
    pub fn counterpart(&self, me: &UserId) -> &UserId {
        if &self.sender_id == me {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.iter().any(|p| p == user)
    }

    /// A direct chat between exactly `a` and `b`.
    pub fn is_direct_between(&self, a: &UserId, b: &UserId) -> bool {
        self.kind == ChatKind::Direct
            && self.has_participant(a)
            && self.has_participant(b)
            && self.participants.iter().all(|p| p == a || p == b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    pub chat_id: DocId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Text stored in the chat's denormalized `lastMessage` field.
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text => self.text.clone().unwrap_or_default(),
            MessageKind::Image => IMAGE_MESSAGE_PREVIEW.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub message: String,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: String,
    pub receiver_id: UserId,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing)]
    pub id: DocId,
    pub user_id: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "type", default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_completed: Option<DateTime<Utc>>,
}
