use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use stridopt_shared::constants::NOTIFICATIONS;
use stridopt_shared::{DocId, Identity, Notification, NotificationKind, UserId};
use stridopt_store::{fields, to_fields};
use stridopt_sync::catalog;

use crate::error::{ClientError, Result};
use crate::state::Backend;

/// Write an unread notification addressed to `receiver`.
pub async fn notify(
    backend: &Backend,
    kind: NotificationKind,
    sender: &Identity,
    receiver: &UserId,
    message: String,
) -> Result<DocId> {
    let notification = Notification {
        id: DocId::default(),
        kind,
        message,
        sender_id: sender.id.clone(),
        sender_name: sender.display_label(),
        receiver_id: receiver.clone(),
        read: false,
        created_at: Some(Utc::now()),
    };
    let id = backend
        .docs
        .create(NOTIFICATIONS, to_fields(&notification)?)
        .await?;
    debug!(notification = %id, receiver = %receiver, "notification written");
    Ok(DocId::new(id))
}

pub async fn mark_read(backend: &Backend, me: &Identity, id: &DocId) -> Result<()> {
    let doc = backend
        .docs
        .get(NOTIFICATIONS, id.as_str())
        .await?
        .ok_or_else(|| ClientError::not_found("notification", id.as_str()))?;
    let receiver = doc.field("receiverId").and_then(|v| v.as_str());
    if receiver != Some(me.id.as_str()) {
        return Err(ClientError::Forbidden("notification belongs to another user"));
    }
    backend
        .docs
        .update(NOTIFICATIONS, id.as_str(), fields(json!({ "read": true })))
        .await?;
    Ok(())
}

/// Mark every unread notification of `me` as read. Returns how many changed.
pub async fn mark_all_read(backend: &Backend, me: &Identity) -> Result<usize> {
    let unread = backend
        .docs
        .query(&catalog::unread_notifications_for(&me.id))
        .await?;
    let count = unread.len();
    for doc in unread {
        backend
            .docs
            .update(NOTIFICATIONS, &doc.id, fields(json!({ "read": true })))
            .await?;
    }
    info!(count, "notifications marked read");
    Ok(count)
}
