//! Chats and messages.
//!
//! Sending writes the message, then copies its preview into the chat's
//! `lastMessage`/`lastMessageTime` so chat lists can sort without reading
//! messages. Both timestamps are epoch milliseconds.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use stridopt_shared::constants::{CHATS, CHAT_IMAGES_PREFIX, DEFAULT_GROUP_NAME, MESSAGES};
use stridopt_shared::error::Field;
use stridopt_shared::{Chat, ChatKind, DocId, Identity, Message, MessageKind, UserId, ValidationError};
use stridopt_store::{fields, to_fields};
use stridopt_sync::catalog;

use super::require_doc;
use crate::error::{ClientError, Result};
use crate::state::Backend;

/// Participants of a new chat: `members` in order, deduplicated, then `me`.
fn participants(me: &UserId, members: &[UserId]) -> Vec<UserId> {
    let mut out: Vec<UserId> = Vec::with_capacity(members.len() + 1);
    for member in members.iter().filter(|m| *m != me) {
        if !out.contains(member) {
            out.push(member.clone());
        }
    }
    out.push(me.clone());
    out
}

pub async fn create_group_chat(
    backend: &Backend,
    me: &Identity,
    name: &str,
    members: &[UserId],
) -> Result<DocId> {
    let participants = participants(&me.id, members);
    if participants.len() < 2 {
        return Err(ValidationError::new(Field::Text, "Please select at least one friend").into());
    }

    let name = name.trim();
    let now = Utc::now();
    let chat = Chat {
        kind: ChatKind::Group,
        participants,
        name: Some(if name.is_empty() { DEFAULT_GROUP_NAME.to_string() } else { name.to_string() }),
        created_by: Some(me.id.clone()),
        last_message: None,
        last_message_time: Some(now),
        created_at: Some(now),
        ..Default::default()
    };
    let id = backend.docs.create(CHATS, to_fields(&chat)?).await?;
    info!(chat = %id, members = chat.participants.len(), "group chat created");
    Ok(DocId::new(id))
}

/// The direct chat between `me` and `other`, created on first use.
pub async fn open_direct_chat(backend: &Backend, me: &Identity, other: &UserId) -> Result<DocId> {
    if &me.id == other {
        return Err(ClientError::Invalid("cannot open a chat with yourself"));
    }

    let existing = backend.docs.query(&catalog::chats_for(&me.id)).await?;
    for doc in existing {
        let direct = doc
            .decode::<Chat>()
            .is_ok_and(|chat| chat.is_direct_between(&me.id, other));
        if direct {
            debug!(chat = %doc.id, "reusing direct chat");
            return Ok(DocId::new(doc.id));
        }
    }

    let now = Utc::now();
    let chat = Chat {
        kind: ChatKind::Direct,
        participants: vec![other.clone(), me.id.clone()],
        created_by: Some(me.id.clone()),
        last_message: Some(String::new()),
        last_message_time: Some(now),
        created_at: Some(now),
        ..Default::default()
    };
    let id = backend.docs.create(CHATS, to_fields(&chat)?).await?;
    info!(chat = %id, with = %other, "direct chat created");
    Ok(DocId::new(id))
}

async fn member_chat(backend: &Backend, me: &Identity, chat_id: &DocId) -> Result<Chat> {
    let doc = backend.docs.get(CHATS, chat_id.as_str()).await?;
    let chat: Chat = require_doc(doc, "chat", chat_id.as_str())?;
    if !chat.has_participant(&me.id) {
        return Err(ClientError::Forbidden("not a participant of this chat"));
    }
    Ok(chat)
}

pub async fn send_text(backend: &Backend, me: &Identity, chat_id: &DocId, text: &str) -> Result<DocId> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::new(Field::Text, "Message cannot be empty").into());
    }
    member_chat(backend, me, chat_id).await?;

    let message = Message {
        chat_id: chat_id.clone(),
        sender_id: me.id.clone(),
        sender_name: Some(me.display_label()),
        kind: MessageKind::Text,
        text: Some(text.to_string()),
        timestamp: Some(Utc::now()),
        ..Default::default()
    };
    deliver(backend, message).await
}

/// Upload `image` and post it as a message.
pub async fn send_image(backend: &Backend, me: &Identity, chat_id: &DocId, image: Bytes) -> Result<DocId> {
    if image.is_empty() {
        return Err(ClientError::Invalid("image is empty"));
    }
    member_chat(backend, me, chat_id).await?;

    let now = Utc::now();
    let path = format!("{CHAT_IMAGES_PREFIX}/{chat_id}/{}", now.timestamp_millis());
    let url = backend.blobs.put(&path, image).await?;
    debug!(chat = %chat_id, path = %path, "chat image uploaded");

    let message = Message {
        chat_id: chat_id.clone(),
        sender_id: me.id.clone(),
        sender_name: Some(me.display_label()),
        kind: MessageKind::Image,
        image_url: Some(url),
        timestamp: Some(now),
        ..Default::default()
    };
    deliver(backend, message).await
}

async fn deliver(backend: &Backend, message: Message) -> Result<DocId> {
    let sent_at: DateTime<Utc> = message.timestamp.unwrap_or_else(Utc::now);
    let id = backend.docs.create(MESSAGES, to_fields(&message)?).await?;
    backend
        .docs
        .update(
            CHATS,
            message.chat_id.as_str(),
            fields(json!({
                "lastMessage": message.preview(),
                "lastMessageTime": sent_at.timestamp_millis(),
            })),
        )
        .await?;
    debug!(chat = %message.chat_id, message = %id, "message sent");
    Ok(DocId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stridopt_shared::constants::IMAGE_MESSAGE_PREVIEW;
    use stridopt_store::MemoryBackend;

    fn identity(uid: &str) -> Identity {
        Identity {
            id: UserId::new(uid),
            email: format!("{uid}@example.com"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_chat_is_reused() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let (ana, bo) = (identity("ana"), identity("bo"));

        let first = open_direct_chat(&backend, &ana, &bo.id).await.unwrap();
        let again = open_direct_chat(&backend, &bo, &ana.id).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(memory.documents(CHATS).len(), 1);
    }

    #[tokio::test]
    async fn group_chat_defaults() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let ana = identity("ana");

        let err = create_group_chat(&backend, &ana, "", &[ana.id.clone()]).await.unwrap_err();
        assert_eq!(err.field(), Some(Field::Text));

        let members = [UserId::new("bo"), UserId::new("cy"), UserId::new("bo")];
        create_group_chat(&backend, &ana, "  ", &members).await.unwrap();
        let chat: Chat = memory.documents(CHATS)[0].decode().unwrap();
        assert_eq!(chat.name.as_deref(), Some(DEFAULT_GROUP_NAME));
        assert_eq!(chat.participants, vec![UserId::new("bo"), UserId::new("cy"), ana.id.clone()]);
        assert_eq!(chat.kind, ChatKind::Group);
    }

    #[tokio::test]
    async fn sending_updates_last_message() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let (ana, bo) = (identity("ana"), identity("bo"));
        let chat_id = open_direct_chat(&backend, &ana, &bo.id).await.unwrap();

        let err = send_text(&backend, &ana, &chat_id, "   ").await.unwrap_err();
        assert_eq!(err.user_message(), "Message cannot be empty");

        send_text(&backend, &ana, &chat_id, " hello ").await.unwrap();
        let chat: Chat = memory.documents(CHATS)[0].decode().unwrap();
        assert_eq!(chat.last_message.as_deref(), Some("hello"));

        send_image(&backend, &bo, &chat_id, Bytes::from_static(b"png")).await.unwrap();
        let chat: Chat = memory.documents(CHATS)[0].decode().unwrap();
        assert_eq!(chat.last_message.as_deref(), Some(IMAGE_MESSAGE_PREVIEW));
        assert!(chat.last_message_time.is_some());

        let messages = memory.documents(MESSAGES);
        assert_eq!(messages.len(), 2);
        let image = messages
            .iter()
            .map(|d| d.decode::<Message>().unwrap())
            .find(|m| m.kind == MessageKind::Image)
            .unwrap();
        let url = image.image_url.unwrap();
        assert!(url.starts_with(&format!("memory://{CHAT_IMAGES_PREFIX}/{chat_id}/")));

        let stranger = identity("eve");
        assert!(matches!(
            send_text(&backend, &stranger, &chat_id, "hi").await,
            Err(ClientError::Forbidden(_))
        ));
    }
}
