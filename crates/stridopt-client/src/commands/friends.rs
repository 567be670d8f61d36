//! Friend requests and the symmetric friend edges they produce.
//!
//! Acceptance writes three documents without a transaction. Every step is an
//! idempotent "ensure", so re-running it (or [`reconcile_friendships`]) after
//! a partial failure converges on the complete state.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use stridopt_shared::constants::{FRIENDS, FRIEND_REQUESTS, UNKNOWN_EMAIL, UNKNOWN_USER, USERS};
use stridopt_shared::{
    display_label, DocId, FriendEdge, FriendRequest, FriendStatus, Identity, NotificationKind, UserId,
};
use stridopt_store::{fields, to_fields};
use stridopt_sync::catalog;

use super::{decode_identity, notifications, now_value, require_doc};
use crate::aggregates::dedupe_friends;
use crate::error::{ClientError, Result};
use crate::state::Backend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(DocId),
    /// A pending request from the same sender to the same receiver exists.
    AlreadyPending,
}

/// Send a friend request unless an identical one is already pending.
///
/// The pre-check is advisory: two concurrent sends can both pass it.
pub async fn send_friend_request(backend: &Backend, me: &Identity, receiver: &UserId) -> Result<SendOutcome> {
    if &me.id == receiver {
        return Err(ClientError::Invalid("cannot send a friend request to yourself"));
    }

    let existing = backend
        .docs
        .query(&catalog::pending_request(&me.id, receiver))
        .await?;
    if !existing.is_empty() {
        debug!(receiver = %receiver, "friend request already pending");
        return Ok(SendOutcome::AlreadyPending);
    }

    let sender_name = me.display_label();
    let request = FriendRequest {
        sender_id: me.id.clone(),
        receiver_id: receiver.clone(),
        sender_email: Some(me.email.clone()),
        sender_name: Some(sender_name.clone()),
        status: FriendStatus::Pending,
        created_at: Some(chrono::Utc::now()),
        ..Default::default()
    };
    let id = backend.docs.create(FRIEND_REQUESTS, to_fields(&request)?).await?;

    notifications::notify(
        backend,
        NotificationKind::FriendRequest,
        me,
        receiver,
        format!("{sender_name} sent you a friend request"),
    )
    .await?;

    info!(request = %id, receiver = %receiver, "friend request sent");
    Ok(SendOutcome::Sent(DocId::new(id)))
}

/// Accept an incoming request: mark it accepted, then ensure both edges.
/// Safe to call again on an already-accepted request.
pub async fn accept_friend_request(backend: &Backend, me: &Identity, request_id: &DocId) -> Result<()> {
    let doc = backend.docs.get(FRIEND_REQUESTS, request_id.as_str()).await?;
    let request: FriendRequest = require_doc(doc, "friend request", request_id.as_str())?;

    if request.receiver_id != me.id {
        return Err(ClientError::Forbidden("only the receiver can accept a friend request"));
    }
    match request.status {
        FriendStatus::Rejected => return Err(ClientError::Invalid("friend request was rejected")),
        FriendStatus::Pending => {
            backend
                .docs
                .update(
                    FRIEND_REQUESTS,
                    request_id.as_str(),
                    fields(serde_json::json!({
                        "status": FriendStatus::Accepted.as_str(),
                        "updatedAt": now_value(),
                    })),
                )
                .await?;
        }
        FriendStatus::Accepted => {}
    }

    let created = ensure_both_edges(backend, &request.sender_id, &request.receiver_id).await?;
    info!(request = %request_id, edges_created = created, "friend request accepted");
    Ok(())
}

pub async fn reject_friend_request(backend: &Backend, me: &Identity, request_id: &DocId) -> Result<()> {
    let doc = backend.docs.get(FRIEND_REQUESTS, request_id.as_str()).await?;
    let request: FriendRequest = require_doc(doc, "friend request", request_id.as_str())?;

    if request.receiver_id != me.id {
        return Err(ClientError::Forbidden("only the receiver can reject a friend request"));
    }
    if request.status != FriendStatus::Pending {
        return Err(ClientError::Invalid("friend request is no longer pending"));
    }

    backend
        .docs
        .update(
            FRIEND_REQUESTS,
            request_id.as_str(),
            fields(serde_json::json!({
                "status": FriendStatus::Rejected.as_str(),
                "updatedAt": now_value(),
            })),
        )
        .await?;
    info!(request = %request_id, "friend request rejected");
    Ok(())
}

/// Delete the friendship in both directions, together with the accepted
/// requests that established it. Returns how many edges were deleted.
///
/// Requests go first: a sweep running between the two steps must not find an
/// accepted request whose edges are half gone.
pub async fn remove_friend(backend: &Backend, me: &Identity, friend: &UserId) -> Result<usize> {
    let requests = backend
        .docs
        .query(&catalog::accepted_requests_involving(&me.id))
        .await?;
    for doc in requests {
        let links_pair = doc
            .decode::<FriendRequest>()
            .is_ok_and(|request| request.counterpart(&me.id) == friend);
        if links_pair {
            backend.docs.delete(FRIEND_REQUESTS, &doc.id).await?;
        }
    }

    let mut removed = 0;
    for query in [catalog::edges_between(&me.id, friend), catalog::edges_between(friend, &me.id)] {
        for doc in backend.docs.query(&query).await? {
            backend.docs.delete(FRIENDS, &doc.id).await?;
            removed += 1;
        }
    }
    info!(friend = %friend, removed, "friend removed");
    Ok(removed)
}

/// Repair sweep: every accepted request involving `me` must have both
/// edges. Returns how many edges were (re)created.
pub async fn reconcile_friendships(backend: &Backend, me: &Identity) -> Result<usize> {
    let requests = backend
        .docs
        .query(&catalog::accepted_requests_involving(&me.id))
        .await?;

    let mut seen = HashSet::new();
    let mut repaired = 0;
    for doc in requests {
        let request: FriendRequest = match doc.decode() {
            Ok(r) => r,
            Err(e) => {
                warn!(request = %doc.id, error = %e, "skipping undecodable friend request");
                continue;
            }
        };
        let pair = if request.sender_id.as_str() < request.receiver_id.as_str() {
            (request.sender_id.clone(), request.receiver_id.clone())
        } else {
            (request.receiver_id.clone(), request.sender_id.clone())
        };
        if !seen.insert(pair) {
            continue;
        }
        repaired += ensure_both_edges(backend, &request.sender_id, &request.receiver_id).await?;
    }

    if repaired > 0 {
        warn!(repaired, "repaired half-applied friendships");
    }
    Ok(repaired)
}

async fn ensure_both_edges(backend: &Backend, a: &UserId, b: &UserId) -> Result<usize> {
    let a_profile = load_profile(backend, a).await;
    let b_profile = load_profile(backend, b).await;
    let mut created = 0;
    if ensure_edge(backend, b, a, a_profile.as_ref()).await? {
        created += 1;
    }
    if ensure_edge(backend, a, b, b_profile.as_ref()).await? {
        created += 1;
    }
    Ok(created)
}

/// Make sure an accepted `owner -> friend` edge exists. Returns `true` when
/// an edge was created.
async fn ensure_edge(
    backend: &Backend,
    owner: &UserId,
    friend: &UserId,
    friend_profile: Option<&Identity>,
) -> Result<bool> {
    let existing = backend.docs.query(&catalog::edges_between(owner, friend)).await?;

    if let Some(doc) = existing.first() {
        let accepted = doc
            .field("status")
            .and_then(|s| s.as_str())
            .is_some_and(|s| s == FriendStatus::Accepted.as_str());
        if !accepted {
            backend
                .docs
                .update(
                    FRIENDS,
                    &doc.id,
                    fields(serde_json::json!({
                        "status": FriendStatus::Accepted.as_str(),
                        "updatedAt": now_value(),
                    })),
                )
                .await?;
        }
        return Ok(false);
    }

    let now = chrono::Utc::now();
    let edge = FriendEdge {
        user_id: owner.clone(),
        friend_id: friend.clone(),
        friend_email: friend_profile.map(|p| p.email.clone()),
        friend_name: Some(friend_label(friend_profile)),
        profile_image: friend_profile.and_then(|p| p.profile_image.clone()),
        status: FriendStatus::Accepted,
        created_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    };
    backend.docs.create(FRIENDS, to_fields(&edge)?).await?;
    debug!(owner = %owner, friend = %friend, "friend edge created");
    Ok(true)
}

fn friend_label(profile: Option<&Identity>) -> String {
    profile
        .map(Identity::display_label)
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

async fn load_profile(backend: &Backend, uid: &UserId) -> Option<Identity> {
    match backend.docs.get(USERS, uid.as_str()).await {
        Ok(Some(doc)) => match decode_identity(&doc) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(uid = %uid, error = %e, "unreadable profile document");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(uid = %uid, error = %e, "failed to load profile");
            None
        }
    }
}

/// The one place denormalized friend display fields are refreshed.
///
/// Duplicate edges are dropped first (first wins). Each remaining edge takes
/// its name, email and avatar from the friend's profile document; when that
/// cannot be read the stored values are kept, with placeholders for gaps.
pub async fn enrich_friends(backend: &Backend, edges: Vec<FriendEdge>) -> Vec<FriendEdge> {
    let mut out = Vec::new();
    for mut edge in dedupe_friends(edges) {
        match load_profile(backend, &edge.friend_id).await {
            Some(profile) => {
                edge.friend_name = Some(profile.display_label());
                edge.friend_email = Some(profile.email.clone());
                edge.profile_image = profile.profile_image.clone();
            }
            None => {
                let name = display_label(edge.friend_name.as_deref(), None);
                edge.friend_name = Some(name);
                edge.friend_email = edge
                    .friend_email
                    .take()
                    .filter(|e| !e.is_empty())
                    .or_else(|| Some(UNKNOWN_EMAIL.to_string()));
            }
        }
        out.push(edge);
    }
    out
}

/// Users whose email contains `needle` (case-insensitive), excluding `me`.
pub async fn search_users(backend: &Backend, me: &Identity, needle: &str) -> Result<Vec<Identity>> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    let docs = backend.docs.query(&catalog::all_users()).await?;
    Ok(docs
        .iter()
        .filter_map(|doc| decode_identity(doc).ok())
        .filter(|user| user.id != me.id && user.email.to_lowercase().contains(&needle))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stridopt_shared::constants::NOTIFICATIONS;
    use stridopt_store::MemoryBackend;

    fn person(memory: &MemoryBackend, uid: &str, name: &str) -> Identity {
        let identity = Identity {
            id: UserId::new(uid),
            email: format!("{uid}@example.com"),
            full_name: name.to_string(),
            ..Default::default()
        };
        memory.seed(USERS, uid, to_fields(&identity).unwrap());
        identity
    }

    fn edges(memory: &MemoryBackend) -> Vec<FriendEdge> {
        memory
            .documents(FRIENDS)
            .iter()
            .map(|d| d.decode().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn duplicate_pending_request_is_not_resent() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        let bob = person(&memory, "bob", "Bob");

        let first = send_friend_request(&backend, &alice, &bob.id).await.unwrap();
        assert!(matches!(first, SendOutcome::Sent(_)));
        let second = send_friend_request(&backend, &alice, &bob.id).await.unwrap();
        assert_eq!(second, SendOutcome::AlreadyPending);

        assert_eq!(memory.documents(FRIEND_REQUESTS).len(), 1);
        let notes = memory.documents(NOTIFICATIONS);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].data["message"], json!("Alice sent you a friend request"));
        assert_eq!(notes[0].data["type"], json!("friend_request"));

        assert!(send_friend_request(&backend, &alice, &alice.id).await.is_err());
    }

    #[tokio::test]
    async fn acceptance_creates_two_edges_once() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        let bob = person(&memory, "bob", "Bob");

        let SendOutcome::Sent(request) = send_friend_request(&backend, &alice, &bob.id).await.unwrap() else {
            panic!("request not sent");
        };

        let err = accept_friend_request(&backend, &alice, &request).await.unwrap_err();
        assert!(matches!(err, ClientError::Forbidden(_)));

        accept_friend_request(&backend, &bob, &request).await.unwrap();
        accept_friend_request(&backend, &bob, &request).await.unwrap();

        let all = edges(&memory);
        assert_eq!(all.len(), 2);
        let bob_side = all.iter().find(|e| e.user_id == bob.id).unwrap();
        assert_eq!(bob_side.friend_id, alice.id);
        assert_eq!(bob_side.friend_name.as_deref(), Some("Alice"));
        let alice_side = all.iter().find(|e| e.user_id == alice.id).unwrap();
        assert_eq!(alice_side.friend_name.as_deref(), Some("Bob"));

        let doc = memory
            .documents(FRIEND_REQUESTS)
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(doc.data["status"], json!("accepted"));
        assert!(reject_friend_request(&backend, &bob, &request).await.is_err());
    }

    #[tokio::test]
    async fn reconcile_repairs_partial_acceptance() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        let bob = person(&memory, "bob", "Bob");

        let SendOutcome::Sent(request) = send_friend_request(&backend, &alice, &bob.id).await.unwrap() else {
            panic!("request not sent");
        };

        // Status update and first edge land, the second edge write fails.
        let status_then_one_edge = async {
            backend
                .docs
                .update(FRIEND_REQUESTS, request.as_str(), fields(json!({ "status": "accepted" })))
                .await
                .unwrap();
            ensure_edge(&backend, &bob.id, &alice.id, Some(&alice)).await.unwrap();
            memory.fail_next_writes(1);
            ensure_edge(&backend, &alice.id, &bob.id, Some(&bob)).await
        };
        assert!(status_then_one_edge.await.is_err());
        assert_eq!(edges(&memory).len(), 1);

        let repaired = reconcile_friendships(&backend, &alice).await.unwrap();
        assert_eq!(repaired, 1);
        assert_eq!(edges(&memory).len(), 2);
        assert_eq!(reconcile_friendships(&backend, &bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reject_and_remove() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        let bob = person(&memory, "bob", "Bob");

        let SendOutcome::Sent(request) = send_friend_request(&backend, &alice, &bob.id).await.unwrap() else {
            panic!("request not sent");
        };
        reject_friend_request(&backend, &bob, &request).await.unwrap();
        assert!(accept_friend_request(&backend, &bob, &request).await.is_err());
        assert!(edges(&memory).is_empty());

        // A later request can still be accepted and then removed.
        let SendOutcome::Sent(again) = send_friend_request(&backend, &alice, &bob.id).await.unwrap() else {
            panic!("request not sent");
        };
        accept_friend_request(&backend, &bob, &again).await.unwrap();
        assert_eq!(remove_friend(&backend, &alice, &bob.id).await.unwrap(), 2);
        assert!(edges(&memory).is_empty());
    }

    #[tokio::test]
    async fn removed_friendship_stays_removed_after_sweep() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        let bob = person(&memory, "bob", "Bob");
        let carol = person(&memory, "carol", "Carol");

        for friend in [&bob, &carol] {
            let SendOutcome::Sent(request) = send_friend_request(&backend, &alice, &friend.id).await.unwrap() else {
                panic!("request not sent");
            };
            accept_friend_request(&backend, friend, &request).await.unwrap();
        }
        assert_eq!(edges(&memory).len(), 4);

        assert_eq!(remove_friend(&backend, &bob, &alice.id).await.unwrap(), 2);
        assert_eq!(reconcile_friendships(&backend, &alice).await.unwrap(), 0);
        assert_eq!(reconcile_friendships(&backend, &bob).await.unwrap(), 0);

        let remaining = edges(&memory);
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|e| e.user_id != bob.id && e.friend_id != bob.id));

        // The other friendship's request survives, so the sweep can still repair it.
        let carol_side = remaining.iter().find(|e| e.user_id == carol.id).unwrap();
        backend.docs.delete(FRIENDS, carol_side.id.as_str()).await.unwrap();
        assert_eq!(reconcile_friendships(&backend, &alice).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn profiles_without_uid_field_are_readable() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        memory.seed(USERS, "dana", fields(json!({ "email": "dana@example.com", "fullName": "Dana" })));

        let found = search_users(&backend, &alice, "dana").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, UserId::new("dana"));

        let profile = load_profile(&backend, &UserId::new("dana")).await.unwrap();
        assert_eq!(profile.full_name, "Dana");
    }

    #[tokio::test]
    async fn enrichment_prefers_profiles_and_falls_back() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        person(&memory, "bob", "Bob Builder");

        let stale = |id: &str, friend: &str, name: Option<&str>| FriendEdge {
            id: DocId::new(id),
            user_id: UserId::new("alice"),
            friend_id: UserId::new(friend),
            friend_name: name.map(str::to_string),
            status: FriendStatus::Accepted,
            ..Default::default()
        };

        let enriched = enrich_friends(
            &backend,
            vec![
                stale("e1", "bob", Some("old name")),
                stale("e2", "bob", None),
                stale("e3", "ghost", None),
            ],
        )
        .await;

        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[0].friend_name.as_deref(), Some("Bob Builder"));
        assert_eq!(enriched[0].friend_email.as_deref(), Some("bob@example.com"));
        assert_eq!(enriched[1].friend_name.as_deref(), Some(UNKNOWN_USER));
        assert_eq!(enriched[1].friend_email.as_deref(), Some(UNKNOWN_EMAIL));
    }

    #[tokio::test]
    async fn search_matches_email_substring() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let alice = person(&memory, "alice", "Alice");
        person(&memory, "bob", "Bob");
        person(&memory, "bobby", "Bobby");

        let found = search_users(&backend, &alice, "BOB").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(search_users(&backend, &alice, "alice").await.unwrap().is_empty());
        assert!(search_users(&backend, &alice, "  ").await.unwrap().is_empty());
    }
}
