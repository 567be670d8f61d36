//! End-to-end flow over the in-process backend with the SQLite session
//! cache and filesystem blobs.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{NaiveDate, Utc};

use stridopt_client::commands::{chat, events, friends, notifications, tasks};
use stridopt_client::feeds::{
    ChatsFeed, EventsFeed, FriendsFeed, MessagesFeed, NotificationsFeed, RequestsFeed, StreakTracker, TasksFeed,
};
use stridopt_client::{AppState, Backend, ClientConfig, Session};
use stridopt_shared::validation::RegistrationForm;
use stridopt_shared::{EventVisibility, Identity, Recurrence, ThemeMode};
use stridopt_store::{FsBlobStore, MemoryBackend, SqliteKeyValue};

macro_rules! wait_for {
    ($feed:expr, $cond:expr) => {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if $cond {
                    break;
                }
                if $feed.next().await.is_none() {
                    panic!("feed closed before condition held");
                }
            }
        })
        .await
        .expect("feed did not settle")
    };
}

fn registration(name: &str, email: &str) -> RegistrationForm {
    RegistrationForm {
        full_name: name.into(),
        email: email.into(),
        password: "Secret1!".into(),
        confirm_password: "Secret1!".into(),
        birth_date: NaiveDate::from_ymd_opt(1990, 1, 1),
    }
}

async fn backend_in(dir: &std::path::Path, memory: &MemoryBackend) -> Backend {
    let kv = SqliteKeyValue::open_at(&dir.join("cache.db")).unwrap();
    let blobs = FsBlobStore::new(dir.join("blobs")).await.unwrap();
    Backend {
        docs: Arc::new(memory.clone()),
        auth: Arc::new(memory.clone()),
        blobs: Arc::new(blobs),
        kv: Arc::new(kv),
    }
}

async fn register(session: &Session, name: &str, email: &str) -> Identity {
    let today = Utc::now().date_naive();
    let identity = session.sign_up(&registration(name, email), today).await.unwrap();
    session.sign_out().await.unwrap();
    identity
}

#[tokio::test]
async fn friends_events_and_chat() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryBackend::new();
    let backend = backend_in(dir.path(), &memory).await;
    let config = ClientConfig {
        blob_dir: dir.path().join("blobs"),
        ..ClientConfig::default()
    };
    let app = AppState::new(config, backend.clone()).await.unwrap();
    let policy = app.retry_policy();

    let alice = register(&app.session, "Alice Doe", "alice@example.com").await;
    let bob = register(&app.session, "Bob Roe", "bob@example.com").await;
    assert!(alice.profile_color.is_some());

    // Friend request, seen live by the receiver.
    let mut requests = RequestsFeed::new(&backend, policy);
    let mut inbox = NotificationsFeed::new(&backend, policy);
    requests.bind(Some(&bob));
    inbox.bind(Some(&bob));

    friends::send_friend_request(&backend, &alice, &bob.id).await.unwrap();
    assert_eq!(
        friends::send_friend_request(&backend, &alice, &bob.id).await.unwrap(),
        friends::SendOutcome::AlreadyPending
    );
    wait_for!(requests, requests.items().len() == 1);
    wait_for!(inbox, inbox.unread_count() == 1);

    let request_id = requests.items()[0].id.clone();
    friends::accept_friend_request(&backend, &bob, &request_id).await.unwrap();
    wait_for!(requests, requests.items().is_empty());

    let mut bob_friends = FriendsFeed::new(&backend, policy);
    bob_friends.bind(Some(&bob));
    wait_for!(bob_friends, bob_friends.friends().len() == 1);
    assert_eq!(bob_friends.friends()[0].friend_name.as_deref(), Some("Alice Doe"));
    assert_eq!(friends::reconcile_friendships(&backend, &alice).await.unwrap(), 0);

    notifications::mark_all_read(&backend, &bob).await.unwrap();
    wait_for!(inbox, inbox.unread_count() == 0);

    // Friends-only event, visible to bob through the friend set.
    let draft = events::EventDraft {
        title: "Morning run".into(),
        date: Utc::now().format("%Y-%m-%d").to_string(),
        start_time: "07:00".into(),
        end_time: "08:00".into(),
        visibility: EventVisibility::Friends,
        ..Default::default()
    };
    let event_id = events::create_event(&backend, &alice, &draft).await.unwrap();

    let mut bob_events = EventsFeed::new(&backend, policy);
    let mut streak = StreakTracker::new(&backend, policy);
    streak.bind(Some(&bob));
    bob_events.bind(Some(&bob), &bob_friends.friend_ids());
    wait_for!(bob_events, bob_events.items().len() == 1);

    events::join_event(&backend, &bob, &event_id, ThemeMode::Dark).await.unwrap();
    wait_for!(streak, streak.streak() == 1);
    assert_eq!(streak.joined_events(), 1);
    wait_for!(bob_events, !bob_events.items()[0].attendees.is_empty());
    assert_eq!(bob_events.items()[0].attendees[0].name, "Bob Roe");

    // Direct chat.
    let chat_id = chat::open_direct_chat(&backend, &bob, &alice.id).await.unwrap();
    assert_eq!(chat::open_direct_chat(&backend, &alice, &bob.id).await.unwrap(), chat_id);

    let mut chats = ChatsFeed::new(&backend, policy);
    let mut messages = MessagesFeed::new(&backend, policy);
    chats.bind(Some(&alice));
    messages.bind(Some(&chat_id));

    chat::send_text(&backend, &bob, &chat_id, "see you at 7").await.unwrap();
    chat::send_image(&backend, &alice, &chat_id, Bytes::from_static(b"\x89PNG"))
        .await
        .unwrap();
    wait_for!(messages, messages.items().len() == 2);
    let ordered = messages.oldest_first();
    assert_eq!(ordered[0].text.as_deref(), Some("see you at 7"));
    assert!(ordered[1].image_url.as_deref().unwrap().starts_with("file://"));
    wait_for!(chats, chats.items().first().and_then(|c| c.last_message.as_deref()) == Some("📷 Image"));

    // Tasks.
    let mut todo = TasksFeed::new(&backend, policy);
    todo.bind(Some(&alice));
    let task = tasks::add_task(&backend, &alice, " stretch ", Recurrence::Daily).await.unwrap();
    tasks::toggle_task(&backend, &alice, &task).await.unwrap();
    wait_for!(todo, todo.items().first().is_some_and(|t| t.completed));
}

#[tokio::test]
async fn session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryBackend::new();
    let backend = backend_in(dir.path(), &memory).await;

    let first = Session::start(backend.clone(), ThemeMode::Light).await.unwrap();
    let today = Utc::now().date_naive();
    let carol = first
        .sign_up(&registration("Carol Poe", "carol@example.com"), today)
        .await
        .unwrap();
    drop(first);

    let again = Session::start(backend_in(dir.path(), &memory).await, ThemeMode::Light)
        .await
        .unwrap();
    assert_eq!(again.current().map(|i| i.id), Some(carol.id));

    again.sign_out().await.unwrap();
    let cold = Session::start(backend_in(dir.path(), &memory).await, ThemeMode::Light)
        .await
        .unwrap();
    assert!(cold.current().is_none());
}
