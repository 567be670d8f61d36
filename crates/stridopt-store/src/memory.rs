//! In-process backend implementing every boundary trait.
//!
//! Used by the test suites and for running the client without a hosted
//! backend. Live listeners re-run their query whenever any document changes
//! and only emit when their result set actually differs. Faults can be
//! injected to exercise the retry paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use stridopt_shared::UserId;

use crate::backend::{AuthProvider, AuthUser, BlobStore, DocumentStore, KeyValueStore, SnapshotStream};
use crate::document::{Document, Fields};
use crate::error::{AuthErrorCode, Result, StoreError};
use crate::query::Query;

const MIN_PROVIDER_PASSWORD_LEN: usize = 6;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Signal {
    revision: u64,
    interrupts: u64,
}

#[derive(Debug, Default)]
struct Faults {
    failing_listens: u32,
    failing_writes: u32,
    requires_recent_login: bool,
    too_many_requests: bool,
}

#[derive(Debug, Clone)]
struct Account {
    uid: UserId,
    password: String,
    display_name: Option<String>,
}

struct Inner {
    collections: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
    signal: watch::Sender<Signal>,
    faults: Mutex<Faults>,
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<AuthUser>>,
    blobs: Mutex<HashMap<String, Bytes>>,
    kv: Mutex<HashMap<String, String>>,
}

impl Inner {
    fn run_query(&self, query: &Query) -> Vec<Document> {
        let collections = lock(&self.collections);
        let docs = collections
            .get(&query.collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        query.apply(docs)
    }

    fn bump(&self) {
        self.signal.send_modify(|s| s.revision += 1);
    }

    fn check_write(&self) -> Result<()> {
        let mut faults = lock(&self.faults);
        if faults.failing_writes > 0 {
            faults.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

/// Cheaply cloneable handle; clones share the same state.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(Signal::default());
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                collections: Mutex::new(HashMap::new()),
                signal,
                faults: Mutex::new(Faults::default()),
                accounts: Mutex::new(HashMap::new()),
                current,
                blobs: Mutex::new(HashMap::new()),
                kv: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The next `n` calls to `listen` fail with a transport error.
    pub fn fail_next_listens(&self, n: u32) {
        lock(&self.inner.faults).failing_listens = n;
    }

    /// The next `n` document writes fail with a transport error.
    pub fn fail_next_writes(&self, n: u32) {
        lock(&self.inner.faults).failing_writes = n;
    }

    /// Break every open listener: each yields one transport error and ends.
    pub fn interrupt_listeners(&self) {
        self.inner.signal.send_modify(|s| s.interrupts += 1);
    }

    pub fn set_requires_recent_login(&self, on: bool) {
        lock(&self.inner.faults).requires_recent_login = on;
    }

    pub fn set_too_many_requests(&self, on: bool) {
        lock(&self.inner.faults).too_many_requests = on;
    }

    /// Insert or replace a document without going through the trait.
    pub fn seed(&self, collection: &str, id: &str, data: Fields) {
        lock(&self.inner.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.inner.bump();
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner.run_query(&Query::collection(collection))
    }

    pub fn blob(&self, path: &str) -> Option<Bytes> {
        lock(&self.inner.blobs).get(path).cloned()
    }

    fn set_current(&self, user: Option<AuthUser>) {
        self.inner.current.send_replace(user);
    }

    fn guard_sensitive(&self) -> Result<AuthUser> {
        if lock(&self.inner.faults).requires_recent_login {
            return Err(StoreError::Auth(AuthErrorCode::RequiresRecentLogin));
        }
        self.current()
            .ok_or(StoreError::Auth(AuthErrorCode::NotSignedIn))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.inner.run_query(query))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = lock(&self.inner.collections);
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn create(&self, collection: &str, data: Fields) -> Result<String> {
        self.inner.check_write()?;
        let id = generate_id();
        lock(&self.inner.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        self.inner.bump();
        debug!(collection, id = %id, "document created");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        self.inner.check_write()?;
        lock(&self.inner.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.inner.bump();
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<()> {
        self.inner.check_write()?;
        {
            let mut collections = lock(&self.inner.collections);
            let doc = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            for (key, value) in patch {
                doc.insert(key, value);
            }
        }
        self.inner.bump();
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.inner.check_write()?;
        let removed = lock(&self.inner.collections)
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            self.inner.bump();
        }
        Ok(())
    }

    async fn listen(&self, query: &Query) -> Result<SnapshotStream> {
        {
            let mut faults = lock(&self.inner.faults);
            if faults.failing_listens > 0 {
                faults.failing_listens -= 1;
                warn!(collection = %query.collection, "injected listen failure");
                return Err(StoreError::Unavailable("injected listen failure".into()));
            }
        }

        let mut rx = self.inner.signal.subscribe();
        let start = *rx.borrow_and_update();

        struct Listener {
            inner: Arc<Inner>,
            rx: watch::Receiver<Signal>,
            query: Query,
            interrupts: u64,
            last: Option<Vec<Document>>,
            done: bool,
        }

        let listener = Listener {
            inner: self.inner.clone(),
            rx,
            query: query.clone(),
            interrupts: start.interrupts,
            last: None,
            done: false,
        };

        let stream = futures::stream::unfold(listener, |mut l| async move {
            if l.done {
                return None;
            }
            if l.last.is_none() {
                let docs = l.inner.run_query(&l.query);
                l.last = Some(docs.clone());
                return Some((Ok(docs), l));
            }
            loop {
                if l.rx.changed().await.is_err() {
                    return None;
                }
                let signal = *l.rx.borrow_and_update();
                if signal.interrupts != l.interrupts {
                    l.done = true;
                    return Some((Err(StoreError::Unavailable("listener interrupted".into())), l));
                }
                let docs = l.inner.run_query(&l.query);
                if l.last.as_ref() != Some(&docs) {
                    l.last = Some(docs.clone());
                    return Some((Ok(docs), l));
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn register(&self, email: &str, password: &str) -> Result<AuthUser> {
        if lock(&self.inner.faults).too_many_requests {
            return Err(StoreError::Auth(AuthErrorCode::TooManyRequests));
        }
        if !email.contains('@') {
            return Err(StoreError::Auth(AuthErrorCode::InvalidEmail));
        }
        if password.chars().count() < MIN_PROVIDER_PASSWORD_LEN {
            return Err(StoreError::Auth(AuthErrorCode::WeakPassword));
        }

        let user = {
            let mut accounts = lock(&self.inner.accounts);
            let key = email.to_ascii_lowercase();
            if accounts.contains_key(&key) {
                return Err(StoreError::Auth(AuthErrorCode::EmailAlreadyInUse));
            }
            let account = Account {
                uid: UserId::new(generate_id()),
                password: password.to_string(),
                display_name: None,
            };
            let user = AuthUser {
                uid: account.uid.clone(),
                email: email.to_string(),
                display_name: None,
            };
            accounts.insert(key, account);
            user
        };

        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        if lock(&self.inner.faults).too_many_requests {
            return Err(StoreError::Auth(AuthErrorCode::TooManyRequests));
        }
        let account = lock(&self.inner.accounts)
            .get(&email.to_ascii_lowercase())
            .cloned()
            .ok_or(StoreError::Auth(AuthErrorCode::UserNotFound))?;
        if account.password != password {
            return Err(StoreError::Auth(AuthErrorCode::WrongPassword));
        }
        let user = AuthUser {
            uid: account.uid,
            email: email.to_string(),
            display_name: account.display_name,
        };
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        self.set_current(None);
        Ok(())
    }

    fn current(&self) -> Option<AuthUser> {
        self.inner.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.current.subscribe()
    }

    async fn update_display_name(&self, name: &str) -> Result<()> {
        let mut user = self.guard_sensitive()?;
        if let Some(account) = lock(&self.inner.accounts).get_mut(&user.email.to_ascii_lowercase()) {
            account.display_name = Some(name.to_string());
        }
        user.display_name = Some(name.to_string());
        self.set_current(Some(user));
        Ok(())
    }

    async fn update_email(&self, email: &str) -> Result<()> {
        let mut user = self.guard_sensitive()?;
        {
            let mut accounts = lock(&self.inner.accounts);
            let new_key = email.to_ascii_lowercase();
            if accounts.contains_key(&new_key) {
                return Err(StoreError::Auth(AuthErrorCode::EmailAlreadyInUse));
            }
            let account = accounts
                .remove(&user.email.to_ascii_lowercase())
                .ok_or(StoreError::Auth(AuthErrorCode::UserNotFound))?;
            accounts.insert(new_key, account);
        }
        user.email = email.to_string();
        self.set_current(Some(user));
        Ok(())
    }

    async fn update_password(&self, password: &str) -> Result<()> {
        let user = self.guard_sensitive()?;
        if password.chars().count() < MIN_PROVIDER_PASSWORD_LEN {
            return Err(StoreError::Auth(AuthErrorCode::WeakPassword));
        }
        if let Some(account) = lock(&self.inner.accounts).get_mut(&user.email.to_ascii_lowercase()) {
            account.password = password.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<String> {
        if path.is_empty() || path.split('/').any(|part| part == "..") {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        lock(&self.inner.blobs).insert(path.to_string(), bytes);
        Ok(format!("memory://{path}"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.inner.kv).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.inner.kv).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        lock(&self.inner.kv).remove(key);
        Ok(())
    }
}
