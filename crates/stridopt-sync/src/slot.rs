//! A subscription slot re-keyed by its inputs.
//!
//! Screens whose query depends on other state (the signed-in user, the
//! current friend set, the open chat) keep their subscription in a
//! [`LiveSlot`]. Binding a new key closes the old subscription before the new
//! one is opened, so at most one is ever live per slot.

use tracing::debug;

use crate::live::{LiveEvent, LiveQuery};

pub struct LiveSlot<K, T> {
    current: Option<(K, LiveQuery<T>)>,
}

impl<K, T> Default for LiveSlot<K, T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<K: PartialEq + std::fmt::Debug, T> LiveSlot<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the slot holds a subscription for `key`. Returns `true` when a
    /// new subscription was opened, `false` when `key` was already bound.
    pub fn bind<F>(&mut self, key: K, open: F) -> bool
    where
        F: FnOnce(&K) -> LiveQuery<T>,
    {
        if self.key() == Some(&key) {
            return false;
        }
        self.clear();
        debug!(key = ?key, "binding live slot");
        let live = open(&key);
        self.current = Some((key, live));
        true
    }

    /// Close the held subscription, if any.
    pub fn clear(&mut self) {
        if let Some((key, mut live)) = self.current.take() {
            debug!(key = ?key, collection = live.collection(), "releasing live slot");
            live.close();
        }
    }

    pub fn key(&self) -> Option<&K> {
        self.current.as_ref().map(|(k, _)| k)
    }

    pub fn get(&self) -> Option<&LiveQuery<T>> {
        self.current.as_ref().map(|(_, live)| live)
    }

    pub fn get_mut(&mut self) -> Option<&mut LiveQuery<T>> {
        self.current.as_mut().map(|(_, live)| live)
    }

    pub fn is_bound(&self) -> bool {
        self.current.is_some()
    }
}

impl<K, T> LiveSlot<K, T>
where
    K: PartialEq + std::fmt::Debug,
    T: Clone + Send + 'static,
{
    /// Next event of the bound subscription; `None` when unbound or closed.
    pub async fn next(&mut self) -> Option<LiveEvent<T>> {
        match self.get_mut() {
            Some(live) => live.next().await,
            None => None,
        }
    }

    pub fn items(&self) -> &[T] {
        self.get().map(LiveQuery::items).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::retry::RetryPolicy;
    use serde_json::json;
    use stridopt_shared::Message;
    use stridopt_store::{fields, DocumentStore, Filter, MemoryBackend, Query};

    fn open_chat(store: &Arc<dyn DocumentStore>, chat: &str) -> LiveQuery<Message> {
        LiveQuery::decoded(
            store.clone(),
            Query::collection("messages").filter(Filter::eq("chatId", chat)),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn rebinding_switches_subscription() {
        let backend = MemoryBackend::new();
        backend.seed("messages", "m1", fields(json!({ "chatId": "c1", "senderId": "u1", "text": "hi" })));
        backend.seed("messages", "m2", fields(json!({ "chatId": "c2", "senderId": "u2", "text": "yo" })));
        let store: Arc<dyn DocumentStore> = Arc::new(backend);

        let mut slot: LiveSlot<String, Message> = LiveSlot::new();
        assert!(slot.next().await.is_none());

        assert!(slot.bind("c1".to_string(), |c| open_chat(&store, c)));
        assert!(!slot.bind("c1".to_string(), |c| open_chat(&store, c)));
        slot.next().await.unwrap();
        assert_eq!(slot.items()[0].text.as_deref(), Some("hi"));

        assert!(slot.bind("c2".to_string(), |c| open_chat(&store, c)));
        slot.next().await.unwrap();
        assert_eq!(slot.items().len(), 1);
        assert_eq!(slot.items()[0].text.as_deref(), Some("yo"));

        slot.clear();
        assert!(!slot.is_bound());
        assert!(slot.items().is_empty());
    }
}
