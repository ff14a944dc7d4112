//! Key-value store collaborator.
//!
//! Per §1 this is an external persistence layer, consumed only through
//! `get(key)`/`set(key, value)`. The engine treats it as process-wide and
//! tolerant of concurrent writers (§5): last-writer-wins is acceptable for
//! monotonic sets like `seenIds`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>);
    async fn delete(&self, key: &str);
}

/// An in-process `KvStore` for tests and for standalone CLI runs with no
/// external persistence configured.
#[derive(Default)]
pub struct InMemoryKvStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().unwrap().get(key).cloned()
    }

    async fn set(&self, key: &str, value: Vec<u8>) {
        self.inner.write().unwrap().insert(key.to_string(), value);
    }

    async fn delete(&self, key: &str) {
        self.inner.write().unwrap().remove(key);
    }
}

/// Typed helpers layered over a raw byte-blob `KvStore`.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Option<T> {
    let bytes = store.get(key).await?;
    serde_json::from_slice(&bytes).ok()
}

pub async fn set_json<T: serde::Serialize>(store: &dyn KvStore, key: &str, value: &T) {
    if let Ok(bytes) = serde_json::to_vec(value) {
        store.set(key, bytes).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_json() {
        let store = InMemoryKvStore::new();
        set_json(&store, "k", &vec![1, 2, 3]).await;
        let back: Vec<i32> = get_json(&store, "k").await.unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = InMemoryKvStore::new();
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = InMemoryKvStore::new();
        store.set("k", vec![1]).await;
        store.delete("k").await;
        assert!(store.get("k").await.is_none());
    }
}
