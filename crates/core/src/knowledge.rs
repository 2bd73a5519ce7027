//! Knowledge store — the key/value state shared by all behaviours of one agent.
//!
//! Each individual `get`/`set` is atomic. Nothing stronger is promised: two
//! behaviours doing read-modify-write on the same key must coordinate
//! themselves (e.g. one writer per key).

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::error::KnowledgeError;

/// The core KnowledgeStore trait.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Fetch a value, `None` when the key was never set.
    async fn get(&self, key: &str) -> Result<Option<Value>, KnowledgeError>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), KnowledgeError>;

    /// Remove a key, returning the value it held.
    async fn remove(&self, key: &str) -> Result<Option<Value>, KnowledgeError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, KnowledgeError>;
}

/// Typed helpers on top of the JSON values.
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn KnowledgeStore,
    key: &str,
) -> Result<Option<T>, KnowledgeError> {
    match store.get(key).await? {
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| KnowledgeError::Conversion {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

pub async fn set_as<T: Serialize + ?Sized>(
    store: &dyn KnowledgeStore,
    key: &str,
    value: &T,
) -> Result<(), KnowledgeError> {
    let v = serde_json::to_value(value).map_err(|e| KnowledgeError::Conversion {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, v).await
}

/// An in-memory store backed by a `HashMap`.
pub struct InMemoryKnowledge {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryKnowledge {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryKnowledge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledge {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, KnowledgeError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KnowledgeError> {
        self.entries.write().await.insert(key.to_string(), value);
        trace!(key, "Knowledge item set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, KnowledgeError> {
        let removed = self.entries.write().await.remove(key);
        if removed.is_some() {
            trace!(key, "Knowledge item removed");
        }
        Ok(removed)
    }

    async fn keys(&self) -> Result<Vec<String>, KnowledgeError> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
