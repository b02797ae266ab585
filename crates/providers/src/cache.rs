//! Reply cache decorator.
//!
//! Keys are the SHA-256 fingerprint of the last message's rendered text.
//! Only the content of `Return`-stage replies is stored; a hit is replayed as
//! a `Return` reply with zero usage and never reaches the wrapped chatter.
//! Store and codec failures are logged and swallowed: caching never fails a
//! call.

use async_trait::async_trait;
use chatter_core::{BoxError, Chatter, ChatterError, Content, Context, Message, Opt, Reply, Stage, Usage};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Byte-oriented key/value store backing the cache.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when the key is absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BoxError>;

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), BoxError>;

    /// Remove an entry. Stores without deletion keep the default no-op.
    async fn delete(&self, _key: &[u8]) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Process-local store for tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), BoxError> {
        self.entries.write().await.insert(key.to_vec(), value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), BoxError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Replays completed replies for a repeated last message.
pub struct Cache {
    inner: Arc<dyn Chatter>,
    store: Arc<dyn KeyValueStore>,
}

impl Cache {
    /// Cache the replies of `inner` in `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, inner: Arc<dyn Chatter>) -> Self {
        Self { inner, store }
    }

    /// Cache key of a rendered message.
    pub fn fingerprint(text: &str) -> Vec<u8> {
        Sha256::digest(text.as_bytes()).to_vec()
    }

    async fn lookup(&self, key: &[u8]) -> Option<Reply> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Cache: lookup failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<Vec<Content>>(&bytes) {
            Ok(content) => Some(Reply {
                stage: Stage::Return,
                usage: Usage::default(),
                content,
            }),
            Err(e) => {
                warn!(error = %e, "Cache: failed to decode cached reply");
                if let Err(e) = self.store.delete(key).await {
                    warn!(error = %e, "Cache: failed to evict undecodable entry");
                }
                None
            }
        }
    }

    async fn remember(&self, key: &[u8], reply: &Reply) {
        let bytes = match serde_json::to_vec(&reply.content) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Cache: failed to encode reply");
                return;
            }
        };

        if let Err(e) = self.store.put(key, bytes).await {
            warn!(error = %e, "Cache: failed to store reply");
        }
    }
}

#[async_trait]
impl Chatter for Cache {
    fn usage(&self) -> Usage {
        self.inner.usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        let last = messages.last().ok_or(ChatterError::EmptyPrompt)?;
        let key = Self::fingerprint(&last.to_string());

        if let Some(reply) = self.lookup(&key).await {
            debug!("Cache: hit");
            return Ok(reply);
        }
        debug!("Cache: miss");

        let reply = self.inner.prompt(ctx, messages, opts).await?;
        if reply.stage == Stage::Return {
            self.remember(&key, &reply).await;
        }

        Ok(reply)
    }
}
