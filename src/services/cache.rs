use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::AnalysisOptions;

/// SHA-256 over the full file bytes followed by the canonical options string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(content: &[u8], options: &AnalysisOptions) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.update(b"\n");
        hasher.update(options.canonical().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accepts a key computed elsewhere, e.g. by a client.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        (raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit())).then_some(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: String,
    pub json_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(result: impl Into<String>, json_data: Option<String>) -> Self {
        Self {
            result: result.into(),
            json_data,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.created_at).to_std() {
            Ok(age) => age > ttl,
            // Written "in the future" by a skewed clock.
            Err(_) => false,
        }
    }
}

/// Shared result cache. Expired entries read as absent; `put` replaces wholesale.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<CacheEntry>>;

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> AppResult<()>;

    fn backend(&self) -> &'static str;
}

pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl InMemoryCacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(fresh(entries.get(key), self.ttl))
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> AppResult<()> {
        self.entries.write().await.insert(key.clone(), entry);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// JSON file of `key -> entry`, rewritten on every `put`.
pub struct FileCacheStore {
    path: PathBuf,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl FileCacheStore {
    pub async fn open(path: impl Into<PathBuf>, ttl: Duration) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<HashMap<CacheKey, CacheEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cache file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = entries.len(), "Result cache loaded");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            ttl,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(fresh(entries.get(key), self.ttl))
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> AppResult<()> {
        // Holding the write guard across the flush serializes writers. Memory
        // only takes the entry once it is on disk.
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.insert(key.clone(), entry);

        let serialized = serde_json::to_vec(&next)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *entries = next;

        debug!(key = %key, entries = entries.len(), "Result cache persisted");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

fn fresh(entry: Option<&CacheEntry>, ttl: Duration) -> Option<CacheEntry> {
    entry
        .filter(|e| !e.is_expired(ttl, Utc::now()))
        .cloned()
}
