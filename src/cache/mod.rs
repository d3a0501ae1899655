//! Tiered cache: Hot in-memory, Warm on-disk, Cold recompute.
//!
//! Reads check Hot then Warm; a Warm hit is promoted into Hot with a fresh
//! Hot TTL before returning. Writes go to both tiers in the same operation,
//! never Warm-only, so a Hot outage degrades without cold-starting every
//! read. A tier failure is logged and stepped over, never surfaced to the
//! caller; the Cold tier is the caller re-running the pipeline.

use crate::{Error, Result};
use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One storage tier. Implementations must be safe to call from concurrent
/// tasks; operations are idempotent upserts so there are no
/// read-modify-write races.
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

struct MemoryEntry {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// Hot tier: in-process concurrent map with short TTLs.
///
/// A shared remote store slots in behind the same trait; promotion and
/// dual-write semantics are tier-agnostic.
#[derive(Default)]
pub struct MemoryTier {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryTier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "hot"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.payload.clone()));
            }
        }
        // Expired entries are dropped lazily on the next read.
        self.entries
            .remove_if(key, |_, e| e.expires_at <= Instant::now());
        Ok(None)
    }

    fn put(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                payload: payload.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Envelope stored per key on disk.
#[derive(Debug, Serialize, Deserialize)]
struct DiskEnvelope {
    key: String,
    inserted_at_epoch: i64,
    ttl_secs: u64,
    payload: Vec<u8>,
}

/// Warm tier: one JSON envelope file per key, durable across sessions.
pub struct DiskTier {
    directory: PathBuf,
}

impl DiskTier {
    pub fn new(directory: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Keys contain separators and DOI slashes; file names are the key's
    /// SHA-256 hex.
    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.directory.join(format!("{name}.json"))
    }
}

impl CacheTier for DiskTier {
    fn name(&self) -> &'static str {
        "warm"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let envelope: DiskEnvelope = serde_json::from_slice(&raw)?;
        let age = Utc::now().timestamp() - envelope.inserted_at_epoch;
        if age < 0 || age as u64 > envelope.ttl_secs {
            debug!("Warm entry expired for key, removing: {}", key);
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(envelope.payload))
    }

    fn put(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        let envelope = DiskEnvelope {
            key: key.to_string(),
            inserted_at_epoch: Utc::now().timestamp(),
            ttl_secs: ttl.as_secs(),
            payload: payload.to_vec(),
        };
        let path = self.path_for(key);
        let temp = path.with_extension("tmp");
        std::fs::write(&temp, serde_json::to_vec(&envelope)?)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Hit/miss counters, split by the tier that answered.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hot_hits: AtomicU64,
    pub warm_hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.hot_hits.load(Ordering::Relaxed),
            self.warm_hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// The tiered cache front.
pub struct TieredCache {
    hot: Box<dyn CacheTier>,
    warm: Box<dyn CacheTier>,
    hot_ttl: Duration,
    warm_ttl: Duration,
    stats: CacheStats,
}

impl TieredCache {
    pub fn new(warm_directory: PathBuf, hot_ttl: Duration, warm_ttl: Duration) -> Result<Self> {
        Ok(Self {
            hot: Box::new(MemoryTier::new()),
            warm: Box::new(DiskTier::new(warm_directory)?),
            hot_ttl,
            warm_ttl,
            stats: CacheStats::default(),
        })
    }

    /// Test seam: explicit tier implementations.
    pub fn with_tiers(
        hot: Box<dyn CacheTier>,
        warm: Box<dyn CacheTier>,
        hot_ttl: Duration,
        warm_ttl: Duration,
    ) -> Self {
        Self {
            hot,
            warm,
            hot_ttl,
            warm_ttl,
            stats: CacheStats::default(),
        }
    }

    /// Read through the tiers. Warm hits are promoted into Hot with the
    /// Hot TTL reset before returning.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.hot.get(key) {
            Ok(Some(payload)) => {
                self.stats.hot_hits.fetch_add(1, Ordering::Relaxed);
                return Some(payload);
            }
            Ok(None) => {}
            Err(e) => warn!("Hot tier read degraded: {}", e),
        }

        match self.warm.get(key) {
            Ok(Some(payload)) => {
                self.stats.warm_hits.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.hot.put(key, &payload, self.hot_ttl) {
                    warn!("Hot tier promotion degraded: {}", e);
                }
                Some(payload)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!("Warm tier read degraded: {}", e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write to both tiers in one operation. Fails only when every tier
    /// refuses the write.
    pub fn put(&self, key: &str, payload: &[u8]) -> Result<()> {
        let hot_result = self.hot.put(key, payload, self.hot_ttl);
        if let Err(e) = &hot_result {
            warn!("Hot tier write degraded: {}", e);
        }
        let warm_result = self.warm.put(key, payload, self.warm_ttl);
        if let Err(e) = &warm_result {
            warn!("Warm tier write degraded: {}", e);
        }

        if hot_result.is_err() && warm_result.is_err() {
            return Err(Error::CacheTier {
                tier: "all".to_string(),
                message: "every cache tier rejected the write".to_string(),
            });
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.hot.remove(key) {
            warn!("Hot tier remove degraded: {}", e);
        }
        if let Err(e) = self.warm.remove(key) {
            warn!("Warm tier remove degraded: {}", e);
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Corrupt cache payload for {}: {}", key, e);
                self.remove(key);
                None
            }
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, &serde_json::to_vec(value)?)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
