//! In-Memory Classification Cache
//!
//! Thread-safe TTL cache for bytecode classifications, keyed by lowercase
//! address. DashMap gives concurrent access without a global lock.
//!
//! Only definitive results are stored; NoOpinion outcomes (RPC failure,
//! unparseable code) are always re-fetched.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::types::{BytecodeOutcome, BytecodeReport};
use crate::utils::constants::DEFAULT_CACHE_TTL_SECS;

/// Expired entries are swept once every this many `set` calls
pub const CACHE_SWEEP_EVERY: u64 = 256;

/// Cache entry with its insertion time
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub report: BytecodeReport,
    pub created_at: Instant,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > Duration::from_secs(self.ttl_secs)
    }

    /// Seconds until expiry
    pub fn remaining_ttl(&self) -> u64 {
        let elapsed = self.created_at.elapsed().as_secs();
        self.ttl_secs.saturating_sub(elapsed)
    }
}

#[derive(Clone)]
pub struct ClassificationCache {
    /// lowercase address -> entry
    store: Arc<DashMap<String, CacheEntry>>,
    ttl_secs: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL_SECS)
    }
}

impl ClassificationCache {
    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl_secs,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn key(address: &str) -> String {
        address.to_lowercase()
    }

    /// Cached report, if present and not expired
    pub fn get(&self, address: &str) -> Option<BytecodeReport> {
        let key = Self::key(address);

        if let Some(entry) = self.store.get(&key) {
            if entry.is_expired() {
                drop(entry); // release the shard read lock before removing
                self.store.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS (expired): {}", key);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ CACHE HIT: {} (TTL: {}s remaining)", key, entry.remaining_ttl());
                Some(entry.report.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 CACHE MISS: {}", key);
            None
        }
    }

    /// Store a report; NoOpinion outcomes are ignored. Returns true if stored.
    pub fn set(&self, address: &str, report: BytecodeReport) -> bool {
        if matches!(report.outcome, BytecodeOutcome::NoOpinion { .. }) {
            return false;
        }
        if (self.sets.fetch_add(1, Ordering::Relaxed) + 1) % CACHE_SWEEP_EVERY == 0 {
            let removed = self.cleanup_expired();
            if removed > 0 {
                debug!("🧹 CACHE SWEEP: {} expired entries removed", removed);
            }
        }

        let key = Self::key(address);
        self.store.insert(
            key.clone(),
            CacheEntry {
                report,
                created_at: Instant::now(),
                ttl_secs: self.ttl_secs,
            },
        );
        debug!("💾 CACHE SET: {} (TTL: {}s)", key, self.ttl_secs);
        true
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.store.len())
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl_secs,
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}
