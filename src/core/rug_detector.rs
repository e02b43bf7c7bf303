//! Bytecode Rug-Similarity Detector
//!
//! Scores a token contract against a database of known rug bytecode:
//! clean = 10, suspicious = 5, confirmed = 0.
//!
//! Rule order for a fingerprinted contract:
//! 1. Empty database        -> clean (no opinion is possible)
//! 2. Exact content hash    -> confirmed
//! 3. DELEGATECALL / CREATE2 / SELFDESTRUCT present -> confirmed, persisted
//! 4. Best cosine >= confirm threshold   -> confirmed (persisted when reinforcing)
//! 5. Best cosine >= suspicion threshold -> suspicious
//! 6. Otherwise             -> clean
//!
//! Chain failures never surface as errors; they yield a neutral NoOpinion report.

use alloy_primitives::Address;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::bytecode::{content_hash, cosine_similarity, fingerprint, normalize};
use crate::core::rug_database::RugDatabase;
use crate::models::config::DetectorConfig;
use crate::models::errors::AppResult;
use crate::models::types::{
    BytecodeFingerprint, BytecodeOutcome, BytecodeReport, BytecodeVerdict, ClassificationDetails,
    MatchKind,
};
use crate::providers::ports::ChainReader;
use crate::utils::cache::{CacheStats, ClassificationCache};
use crate::utils::telemetry::SentryTelemetry;

/// Result of the pure classification step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub verdict: BytecodeVerdict,
    pub match_kind: MatchKind,
    pub best_similarity: f64,
    /// The fingerprint should be written back to the database
    pub persist: bool,
}

/// Classify a fingerprint against the database without side effects
pub fn classify(
    fp: &BytecodeFingerprint,
    code_hash: &str,
    db: &RugDatabase,
    config: &DetectorConfig,
) -> Classification {
    if db.is_empty() {
        return Classification {
            verdict: BytecodeVerdict::Clean,
            match_kind: MatchKind::EmptyDatabase,
            best_similarity: 0.0,
            persist: false,
        };
    }

    let best_similarity = db
        .fingerprints()
        .iter()
        .map(|known| cosine_similarity(&fp.op_hist, &known.op_hist))
        .fold(0.0_f64, f64::max);

    if db.contains_hash(code_hash) {
        return Classification {
            verdict: BytecodeVerdict::Confirmed,
            match_kind: MatchKind::ExactHash,
            best_similarity,
            persist: false,
        };
    }

    if fp.risky.any_hard() {
        return Classification {
            verdict: BytecodeVerdict::Confirmed,
            match_kind: MatchKind::RiskyOpcode,
            best_similarity,
            persist: true,
        };
    }

    if best_similarity >= config.confirm_similarity {
        Classification {
            verdict: BytecodeVerdict::Confirmed,
            match_kind: MatchKind::Similarity,
            best_similarity,
            persist: config.reinforce_on_similarity,
        }
    } else if best_similarity >= config.suspicion_similarity {
        Classification {
            verdict: BytecodeVerdict::Suspicious,
            match_kind: MatchKind::Similarity,
            best_similarity,
            persist: false,
        }
    } else {
        Classification {
            verdict: BytecodeVerdict::Clean,
            match_kind: MatchKind::NoMatch,
            best_similarity,
            persist: false,
        }
    }
}

pub struct RugDetector {
    chain: Arc<dyn ChainReader>,
    db: RwLock<RugDatabase>,
    config: DetectorConfig,
    cache: ClassificationCache,
    telemetry: Option<Arc<SentryTelemetry>>,
}

impl RugDetector {
    /// Detector backed by the database file at `config.db_path`
    pub fn new(chain: Arc<dyn ChainReader>, config: DetectorConfig) -> AppResult<Self> {
        config.validate()?;
        let db = RugDatabase::open(&config.db_path);
        Ok(Self::with_database(chain, db, config))
    }

    /// Detector over an already-opened database
    pub fn with_database(chain: Arc<dyn ChainReader>, db: RugDatabase, config: DetectorConfig) -> Self {
        Self {
            chain,
            db: RwLock::new(db),
            cache: ClassificationCache::with_ttl(config.cache_ttl_secs),
            config,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<SentryTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Classify the contract deployed at `address`
    pub async fn classify_bytecode(&self, address: Address) -> BytecodeReport {
        let key = format!("{:#x}", address);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let start = Instant::now();
        let report = self.classify_uncached(address).await;

        debug!(
            "🔬 Classified {} in {}ms",
            address,
            start.elapsed().as_millis()
        );
        if let Some(t) = &self.telemetry {
            t.record_classification(&report.outcome);
        }
        self.cache.set(&key, report.clone());
        report
    }

    async fn classify_uncached(&self, address: Address) -> BytecodeReport {
        let code = match self.chain.get_code(address).await {
            Ok(code) => code,
            Err(e) => {
                warn!("⚠️ Bytecode fetch failed for {}: {}", address, e);
                return BytecodeReport::new(
                    address,
                    BytecodeOutcome::NoOpinion {
                        reason: e.to_string(),
                    },
                    ClassificationDetails::default(),
                );
            }
        };

        if code.is_empty() {
            debug!("📭 No code at {}", address);
            return BytecodeReport::new(address, BytecodeOutcome::NoCode, ClassificationDetails::default());
        }

        let normalized = normalize(&code);
        let hash = content_hash(normalized);
        let fp = fingerprint(normalized);

        let result = {
            let db = self.db.read().await;
            classify(&fp, &hash, &db, &self.config)
        };

        let mut details = ClassificationDetails {
            match_kind: Some(result.match_kind),
            code_hash: Some(hash.clone()),
            normalized_len: normalized.len(),
            best_similarity: result.best_similarity,
            risky_opcodes: fp.risky.names().into_iter().map(String::from).collect(),
            flagged_selectors: fp.flagged_selectors(),
            persisted: false,
        };

        if result.persist {
            details.persisted = self.persist(hash, fp).await;
        }

        let report = BytecodeReport::new(address, BytecodeOutcome::Classified(result.verdict), details);
        match result.verdict {
            BytecodeVerdict::Clean => debug!("✅ {} {}", address, report.summary()),
            BytecodeVerdict::Suspicious => info!("🟠 {} {}", address, report.summary()),
            BytecodeVerdict::Confirmed => info!("🚨 {} {}", address, report.summary()),
        }
        report
    }

    /// Write a detection to disk on the blocking pool, then fold the result back in
    ///
    /// The database lock is held only for the snapshot and the final merge.
    async fn persist(&self, hash: String, fp: BytecodeFingerprint) -> bool {
        let mut snapshot = self.db.read().await.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            snapshot
                .persist_detection(&hash, fp)
                .map(|written| (written, snapshot))
                .map_err(|e| (hash, e))
        })
        .await;

        match outcome {
            Ok(Ok((written, snapshot))) => {
                self.db.write().await.merge(snapshot);
                written
            }
            Ok(Err((hash, e))) => {
                warn!("⚠️ Failed to persist rug detection {}: {}", hash, e);
                false
            }
            Err(e) => {
                warn!("⚠️ Rug DB persistence task failed: {}", e);
                false
            }
        }
    }

    /// (hash count, fingerprint count) of the in-memory database
    pub async fn database_size(&self) -> (usize, usize) {
        let db = self.db.read().await;
        (db.hash_count(), db.fingerprint_count())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn fp_from_hist(pairs: &[(u8, u32)]) -> BytecodeFingerprint {
        BytecodeFingerprint {
            op_hist: pairs.iter().copied().collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }

    fn seeded_db(fps: Vec<BytecodeFingerprint>) -> RugDatabase {
        let mut db = RugDatabase::in_memory();
        db.add_hash("0xseed");
        for fp in fps {
            db.add_fingerprint(fp);
        }
        db
    }

    #[test]
    fn test_empty_database_is_clean_even_with_hard_opcodes() {
        let mut fp = fp_from_hist(&[(0xf4, 1)]);
        fp.risky.delegatecall = true;
        let result = classify(&fp, "0xabc", &RugDatabase::in_memory(), &DetectorConfig::default());
        assert_eq!(result.verdict, BytecodeVerdict::Clean);
        assert_eq!(result.match_kind, MatchKind::EmptyDatabase);
        assert!(!result.persist);
    }

    #[test]
    fn test_exact_hash_confirms_without_persist() {
        let db = seeded_db(vec![]);
        let result = classify(&fp_from_hist(&[(0x60, 3)]), "0xSEED", &db, &DetectorConfig::default());
        assert_eq!(result.verdict, BytecodeVerdict::Confirmed);
        assert_eq!(result.match_kind, MatchKind::ExactHash);
        assert!(!result.persist);
    }

    #[test]
    fn test_hard_opcode_veto_persists() {
        let db = seeded_db(vec![]);
        let mut fp = fp_from_hist(&[(0x60, 3), (0xff, 1)]);
        fp.risky.selfdestruct = true;
        let result = classify(&fp, "0xnew", &db, &DetectorConfig::default());
        assert_eq!(result.verdict, BytecodeVerdict::Confirmed);
        assert_eq!(result.match_kind, MatchKind::RiskyOpcode);
        assert!(result.persist);
    }

    #[test]
    fn test_create_alone_is_not_a_veto() {
        let db = seeded_db(vec![fp_from_hist(&[(0x01, 1)])]);
        let mut fp = fp_from_hist(&[(0xf0, 1)]);
        fp.risky.create = true;
        let result = classify(&fp, "0xnew", &db, &DetectorConfig::default());
        assert_eq!(result.verdict, BytecodeVerdict::Clean);
        assert_eq!(result.match_kind, MatchKind::NoMatch);
    }

    #[test]
    fn test_similarity_bands() {
        let known = fp_from_hist(&[(0x01, 10), (0x02, 10)]);
        let db = seeded_db(vec![known.clone()]);
        let config = DetectorConfig::default();

        // identical histogram: cos = 1
        let same = classify(&known, "0x01", &db, &config);
        assert_eq!(same.verdict, BytecodeVerdict::Confirmed);
        assert_eq!(same.match_kind, MatchKind::Similarity);
        assert!(same.persist);

        // 130 / (sqrt(200) * sqrt(158)) ~= 0.731
        let suspicious = fp_from_hist(&[(0x01, 10), (0x02, 3), (0x03, 7)]);
        let s = classify(&suspicious, "0x02", &db, &config);
        assert_eq!(s.verdict, BytecodeVerdict::Suspicious);
        assert!(!s.persist);

        // 100 / (sqrt(200) * sqrt(149)) ~= 0.579
        let far = fp_from_hist(&[(0x01, 10), (0x03, 7)]);
        let c = classify(&far, "0x03", &db, &config);
        assert_eq!(c.verdict, BytecodeVerdict::Clean);
        assert_eq!(c.match_kind, MatchKind::NoMatch);
    }

    #[test]
    fn test_similarity_reinforcement_toggle() {
        let known = fp_from_hist(&[(0x01, 10), (0x02, 10)]);
        let db = seeded_db(vec![known.clone()]);
        let config = DetectorConfig {
            reinforce_on_similarity: false,
            ..Default::default()
        };
        let result = classify(&known, "0x01", &db, &config);
        assert_eq!(result.verdict, BytecodeVerdict::Confirmed);
        assert!(!result.persist);
    }
}
