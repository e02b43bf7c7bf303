//! Session telemetry
//!
//! Counters for detector verdicts, liquidity signals and gate outcomes.
//! Addresses are never recorded; only counts and latencies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::models::types::{BytecodeOutcome, LiquidityCheck, SafetyVerdict};

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub classifications: u64,
    /// Verdict label (CLEAN, SUSPICIOUS, CONFIRMED, NO_CODE, NO_OPINION) -> count
    pub classifications_by_verdict: HashMap<String, u64>,
    pub liquidity_ticks: u64,
    /// Reason code -> count
    pub signals_by_reason: HashMap<String, u64>,
    pub gates_run: u64,
    pub gates_passed: u64,
    /// First reason of blocked verdicts -> count
    pub gate_blocks_by_reason: HashMap<String, u64>,
    pub avg_gate_latency_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    pub fn summary(&self) -> String {
        let mut verdicts: Vec<_> = self.classifications_by_verdict.iter().collect();
        verdicts.sort();
        let mut signals: Vec<_> = self.signals_by_reason.iter().collect();
        signals.sort();

        format!(
            "📈 Session: {} classification(s) {:?} | {} liquidity tick(s) {:?} | gates {}/{} passed, avg {:.0}ms",
            self.classifications,
            verdicts,
            self.liquidity_ticks,
            signals,
            self.gates_passed,
            self.gates_run,
            self.avg_gate_latency_ms,
        )
    }
}

/// Process-wide telemetry collector
pub struct SentryTelemetry {
    classifications: AtomicU64,
    liquidity_ticks: AtomicU64,
    gates_run: AtomicU64,
    gates_passed: AtomicU64,
    total_gate_latency_ms: AtomicU64,
    verdict_counts: RwLock<HashMap<String, u64>>,
    reason_counts: RwLock<HashMap<String, u64>>,
    block_counts: RwLock<HashMap<String, u64>>,
    session_start: u64,
}

impl Default for SentryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl SentryTelemetry {
    pub fn new() -> Self {
        Self {
            classifications: AtomicU64::new(0),
            liquidity_ticks: AtomicU64::new(0),
            gates_run: AtomicU64::new(0),
            gates_passed: AtomicU64::new(0),
            total_gate_latency_ms: AtomicU64::new(0),
            verdict_counts: RwLock::new(HashMap::new()),
            reason_counts: RwLock::new(HashMap::new()),
            block_counts: RwLock::new(HashMap::new()),
            session_start: current_timestamp(),
        }
    }

    fn bump(map: &RwLock<HashMap<String, u64>>, key: &str) {
        if let Ok(mut counts) = map.write() {
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }

    fn snapshot(map: &RwLock<HashMap<String, u64>>) -> HashMap<String, u64> {
        map.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn record_classification(&self, outcome: &BytecodeOutcome) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
        let label = match outcome {
            BytecodeOutcome::Classified(v) => v.as_str(),
            BytecodeOutcome::NoCode => "NO_CODE",
            BytecodeOutcome::NoOpinion { .. } => "NO_OPINION",
        };
        Self::bump(&self.verdict_counts, label);
    }

    pub fn record_liquidity(&self, check: &LiquidityCheck) {
        self.liquidity_ticks.fetch_add(1, Ordering::Relaxed);
        Self::bump(&self.reason_counts, check.reason.as_str());
    }

    pub fn record_gate(&self, verdict: &SafetyVerdict) {
        self.gates_run.fetch_add(1, Ordering::Relaxed);
        self.total_gate_latency_ms
            .fetch_add(verdict.elapsed_ms, Ordering::Relaxed);
        if verdict.safe_to_buy {
            self.gates_passed.fetch_add(1, Ordering::Relaxed);
        } else if let Some(first) = verdict.reasons.first() {
            Self::bump(&self.block_counts, first);
        }
    }

    pub fn get_stats(&self) -> TelemetryStats {
        let gates_run = self.gates_run.load(Ordering::Relaxed);
        let total_latency = self.total_gate_latency_ms.load(Ordering::Relaxed);
        let avg_gate_latency_ms = if gates_run > 0 {
            total_latency as f64 / gates_run as f64
        } else {
            0.0
        };

        TelemetryStats {
            classifications: self.classifications.load(Ordering::Relaxed),
            classifications_by_verdict: Self::snapshot(&self.verdict_counts),
            liquidity_ticks: self.liquidity_ticks.load(Ordering::Relaxed),
            signals_by_reason: Self::snapshot(&self.reason_counts),
            gates_run,
            gates_passed: self.gates_passed.load(Ordering::Relaxed),
            gate_blocks_by_reason: Self::snapshot(&self.block_counts),
            avg_gate_latency_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Write current stats to `<dir>/stats_<unix>.json`
    pub fn export_stats_json(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(dir)?;
        let stats = self.get_stats();
        let path = dir.join(format!("stats_{}.json", current_timestamp()));
        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
