//! Type definitions for LpSentry
//! Data structures shared by the detector, the liquidity monitor and the gate

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::models::config::StatsWindow;

// ============================================
// BYTECODE
// ============================================

/// Presence flags for opcodes that let a contract rewrite or destroy itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskyOpcodes {
    pub delegatecall: bool,
    pub create2: bool,
    pub selfdestruct: bool,
    pub create: bool,
}

impl RiskyOpcodes {
    /// DELEGATECALL, CREATE2 or SELFDESTRUCT present. CREATE alone is not a veto.
    pub fn any_hard(&self) -> bool {
        self.delegatecall || self.create2 || self.selfdestruct
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.delegatecall {
            out.push("DELEGATECALL");
        }
        if self.create2 {
            out.push("CREATE2");
        }
        if self.selfdestruct {
            out.push("SELFDESTRUCT");
        }
        if self.create {
            out.push("CREATE");
        }
        out
    }
}

/// Structural summary of normalized contract bytecode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeFingerprint {
    /// Opcode -> occurrence count, PUSH immediates excluded
    #[serde(rename = "opHist")]
    pub op_hist: BTreeMap<u8, u32>,
    pub risky: RiskyOpcodes,
    /// Selector name -> present in bytecode hex
    pub selectors: BTreeMap<String, bool>,
}

impl BytecodeFingerprint {
    pub fn flagged_selectors(&self) -> Vec<String> {
        self.selectors
            .iter()
            .filter(|(_, hit)| **hit)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Detector verdict on a classified contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BytecodeVerdict {
    Clean,
    Suspicious,
    Confirmed,
}

impl BytecodeVerdict {
    /// clean=10, suspicious=5, confirmed=0
    pub fn score(&self) -> u8 {
        match self {
            Self::Clean => 10,
            Self::Suspicious => 5,
            Self::Confirmed => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "CLEAN",
            Self::Suspicious => "SUSPICIOUS",
            Self::Confirmed => "CONFIRMED",
        }
    }
}

/// Outcome of a detector call. NoCode and NoOpinion are neutral, not clean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BytecodeOutcome {
    Classified(BytecodeVerdict),
    /// Address has no deployed code
    NoCode,
    /// RPC failure or unparseable bytecode
    NoOpinion { reason: String },
}

impl BytecodeOutcome {
    pub fn score(&self) -> u8 {
        match self {
            Self::Classified(v) => v.score(),
            Self::NoCode | Self::NoOpinion { .. } => BytecodeVerdict::Clean.score(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        !matches!(self, Self::Classified(_))
    }
}

/// Which classification rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    EmptyDatabase,
    ExactHash,
    RiskyOpcode,
    Similarity,
    NoMatch,
}

/// Diagnostics attached to every classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDetails {
    pub match_kind: Option<MatchKind>,
    pub code_hash: Option<String>,
    pub normalized_len: usize,
    pub best_similarity: f64,
    pub risky_opcodes: Vec<String>,
    pub flagged_selectors: Vec<String>,
    /// A new hash/fingerprint was written to the rug database
    pub persisted: bool,
}

/// `classify_bytecode` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeReport {
    pub address: Address,
    pub score: u8,
    pub outcome: BytecodeOutcome,
    pub details: ClassificationDetails,
}

impl BytecodeReport {
    pub fn new(address: Address, outcome: BytecodeOutcome, details: ClassificationDetails) -> Self {
        Self {
            address,
            score: outcome.score(),
            outcome,
            details,
        }
    }

    pub fn summary(&self) -> String {
        let label = match &self.outcome {
            BytecodeOutcome::Classified(v) => v.as_str().to_string(),
            BytecodeOutcome::NoCode => "NO_CODE".to_string(),
            BytecodeOutcome::NoOpinion { reason } => format!("NO_OPINION ({})", reason),
        };
        format!(
            "{} | score {} | match {:?} | similarity {:.3} | risky [{}] | selectors [{}]",
            label,
            self.score,
            self.details.match_kind,
            self.details.best_similarity,
            self.details.risky_opcodes.join(","),
            self.details.flagged_selectors.join(","),
        )
    }
}

// ============================================
// LIQUIDITY
// ============================================

/// Machine-readable reason codes emitted by the monitor and the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NoData,
    Stable,
    LpDrain,
    HeavySellPressure,
    LightSellPressure,
    SellFlowNoPriceBreak,
    BuyPressure,
    Cooldown,
    RpcError,
    PairMismatch,
    NoLiquidity,
    BuyExecuted,
    MaxWaitExpired,
    MarketCheckFailed,
    MarketUnhealthy,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "NO_DATA",
            Self::Stable => "STABLE",
            Self::LpDrain => "LP_DRAIN",
            Self::HeavySellPressure => "HEAVY_SELL_PRESSURE",
            Self::LightSellPressure => "LIGHT_SELL_PRESSURE",
            Self::SellFlowNoPriceBreak => "SELL_FLOW_NO_PRICE_BREAK",
            Self::BuyPressure => "BUY_PRESSURE",
            Self::Cooldown => "COOLDOWN",
            Self::RpcError => "RPC_ERROR",
            Self::PairMismatch => "PAIR_MISMATCH",
            Self::NoLiquidity => "NO_LIQUIDITY",
            Self::BuyExecuted => "BUY_EXECUTED",
            Self::MaxWaitExpired => "MAX_WAIT_EXPIRED",
            Self::MarketCheckFailed => "MARKET_CHECK_FAILED",
            Self::MarketUnhealthy => "MARKET_UNHEALTHY",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitor state after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityState {
    NoData,
    Stable,
    Draining,
    HeavySell,
    LightSell,
    BuyPressure,
    Cooldown,
    /// RPC failure, pair mismatch or empty pool
    Unavailable,
}

impl LiquidityState {
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::NoData => "⏳",
            Self::Stable => "✅",
            Self::Draining => "💀",
            Self::HeavySell => "🔴",
            Self::LightSell => "🟠",
            Self::BuyPressure => "🟢",
            Self::Cooldown => "🧊",
            Self::Unavailable => "❓",
        }
    }
}

/// Pool reserves at one tick, oriented token / paired asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub token_reserve: U256,
    pub paired_reserve: U256,
    /// paired * 1e18 / token
    pub price_scaled: U256,
    pub timestamp: DateTime<Utc>,
}

impl ReserveSnapshot {
    /// None when either reserve is zero (no signal)
    pub fn try_new(token_reserve: U256, paired_reserve: U256, timestamp: DateTime<Utc>) -> Option<Self> {
        if token_reserve.is_zero() || paired_reserve.is_zero() {
            return None;
        }
        let scale = U256::from(1_000_000_000_000_000_000u128);
        let price_scaled = paired_reserve.saturating_mul(scale) / token_reserve;
        Some(Self {
            token_reserve,
            paired_reserve,
            price_scaled,
            timestamp,
        })
    }
}

/// Basis-point moves between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveDeltas {
    pub token_bps: i64,
    pub paired_bps: i64,
    pub price_bps: i64,
}

/// Result of one monitor tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityCheck {
    pub pair: Address,
    /// False on RPC or structural failure
    pub ok: bool,
    pub safe_to_buy: bool,
    pub state: LiquidityState,
    pub reason: ReasonCode,
    pub token_reserve: Option<U256>,
    pub paired_reserve: Option<U256>,
    pub price_scaled: Option<U256>,
    pub deltas: Option<ReserveDeltas>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl LiquidityCheck {
    /// Failed tick with no reserve data
    pub fn failure(pair: Address, reason: ReasonCode, error: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            pair,
            ok: false,
            safe_to_buy: false,
            state: LiquidityState::Unavailable,
            reason,
            token_reserve: None,
            paired_reserve: None,
            price_scaled: None,
            deltas: None,
            cooldown_until: None,
            timestamp,
            error: Some(error),
        }
    }

    /// Counts against the gate
    pub fn is_blocking(&self) -> bool {
        !self.ok || !self.safe_to_buy
    }

    pub fn summary(&self) -> String {
        let deltas = self
            .deltas
            .map(|d| {
                format!(
                    " | Δtoken {}bps Δpaired {}bps Δprice {}bps",
                    d.token_bps, d.paired_bps, d.price_bps
                )
            })
            .unwrap_or_default();
        format!(
            "{} {} | safe: {}{}",
            self.state.emoji(),
            self.reason,
            self.safe_to_buy,
            deltas
        )
    }
}

// ============================================
// MARKET BEHAVIOR
// ============================================

/// Aggregate trade statistics over a lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub window: StatsWindow,
    pub buys: u64,
    pub sells: u64,
    pub volume_usd: f64,
    pub liquidity_usd: Option<f64>,
}

/// Result of a market-behavior check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCheckResult {
    /// False when statistics could not be fetched
    pub ok: bool,
    pub is_healthy: bool,
    pub reasons: Vec<String>,
    pub stats: Option<MarketStats>,
}

impl MarketCheckResult {
    pub fn healthy(stats: MarketStats) -> Self {
        Self {
            ok: true,
            is_healthy: true,
            reasons: Vec::new(),
            stats: Some(stats),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            is_healthy: false,
            reasons: vec![reason.into()],
            stats: None,
        }
    }
}

// ============================================
// GATE
// ============================================

/// Buy-safety gate output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub session_id: Uuid,
    pub pair: Address,
    pub token: Address,
    pub safe_to_buy: bool,
    /// Ordered short codes; empty only when cleared by consecutive passes
    pub reasons: Vec<String>,
    pub market: Option<MarketCheckResult>,
    pub liquidity: Option<LiquidityCheck>,
    pub polls: u32,
    pub consecutive_passes: u32,
    pub elapsed_ms: u64,
}

impl SafetyVerdict {
    pub fn has_reason(&self, code: ReasonCode) -> bool {
        self.reasons.iter().any(|r| r == code.as_str())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} | reasons [{}] | polls {} | passes {} | {}ms",
            if self.safe_to_buy { "✅ SAFE" } else { "🚫 BLOCKED" },
            self.pair,
            self.reasons.join(","),
            self.polls,
            self.consecutive_passes,
            self.elapsed_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_scores() {
        assert_eq!(BytecodeVerdict::Clean.score(), 10);
        assert_eq!(BytecodeVerdict::Suspicious.score(), 5);
        assert_eq!(BytecodeVerdict::Confirmed.score(), 0);
        assert_eq!(BytecodeOutcome::NoCode.score(), 10);
        assert!(BytecodeOutcome::NoOpinion { reason: "rpc".into() }.is_neutral());
        assert!(!BytecodeOutcome::Classified(BytecodeVerdict::Clean).is_neutral());
    }

    #[test]
    fn test_snapshot_zero_reserve_is_no_signal() {
        let now = Utc::now();
        assert!(ReserveSnapshot::try_new(U256::ZERO, U256::from(10), now).is_none());
        assert!(ReserveSnapshot::try_new(U256::from(10), U256::ZERO, now).is_none());
    }

    #[test]
    fn test_snapshot_price_scaling() {
        let snap = ReserveSnapshot::try_new(U256::from(1000), U256::from(10), Utc::now()).unwrap();
        // 10 * 1e18 / 1000 = 1e16
        assert_eq!(snap.price_scaled, U256::from(10_000_000_000_000_000u128));
    }

    #[test]
    fn test_reason_code_serde_matches_as_str() {
        let json = serde_json::to_string(&ReasonCode::SellFlowNoPriceBreak).unwrap();
        assert_eq!(json, "\"SELL_FLOW_NO_PRICE_BREAK\"");
        assert_eq!(ReasonCode::LpDrain.to_string(), "LP_DRAIN");
    }

    #[test]
    fn test_risky_opcodes_hard_veto() {
        let only_create = RiskyOpcodes {
            create: true,
            ..Default::default()
        };
        assert!(!only_create.any_hard());
        let with_delegate = RiskyOpcodes {
            delegatecall: true,
            ..Default::default()
        };
        assert!(with_delegate.any_hard());
        assert_eq!(with_delegate.names(), vec!["DELEGATECALL"]);
    }
}
