//! LpSentry Library
//!
//! On-chain token-safety gating for EVM DEX tokens:
//! - Bytecode rug-similarity detection against a persisted rug database
//! - Liquidity-pressure monitoring of a pool's reserves
//! - A buy-safety gate that requires consecutive clean readings

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    BuySafetyGate, LiquidityMonitor, MonitorState, PurchaseLatch, RugDatabase, RugDetector,
};
pub use models::{
    AppError, AppResult, BytecodeOutcome, BytecodeReport, BytecodeVerdict, ErrorCode,
    GateOptions, LiquidityCheck, MonitorThresholds, ReasonCode, SafetyVerdict, SentryConfig,
};
pub use providers::{ChainReader, DexScreenerMarketCheck, MarketBehaviorCheck, RpcProvider};
pub use utils::telemetry::SentryTelemetry;
