//! Configuration module for LpSentry
//!
//! All decision thresholds live in named, validated structs. Defaults come from
//! utils/constants.rs; `SentryConfig::from_env` applies environment overrides.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    get_chain_name, get_public_rpc_fallback, get_weth_address, is_chain_supported,
    BPS_DENOMINATOR, CHAIN_ID_ETHEREUM, DEFAULT_CACHE_TTL_SECS, DEFAULT_CONFIRM_SIMILARITY,
    DEFAULT_COOLDOWN_MINUTES, DEFAULT_DRAIN_BPS, DEFAULT_HEAVY_SELL_BPS, DEFAULT_LIGHT_SELL_BPS,
    DEFAULT_MAX_WAIT_MINUTES, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUIRED_PASSES,
    DEFAULT_RPC_MAX_CONCURRENT, DEFAULT_RPC_MIN_INTERVAL_MS, DEFAULT_RPC_TIMEOUT_SECS,
    DEFAULT_SUSPICION_SIMILARITY,
};

// ============================================
// BYTECODE DETECTOR
// ============================================

/// Bytecode rug-similarity detector settings
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path of the persisted rug database (JSON)
    pub db_path: PathBuf,
    /// Cosine similarity at or above which a match is confirmed
    pub confirm_similarity: f64,
    /// Cosine similarity at or above which a match is suspicious
    pub suspicion_similarity: f64,
    /// Persist similarity-confirmed fingerprints back into the database
    pub reinforce_on_similarity: bool,
    /// TTL of per-address classification cache entries
    pub cache_ttl_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/rug_db.json"),
            confirm_similarity: DEFAULT_CONFIRM_SIMILARITY,
            suspicion_similarity: DEFAULT_SUSPICION_SIMILARITY,
            reinforce_on_similarity: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> AppResult<()> {
        let in_unit = |v: f64| v > 0.0 && v <= 1.0;
        if !in_unit(self.confirm_similarity) || !in_unit(self.suspicion_similarity) {
            return Err(AppError::invalid_config(
                "similarity thresholds must be in (0, 1]",
            ));
        }
        if self.suspicion_similarity > self.confirm_similarity {
            return Err(AppError::invalid_config(format!(
                "suspicion_similarity ({}) must not exceed confirm_similarity ({})",
                self.suspicion_similarity, self.confirm_similarity
            )));
        }
        Ok(())
    }
}

// ============================================
// LIQUIDITY MONITOR
// ============================================

/// Liquidity-pressure classification thresholds (basis points)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Both reserves down by at least this = LP drain
    pub drain_bps: u64,
    /// Price move at or below -this = heavy sell pressure
    pub heavy_sell_bps: u64,
    /// Price move at or below -this = light sell pressure
    pub light_sell_bps: u64,
    /// Cooldown after a drain
    pub cooldown_minutes: u64,
    /// Heavy sell pressure blocks buys (advisory when false)
    pub heavy_sell_blocks: bool,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            drain_bps: DEFAULT_DRAIN_BPS,
            heavy_sell_bps: DEFAULT_HEAVY_SELL_BPS,
            light_sell_bps: DEFAULT_LIGHT_SELL_BPS,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            heavy_sell_blocks: false,
        }
    }
}

impl MonitorThresholds {
    pub fn validate(&self) -> AppResult<()> {
        if self.drain_bps == 0 || self.drain_bps > BPS_DENOMINATOR {
            return Err(AppError::invalid_config(format!(
                "drain_bps must be in 1..={}, got {}",
                BPS_DENOMINATOR, self.drain_bps
            )));
        }
        if self.light_sell_bps == 0 || self.light_sell_bps > self.heavy_sell_bps {
            return Err(AppError::invalid_config(format!(
                "light_sell_bps ({}) must be > 0 and <= heavy_sell_bps ({})",
                self.light_sell_bps, self.heavy_sell_bps
            )));
        }
        if self.heavy_sell_bps > BPS_DENOMINATOR {
            return Err(AppError::invalid_config(format!(
                "heavy_sell_bps must be <= {}, got {}",
                BPS_DENOMINATOR, self.heavy_sell_bps
            )));
        }
        Ok(())
    }

    /// Cooldown as a chrono duration
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown_minutes as i64)
    }
}

// ============================================
// BUY-SAFETY GATE
// ============================================

/// Options for one buy-safety gate invocation
#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Time between polls
    pub poll_interval: Duration,
    /// Hard timeout
    pub max_wait_minutes: u64,
    /// Consecutive clean polls required for a positive verdict
    pub required_consecutive_passes: u32,
    /// Passed through to the liquidity monitor
    pub cooldown_minutes: u64,
    /// Remaining liquidity thresholds
    pub thresholds: MonitorThresholds,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_wait_minutes: DEFAULT_MAX_WAIT_MINUTES,
            required_consecutive_passes: DEFAULT_REQUIRED_PASSES,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            thresholds: MonitorThresholds::default(),
        }
    }
}

impl GateOptions {
    pub fn validate(&self) -> AppResult<()> {
        if self.poll_interval.is_zero() {
            return Err(AppError::invalid_config("poll_interval must be > 0"));
        }
        if self.max_wait_minutes == 0 {
            return Err(AppError::invalid_config("max_wait_minutes must be > 0"));
        }
        if self.required_consecutive_passes == 0 {
            return Err(AppError::invalid_config(
                "required_consecutive_passes must be >= 1",
            ));
        }
        self.monitor_thresholds().validate()
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_minutes.saturating_mul(60))
    }

    /// Thresholds handed to the gate's monitor, with the cooldown passed through
    pub fn monitor_thresholds(&self) -> MonitorThresholds {
        MonitorThresholds {
            cooldown_minutes: self.cooldown_minutes,
            ..self.thresholds
        }
    }
}

// ============================================
// MARKET BEHAVIOR CHECK
// ============================================

/// DexScreener transaction window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsWindow {
    M5,
    H1,
}

impl StatsWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M5 => "m5",
            Self::H1 => "h1",
        }
    }
}

impl FromStr for StatsWindow {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "m5" => Ok(Self::M5),
            "h1" => Ok(Self::H1),
            other => Err(AppError::invalid_config(format!(
                "unknown stats window '{}', expected m5 or h1",
                other
            ))),
        }
    }
}

/// Market-behavior health policy
#[derive(Debug, Clone)]
pub struct MarketCheckConfig {
    pub window: StatsWindow,
    /// Minimum buy transactions inside the window
    pub min_buys: u64,
    /// Maximum sells/buys ratio before sellers dominate
    pub max_sell_buy_ratio: f64,
    /// Minimum USD volume inside the window
    pub min_volume_usd: f64,
    /// DexScreener base URL
    pub base_url: String,
}

impl Default for MarketCheckConfig {
    fn default() -> Self {
        Self {
            window: StatsWindow::M5,
            min_buys: 5,
            max_sell_buy_ratio: 1.5,
            min_volume_usd: 500.0,
            base_url: "https://api.dexscreener.com/latest/dex".to_string(),
        }
    }
}

impl MarketCheckConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.max_sell_buy_ratio.is_nan() || self.max_sell_buy_ratio <= 0.0 {
            return Err(AppError::invalid_config("max_sell_buy_ratio must be > 0"));
        }
        if self.min_volume_usd < 0.0 {
            return Err(AppError::invalid_config("min_volume_usd must be >= 0"));
        }
        Ok(())
    }
}

// ============================================
// RPC
// ============================================

/// Chain reader settings
#[derive(Debug, Clone)]
pub struct RpcSettings {
    /// Ordered endpoint list; rotated on failure
    pub urls: Vec<String>,
    pub timeout: Duration,
    /// In-flight call bound
    pub max_concurrent: usize,
    /// Minimum spacing between call starts
    pub min_interval: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self::for_chain(CHAIN_ID_ETHEREUM)
    }
}

impl RpcSettings {
    pub fn for_chain(chain_id: u64) -> Self {
        Self {
            urls: get_public_rpc_fallback(chain_id)
                .map(|u| vec![u.to_string()])
                .unwrap_or_default(),
            timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            max_concurrent: DEFAULT_RPC_MAX_CONCURRENT,
            min_interval: Duration::from_millis(DEFAULT_RPC_MIN_INTERVAL_MS),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.urls.is_empty() {
            return Err(AppError::no_endpoints());
        }
        if self.max_concurrent == 0 {
            return Err(AppError::invalid_config("rpc max_concurrent must be >= 1"));
        }
        Ok(())
    }
}

// ============================================
// TOP-LEVEL
// ============================================

/// Full configuration for the sentry
#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub chain_id: u64,
    /// Asset every watched pool is expected to pair against (wrapped native)
    pub paired_asset: Address,
    pub rpc: RpcSettings,
    pub detector: DetectorConfig,
    pub gate: GateOptions,
    pub market: MarketCheckConfig,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self::for_chain(CHAIN_ID_ETHEREUM).unwrap_or_else(|_| Self {
            chain_id: CHAIN_ID_ETHEREUM,
            paired_asset: Address::ZERO,
            rpc: RpcSettings::for_chain(CHAIN_ID_ETHEREUM),
            detector: DetectorConfig::default(),
            gate: GateOptions::default(),
            market: MarketCheckConfig::default(),
        })
    }
}

impl SentryConfig {
    /// Defaults for a supported chain
    pub fn for_chain(chain_id: u64) -> AppResult<Self> {
        if !is_chain_supported(chain_id) {
            return Err(AppError::unsupported_chain(chain_id));
        }
        let paired_asset =
            get_weth_address(chain_id).ok_or_else(|| AppError::unsupported_chain(chain_id))?;

        Ok(Self {
            chain_id,
            paired_asset,
            rpc: RpcSettings::for_chain(chain_id),
            detector: DetectorConfig::default(),
            gate: GateOptions::default(),
            market: MarketCheckConfig::default(),
        })
    }

    /// Load configuration from environment variables
    ///
    /// Recognized: LP_SENTRY_CHAIN_ID, LP_SENTRY_RPC_URLS (comma separated),
    /// LP_SENTRY_PAIRED_ASSET, LP_SENTRY_RUG_DB, LP_SENTRY_CONFIRM_SIMILARITY,
    /// LP_SENTRY_SUSPICION_SIMILARITY, LP_SENTRY_REINFORCE, LP_SENTRY_DRAIN_BPS,
    /// LP_SENTRY_HEAVY_SELL_BPS, LP_SENTRY_LIGHT_SELL_BPS, LP_SENTRY_HEAVY_SELL_BLOCKS,
    /// LP_SENTRY_COOLDOWN_MINUTES, LP_SENTRY_POLL_MS, LP_SENTRY_MAX_WAIT_MINUTES,
    /// LP_SENTRY_REQUIRED_PASSES, LP_SENTRY_MARKET_WINDOW.
    pub fn from_env() -> AppResult<Self> {
        let chain_id = env_parse("LP_SENTRY_CHAIN_ID", CHAIN_ID_ETHEREUM)?;
        let mut config = Self::for_chain(chain_id)?;

        if let Ok(urls) = std::env::var("LP_SENTRY_RPC_URLS") {
            let urls: Vec<String> = urls
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
            if !urls.is_empty() {
                config.rpc.urls = urls;
            }
        }
        if let Ok(asset) = std::env::var("LP_SENTRY_PAIRED_ASSET") {
            config.paired_asset = Address::from_str(asset.trim()).map_err(|e| {
                AppError::invalid_config(format!("LP_SENTRY_PAIRED_ASSET: {}", e))
            })?;
        }
        if let Ok(path) = std::env::var("LP_SENTRY_RUG_DB") {
            config.detector.db_path = PathBuf::from(path);
        }

        let d = &mut config.detector;
        d.confirm_similarity = env_parse("LP_SENTRY_CONFIRM_SIMILARITY", d.confirm_similarity)?;
        d.suspicion_similarity =
            env_parse("LP_SENTRY_SUSPICION_SIMILARITY", d.suspicion_similarity)?;
        d.reinforce_on_similarity = env_parse("LP_SENTRY_REINFORCE", d.reinforce_on_similarity)?;

        let g = &mut config.gate;
        g.thresholds.drain_bps = env_parse("LP_SENTRY_DRAIN_BPS", g.thresholds.drain_bps)?;
        g.thresholds.heavy_sell_bps =
            env_parse("LP_SENTRY_HEAVY_SELL_BPS", g.thresholds.heavy_sell_bps)?;
        g.thresholds.light_sell_bps =
            env_parse("LP_SENTRY_LIGHT_SELL_BPS", g.thresholds.light_sell_bps)?;
        g.thresholds.heavy_sell_blocks =
            env_parse("LP_SENTRY_HEAVY_SELL_BLOCKS", g.thresholds.heavy_sell_blocks)?;
        g.cooldown_minutes = env_parse("LP_SENTRY_COOLDOWN_MINUTES", g.cooldown_minutes)?;
        g.thresholds.cooldown_minutes = g.cooldown_minutes;
        g.poll_interval = Duration::from_millis(env_parse(
            "LP_SENTRY_POLL_MS",
            g.poll_interval.as_millis() as u64,
        )?);
        g.max_wait_minutes = env_parse("LP_SENTRY_MAX_WAIT_MINUTES", g.max_wait_minutes)?;
        g.required_consecutive_passes =
            env_parse("LP_SENTRY_REQUIRED_PASSES", g.required_consecutive_passes)?;

        config.market.window = env_parse("LP_SENTRY_MARKET_WINDOW", config.market.window)?;

        config.validate()?;

        info!(
            "⚙️ Config loaded: chain {} ({}), {} RPC endpoint(s), rug db {}",
            config.chain_id,
            get_chain_name(config.chain_id),
            config.rpc.urls.len(),
            config.detector.db_path.display()
        );

        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.rpc.validate()?;
        self.detector.validate()?;
        self.gate.validate()?;
        self.market.validate()
    }
}

/// Parse an optional environment variable, keeping the default when unset
fn env_parse<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::invalid_config(format!("{}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
