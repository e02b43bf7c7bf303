//! DexScreener market-behavior check
//!
//! Reads per-pair trade counts and volume over a short window and judges
//! whether real buyers are present. DexScreener lags the chain by seconds, so
//! this only complements the on-chain reserve monitor; it never replaces it.
//!
//! API: https://api.dexscreener.com/latest/dex/pairs/{chainId}/{pairAddress}
//! Free, no API key required

use alloy_primitives::Address;
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::config::{MarketCheckConfig, StatsWindow};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{MarketCheckResult, MarketStats};
use crate::providers::ports::MarketBehaviorCheck;
use crate::utils::constants::{chain_id_to_dexscreener_name, USER_AGENT as USER_AGENT_CONST};

pub const REASON_LOW_BUY_COUNT: &str = "LOW_BUY_COUNT";
pub const REASON_SELL_DOMINANCE: &str = "SELL_DOMINANCE";
pub const REASON_LOW_VOLUME: &str = "LOW_VOLUME";
pub const REASON_PAIR_NOT_FOUND: &str = "PAIR_NOT_FOUND";
pub const REASON_API_ERROR: &str = "MARKET_API_ERROR";

/// DexScreener pairs response; the endpoint returns `pair`, `pairs` or both
#[derive(Debug, Deserialize)]
pub struct DexPairsResponse {
    #[serde(default)]
    pub pair: Option<DexPair>,
    #[serde(default)]
    pub pairs: Option<Vec<DexPair>>,
}

impl DexPairsResponse {
    /// The entry for `pair_address`, if present
    pub fn find(self, pair_address: &str) -> Option<DexPair> {
        let wanted = pair_address.to_lowercase();
        self.pair
            .into_iter()
            .chain(self.pairs.unwrap_or_default())
            .find(|p| p.pair_address.to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub pair_address: String,
    #[serde(default)]
    pub txns: Option<DexTxns>,
    #[serde(default)]
    pub volume: Option<DexVolume>,
    #[serde(default)]
    pub liquidity: Option<DexLiquidity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DexTxnCount {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexTxns {
    pub m5: Option<DexTxnCount>,
    pub h1: Option<DexTxnCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexVolume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexLiquidity {
    pub usd: Option<f64>,
}

impl DexPair {
    /// Aggregate statistics for one window; missing fields count as zero
    pub fn stats(&self, window: StatsWindow) -> MarketStats {
        let txns = self
            .txns
            .as_ref()
            .and_then(|t| match window {
                StatsWindow::M5 => t.m5.clone(),
                StatsWindow::H1 => t.h1.clone(),
            })
            .unwrap_or_default();
        let volume_usd = self
            .volume
            .as_ref()
            .and_then(|v| match window {
                StatsWindow::M5 => v.m5,
                StatsWindow::H1 => v.h1,
            })
            .unwrap_or(0.0);

        MarketStats {
            window,
            buys: txns.buys,
            sells: txns.sells,
            volume_usd,
            liquidity_usd: self.liquidity.as_ref().and_then(|l| l.usd),
        }
    }
}

/// Apply the health policy to window statistics
pub fn evaluate(stats: MarketStats, config: &MarketCheckConfig) -> MarketCheckResult {
    let mut reasons = Vec::new();

    if stats.buys < config.min_buys {
        reasons.push(REASON_LOW_BUY_COUNT.to_string());
    }

    let sell_dominant = if stats.buys == 0 {
        stats.sells > 0
    } else {
        stats.sells as f64 / stats.buys as f64 > config.max_sell_buy_ratio
    };
    if sell_dominant {
        reasons.push(REASON_SELL_DOMINANCE.to_string());
    }

    if stats.volume_usd < config.min_volume_usd {
        reasons.push(REASON_LOW_VOLUME.to_string());
    }

    MarketCheckResult {
        ok: true,
        is_healthy: reasons.is_empty(),
        reasons,
        stats: Some(stats),
    }
}

/// Market-behavior check backed by DexScreener pair statistics
pub struct DexScreenerMarketCheck {
    client: reqwest::Client,
    config: MarketCheckConfig,
    chain_name: &'static str,
}

impl DexScreenerMarketCheck {
    pub fn new(chain_id: u64, config: MarketCheckConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            config,
            chain_name: chain_id_to_dexscreener_name(chain_id),
        })
    }

    async fn fetch_pair(&self, pair: Address) -> AppResult<DexPair> {
        let pair_hex = format!("{:#x}", pair);
        let url = format!("{}/pairs/{}/{}", self.config.base_url, self.chain_name, pair_hex);

        debug!("🔍 DexScreener: fetching {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            AppError::with_source(ErrorCode::MarketApiError, "DexScreener request failed", e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::new(
                ErrorCode::MarketApiError,
                format!("DexScreener API error: {}", status),
            ));
        }

        let data: DexPairsResponse = response.json().await.map_err(|e| {
            AppError::with_source(
                ErrorCode::MarketApiError,
                "Failed to parse DexScreener response",
                e,
            )
        })?;

        data.find(&pair_hex).ok_or_else(|| {
            AppError::new(
                ErrorCode::MarketPairNotFound,
                format!("DexScreener has no pair {} on {}", pair_hex, self.chain_name),
            )
        })
    }
}

/// Map a fetch outcome onto the health verdict
///
/// An unknown pair is a judgement on the data (ok, unhealthy); anything else
/// means the statistics could not be read.
pub fn market_result(fetched: AppResult<DexPair>, config: &MarketCheckConfig) -> MarketCheckResult {
    match fetched {
        Ok(found) => evaluate(found.stats(config.window), config),
        Err(e) if e.code == ErrorCode::MarketPairNotFound => MarketCheckResult {
            ok: true,
            is_healthy: false,
            reasons: vec![REASON_PAIR_NOT_FOUND.to_string()],
            stats: None,
        },
        Err(_) => MarketCheckResult::failed(REASON_API_ERROR),
    }
}

#[async_trait]
impl MarketBehaviorCheck for DexScreenerMarketCheck {
    async fn check(&self, pair: Address, _token: Address) -> MarketCheckResult {
        let fetched = self.fetch_pair(pair).await;
        if let Err(e) = &fetched {
            warn!("⚠️ DexScreener check for {}: {}", pair, e);
        }
        let result = market_result(fetched, &self.config);
        debug!(
            "📊 DexScreener {}: healthy={} reasons={:?}",
            pair, result.is_healthy, result.reasons
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(buys: u64, sells: u64, volume_usd: f64) -> MarketStats {
        MarketStats {
            window: StatsWindow::M5,
            buys,
            sells,
            volume_usd,
            liquidity_usd: None,
        }
    }

    #[test]
    fn test_healthy_market() {
        let result = evaluate(stats(20, 10, 5_000.0), &MarketCheckConfig::default());
        assert!(result.ok);
        assert!(result.is_healthy);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_unhealthy_reasons_in_order() {
        let result = evaluate(stats(2, 10, 100.0), &MarketCheckConfig::default());
        assert!(result.ok);
        assert!(!result.is_healthy);
        assert_eq!(
            result.reasons,
            vec![REASON_LOW_BUY_COUNT, REASON_SELL_DOMINANCE, REASON_LOW_VOLUME]
        );
    }

    #[test]
    fn test_sells_with_no_buys_dominate() {
        let config = MarketCheckConfig {
            min_buys: 0,
            min_volume_usd: 0.0,
            ..Default::default()
        };
        let result = evaluate(stats(0, 1, 0.0), &config);
        assert_eq!(result.reasons, vec![REASON_SELL_DOMINANCE]);

        let quiet = evaluate(stats(0, 0, 0.0), &config);
        assert!(quiet.is_healthy);
    }

    #[test]
    fn test_parse_pairs_response() {
        let raw = r#"{
            "schemaVersion": "1.0.0",
            "pairs": [{
                "chainId": "ethereum",
                "pairAddress": "0xA43fe16908251ee70EF74718545e4FE6C5cCEc9f",
                "txns": { "m5": { "buys": 12, "sells": 4 }, "h1": { "buys": 90, "sells": 70 } },
                "volume": { "m5": 1500.5, "h1": 20000 },
                "liquidity": { "usd": 250000.0 }
            }],
            "pair": null
        }"#;
        let resp: DexPairsResponse = serde_json::from_str(raw).unwrap();
        let pair = resp
            .find("0xa43fe16908251ee70ef74718545e4fe6c5ccec9f")
            .unwrap();

        let m5 = pair.stats(StatsWindow::M5);
        assert_eq!((m5.buys, m5.sells), (12, 4));
        assert_eq!(m5.volume_usd, 1500.5);
        assert_eq!(m5.liquidity_usd, Some(250000.0));

        let h1 = pair.stats(StatsWindow::H1);
        assert_eq!((h1.buys, h1.sells), (90, 70));
    }

    #[test]
    fn test_fetch_errors_map_to_reasons() {
        let config = MarketCheckConfig::default();

        let missing = market_result(
            Err(AppError::new(ErrorCode::MarketPairNotFound, "no pair")),
            &config,
        );
        assert!(missing.ok);
        assert!(!missing.is_healthy);
        assert_eq!(missing.reasons, vec![REASON_PAIR_NOT_FOUND]);

        let down = market_result(
            Err(AppError::new(ErrorCode::MarketApiError, "HTTP 502")),
            &config,
        );
        assert!(!down.ok);
        assert_eq!(down.reasons, vec![REASON_API_ERROR]);
    }

    #[test]
    fn test_missing_pair_and_fields() {
        let resp: DexPairsResponse = serde_json::from_str(r#"{"pairs": null}"#).unwrap();
        assert!(resp.find("0x01").is_none());

        let raw = r#"{"pair": {"pairAddress": "0x01"}}"#;
        let resp: DexPairsResponse = serde_json::from_str(raw).unwrap();
        let stats = resp.find("0x01").unwrap().stats(StatsWindow::M5);
        assert_eq!((stats.buys, stats.sells), (0, 0));
        assert_eq!(stats.volume_usd, 0.0);
    }
}
