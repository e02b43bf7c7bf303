//! Buy-Safety Gate
//!
//! Polls a market-behavior check and a liquidity monitor side by side until
//! enough consecutive clean readings accumulate, the wait budget runs out, or
//! a purchase is reported as already executed.

use alloy_primitives::Address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::liquidity_monitor::LiquidityMonitor;
use crate::models::config::GateOptions;
use crate::models::errors::AppResult;
use crate::models::types::{LiquidityCheck, MarketCheckResult, ReasonCode, SafetyVerdict};
use crate::providers::ports::{ChainReader, MarketBehaviorCheck};
use crate::utils::telemetry::SentryTelemetry;

/// One-way "purchase executed" flag shared by a trading session
///
/// Clones share the flag. Once raised it is never cleared.
#[derive(Debug, Clone, Default)]
pub struct PurchaseLatch(Arc<AtomicBool>);

impl PurchaseLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            info!("🛒 Purchase latch raised");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reasons one iteration counts as dirty; empty when clean
pub fn blocking_reasons(market: &MarketCheckResult, liquidity: &LiquidityCheck) -> Vec<String> {
    let mut reasons = Vec::new();

    if !market.ok {
        reasons.push(ReasonCode::MarketCheckFailed.to_string());
        reasons.extend(market.reasons.iter().cloned());
    } else if !market.is_healthy {
        if market.reasons.is_empty() {
            reasons.push(ReasonCode::MarketUnhealthy.to_string());
        } else {
            reasons.extend(market.reasons.iter().cloned());
        }
    }

    if liquidity.is_blocking() {
        reasons.push(liquidity.reason.to_string());
    }

    reasons
}

pub struct BuySafetyGate {
    chain: Arc<dyn ChainReader>,
    market: Arc<dyn MarketBehaviorCheck>,
    /// Asset every candidate pool must pair against
    paired_asset: Address,
    latch: PurchaseLatch,
    telemetry: Option<Arc<SentryTelemetry>>,
}

impl BuySafetyGate {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        market: Arc<dyn MarketBehaviorCheck>,
        paired_asset: Address,
        latch: PurchaseLatch,
    ) -> Self {
        Self {
            chain,
            market,
            paired_asset,
            latch,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<SentryTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn latch(&self) -> &PurchaseLatch {
        &self.latch
    }

    /// Decide whether buying `token` through `pair` is safe right now
    ///
    /// Only invalid options are an error; every other outcome is a verdict.
    pub async fn check_buy_safety(
        &self,
        pair: Address,
        token: Address,
        opts: &GateOptions,
    ) -> AppResult<SafetyVerdict> {
        opts.validate()?;

        // owned by this call; dropping it on any return stops its timer
        let monitor = LiquidityMonitor::with_telemetry(
            self.chain.clone(),
            pair,
            self.paired_asset,
            opts.monitor_thresholds(),
            self.telemetry.clone(),
        )?;

        let session = GateSession {
            id: Uuid::new_v4(),
            pair,
            token,
            started: Instant::now(),
        };
        info!(
            "🚦 Gate {} started: pair {} token {} ({} passes, max {}m)",
            session.id, pair, token, opts.required_consecutive_passes, opts.max_wait_minutes
        );

        let max_wait = opts.max_wait();
        let mut polls = 0u32;
        let mut passes = 0u32;
        let mut last_market: Option<MarketCheckResult> = None;
        let mut last_liquidity: Option<LiquidityCheck> = None;

        let verdict = loop {
            if self.latch.is_raised() {
                break session.verdict(
                    true,
                    vec![ReasonCode::BuyExecuted.to_string()],
                    last_market,
                    last_liquidity,
                    polls,
                    passes,
                );
            }

            if session.started.elapsed() >= max_wait {
                break session.verdict(
                    false,
                    vec![ReasonCode::MaxWaitExpired.to_string()],
                    last_market,
                    last_liquidity,
                    polls,
                    passes,
                );
            }

            let (market, liquidity) = tokio::join!(self.market.check(pair, token), monitor.check());
            polls += 1;

            let reasons = blocking_reasons(&market, &liquidity);
            if reasons.is_empty() {
                passes += 1;
                debug!(
                    "✅ Gate {} poll {}: clean ({}/{})",
                    session.id, polls, passes, opts.required_consecutive_passes
                );
            } else {
                if passes > 0 {
                    debug!("↩️ Gate {} poll {}: streak reset by {:?}", session.id, polls, reasons);
                } else {
                    debug!("⛔ Gate {} poll {}: {:?}", session.id, polls, reasons);
                }
                passes = 0;
            }

            last_market = Some(market);
            last_liquidity = Some(liquidity);

            if passes >= opts.required_consecutive_passes {
                break session.verdict(true, Vec::new(), last_market, last_liquidity, polls, passes);
            }

            tokio::time::sleep(opts.poll_interval).await;
        };

        drop(monitor);

        if verdict.safe_to_buy {
            info!("{}", verdict.summary());
        } else {
            warn!("{}", verdict.summary());
        }
        if let Some(t) = &self.telemetry {
            t.record_gate(&verdict);
        }
        Ok(verdict)
    }
}

/// Identity and clock of one gate invocation
struct GateSession {
    id: Uuid,
    pair: Address,
    token: Address,
    started: Instant,
}

impl GateSession {
    fn verdict(
        &self,
        safe_to_buy: bool,
        reasons: Vec<String>,
        market: Option<MarketCheckResult>,
        liquidity: Option<LiquidityCheck>,
        polls: u32,
        consecutive_passes: u32,
    ) -> SafetyVerdict {
        SafetyVerdict {
            session_id: self.id,
            pair: self.pair,
            token: self.token,
            safe_to_buy,
            reasons,
            market,
            liquidity,
            polls,
            consecutive_passes,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::LiquidityState;
    use chrono::Utc;

    fn clean_liquidity() -> LiquidityCheck {
        LiquidityCheck {
            pair: Address::ZERO,
            ok: true,
            safe_to_buy: true,
            state: LiquidityState::Stable,
            reason: ReasonCode::Stable,
            token_reserve: None,
            paired_reserve: None,
            price_scaled: None,
            deltas: None,
            cooldown_until: None,
            timestamp: Utc::now(),
            error: None,
        }
    }

    fn healthy_market() -> MarketCheckResult {
        MarketCheckResult {
            ok: true,
            is_healthy: true,
            reasons: vec![],
            stats: None,
        }
    }

    #[test]
    fn test_latch_is_shared_and_one_way() {
        let latch = PurchaseLatch::new();
        let clone = latch.clone();
        assert!(!latch.is_raised());
        clone.raise();
        clone.raise();
        assert!(latch.is_raised());
    }

    #[test]
    fn test_clean_iteration_has_no_reasons() {
        assert!(blocking_reasons(&healthy_market(), &clean_liquidity()).is_empty());
    }

    #[test]
    fn test_market_failure_reasons() {
        let failed = MarketCheckResult::failed("MARKET_API_ERROR");
        assert_eq!(
            blocking_reasons(&failed, &clean_liquidity()),
            vec!["MARKET_CHECK_FAILED", "MARKET_API_ERROR"]
        );

        let unhealthy = MarketCheckResult {
            ok: true,
            is_healthy: false,
            reasons: vec![],
            stats: None,
        };
        assert_eq!(
            blocking_reasons(&unhealthy, &clean_liquidity()),
            vec!["MARKET_UNHEALTHY"]
        );

        let low_buys = MarketCheckResult {
            reasons: vec!["LOW_BUY_COUNT".into()],
            ..unhealthy
        };
        assert_eq!(
            blocking_reasons(&low_buys, &clean_liquidity()),
            vec!["LOW_BUY_COUNT"]
        );
    }

    #[test]
    fn test_liquidity_reasons_follow_market_reasons() {
        let failed = MarketCheckResult::failed("HTTP_500");
        let drain = LiquidityCheck {
            safe_to_buy: false,
            state: LiquidityState::Draining,
            reason: ReasonCode::LpDrain,
            ..clean_liquidity()
        };
        assert_eq!(
            blocking_reasons(&failed, &drain),
            vec!["MARKET_CHECK_FAILED", "HTTP_500", "LP_DRAIN"]
        );

        // advisory signals do not block
        let light = LiquidityCheck {
            state: LiquidityState::LightSell,
            reason: ReasonCode::LightSellPressure,
            ..clean_liquidity()
        };
        assert!(blocking_reasons(&healthy_market(), &light).is_empty());
    }
}
