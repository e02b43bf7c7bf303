//! Liquidity-Pressure Monitor
//!
//! Tracks one pool's reserves tick by tick and classifies each movement:
//!
//! | token Δ | paired Δ | price Δ          | result                    |
//! |---------|----------|------------------|---------------------------|
//! | ≤ -drain| ≤ -drain | any              | LP_DRAIN (+ cooldown)     |
//! | > 0     | < 0      | ≤ -heavy         | HEAVY_SELL_PRESSURE       |
//! | > 0     | < 0      | ≤ -light         | LIGHT_SELL_PRESSURE       |
//! | > 0     | < 0      | otherwise        | SELL_FLOW_NO_PRICE_BREAK  |
//! | < 0     | > 0      | any              | BUY_PRESSURE              |
//! | otherwise                              || STABLE                   |
//!
//! RPC failures fail closed and leave the delta baseline untouched.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::config::MonitorThresholds;
use crate::models::errors::AppResult;
use crate::models::types::{
    LiquidityCheck, LiquidityState, ReasonCode, ReserveDeltas, ReserveSnapshot,
};
use crate::providers::ports::ChainReader;
use crate::utils::constants::BPS_DENOMINATOR;
use crate::utils::telemetry::SentryTelemetry;

/// Signal channel depth; slow subscribers skip the oldest signals
const SIGNAL_CAPACITY: usize = 64;

/// Per-pool state, mutated only by ticks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorState {
    /// Last snapshot with non-zero reserves
    pub prev: Option<ReserveSnapshot>,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Paired asset is token0 of the pool; resolved once
    pub paired_is_token0: Option<bool>,
}

/// Signed change from `prev` to `cur` in basis points, saturating at the i64 range
pub fn bps_change(prev: U256, cur: U256) -> i64 {
    if prev.is_zero() {
        return 0;
    }
    let denom = U256::from(BPS_DENOMINATOR);
    let to_i64 = |v: U256| {
        u64::try_from(v)
            .ok()
            .and_then(|v| i64::try_from(v).ok())
            .unwrap_or(i64::MAX)
    };
    if cur >= prev {
        to_i64((cur - prev).saturating_mul(denom) / prev)
    } else {
        -to_i64((prev - cur).saturating_mul(denom) / prev)
    }
}

fn deltas_between(prev: &ReserveSnapshot, cur: &ReserveSnapshot) -> ReserveDeltas {
    ReserveDeltas {
        token_bps: bps_change(prev.token_reserve, cur.token_reserve),
        paired_bps: bps_change(prev.paired_reserve, cur.paired_reserve),
        price_bps: bps_change(prev.price_scaled, cur.price_scaled),
    }
}

/// Classify reserve deltas: (state, reason, safe)
pub fn classify_deltas(
    d: &ReserveDeltas,
    t: &MonitorThresholds,
) -> (LiquidityState, ReasonCode, bool) {
    let drain = t.drain_bps as i64;
    let heavy = t.heavy_sell_bps as i64;
    let light = t.light_sell_bps as i64;

    if d.token_bps <= -drain && d.paired_bps <= -drain {
        return (LiquidityState::Draining, ReasonCode::LpDrain, false);
    }

    if d.token_bps > 0 && d.paired_bps < 0 {
        return if d.price_bps <= -heavy {
            (
                LiquidityState::HeavySell,
                ReasonCode::HeavySellPressure,
                !t.heavy_sell_blocks,
            )
        } else if d.price_bps <= -light {
            (LiquidityState::LightSell, ReasonCode::LightSellPressure, true)
        } else {
            (LiquidityState::Stable, ReasonCode::SellFlowNoPriceBreak, true)
        };
    }

    if d.token_bps < 0 && d.paired_bps > 0 {
        return (LiquidityState::BuyPressure, ReasonCode::BuyPressure, true);
    }

    (LiquidityState::Stable, ReasonCode::Stable, true)
}

struct MonitorInner {
    chain: Arc<dyn ChainReader>,
    pair: Address,
    paired_asset: Address,
    thresholds: MonitorThresholds,
    state: Mutex<MonitorState>,
    signals: broadcast::Sender<LiquidityCheck>,
    telemetry: Option<Arc<SentryTelemetry>>,
}

impl MonitorInner {
    async fn tick(&self, now: DateTime<Utc>) -> LiquidityCheck {
        let check = {
            let mut state = self.state.lock().await;
            self.evaluate(&mut state, now).await
        };

        debug!("💧 {} {}", self.pair, check.summary());
        if let Some(t) = &self.telemetry {
            t.record_liquidity(&check);
        }
        // no subscribers is fine
        let _ = self.signals.send(check.clone());
        check
    }

    async fn resolve_side(&self, state: &mut MonitorState, now: DateTime<Utc>) -> Result<bool, LiquidityCheck> {
        if let Some(side) = state.paired_is_token0 {
            return Ok(side);
        }

        let (token0, token1) = self.chain.pair_tokens(self.pair).await.map_err(|e| {
            warn!("⚠️ pair_tokens failed for {}: {}", self.pair, e);
            LiquidityCheck::failure(self.pair, ReasonCode::RpcError, e.to_string(), now)
        })?;

        let side = if token0 == self.paired_asset {
            true
        } else if token1 == self.paired_asset {
            false
        } else {
            warn!(
                "🚫 Pair {} ({}, {}) does not contain paired asset {}",
                self.pair, token0, token1, self.paired_asset
            );
            return Err(LiquidityCheck::failure(
                self.pair,
                ReasonCode::PairMismatch,
                format!("pool tokens {} / {} exclude {}", token0, token1, self.paired_asset),
                now,
            ));
        };
        state.paired_is_token0 = Some(side);
        Ok(side)
    }

    async fn evaluate(&self, state: &mut MonitorState, now: DateTime<Utc>) -> LiquidityCheck {
        let paired_is_token0 = match self.resolve_side(state, now).await {
            Ok(side) => side,
            Err(check) => return check,
        };

        let (r0, r1) = match self.chain.get_reserves(self.pair).await {
            Ok(r) => r,
            Err(e) => {
                warn!("⚠️ getReserves failed for {}: {}", self.pair, e);
                return LiquidityCheck::failure(self.pair, ReasonCode::RpcError, e.to_string(), now);
            }
        };
        let (token_reserve, paired_reserve) = if paired_is_token0 { (r1, r0) } else { (r0, r1) };

        let in_cooldown = state.cooldown_until.map_or(false, |until| now < until);

        // an empty pool never replaces the baseline
        let Some(snap) = ReserveSnapshot::try_new(token_reserve, paired_reserve, now) else {
            let (liq_state, reason) = if in_cooldown {
                (LiquidityState::Cooldown, ReasonCode::Cooldown)
            } else {
                (LiquidityState::Unavailable, ReasonCode::NoLiquidity)
            };
            return LiquidityCheck {
                pair: self.pair,
                ok: true,
                safe_to_buy: false,
                state: liq_state,
                reason,
                token_reserve: Some(token_reserve),
                paired_reserve: Some(paired_reserve),
                price_scaled: None,
                deltas: None,
                cooldown_until: state.cooldown_until,
                timestamp: now,
                error: None,
            };
        };

        let deltas = state.prev.as_ref().map(|prev| deltas_between(prev, &snap));

        let (liq_state, reason, safe) = match deltas {
            None => (LiquidityState::NoData, ReasonCode::NoData, true),
            Some(_) if in_cooldown => {
                (LiquidityState::Cooldown, ReasonCode::Cooldown, false)
            }
            Some(d) => {
                state.cooldown_until = None;
                let classified = classify_deltas(&d, &self.thresholds);
                if classified.1 == ReasonCode::LpDrain {
                    let until = now + self.thresholds.cooldown();
                    state.cooldown_until = Some(until);
                    warn!(
                        "💀 LP drain on {}: token {}bps, paired {}bps; cooling down until {}",
                        self.pair, d.token_bps, d.paired_bps, until
                    );
                }
                classified
            }
        };

        let check = LiquidityCheck {
            pair: self.pair,
            ok: true,
            safe_to_buy: safe,
            state: liq_state,
            reason,
            token_reserve: Some(snap.token_reserve),
            paired_reserve: Some(snap.paired_reserve),
            price_scaled: Some(snap.price_scaled),
            deltas,
            cooldown_until: state.cooldown_until,
            timestamp: now,
            error: None,
        };
        state.prev = Some(snap);
        check
    }
}

/// Reserve monitor for a single pool
pub struct LiquidityMonitor {
    inner: Arc<MonitorInner>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl LiquidityMonitor {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        pair: Address,
        paired_asset: Address,
        thresholds: MonitorThresholds,
    ) -> AppResult<Self> {
        Self::with_telemetry(chain, pair, paired_asset, thresholds, None)
    }

    pub fn with_telemetry(
        chain: Arc<dyn ChainReader>,
        pair: Address,
        paired_asset: Address,
        thresholds: MonitorThresholds,
        telemetry: Option<Arc<SentryTelemetry>>,
    ) -> AppResult<Self> {
        thresholds.validate()?;
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Ok(Self {
            inner: Arc::new(MonitorInner {
                chain,
                pair,
                paired_asset,
                thresholds,
                state: Mutex::new(MonitorState::default()),
                signals,
                telemetry,
            }),
            task: StdMutex::new(None),
        })
    }

    pub fn pair(&self) -> Address {
        self.inner.pair
    }

    pub fn thresholds(&self) -> &MonitorThresholds {
        &self.inner.thresholds
    }

    /// One tick at the current time
    pub async fn check(&self) -> LiquidityCheck {
        self.inner.tick(Utc::now()).await
    }

    /// One tick at an explicit time
    pub async fn check_at(&self, now: DateTime<Utc>) -> LiquidityCheck {
        self.inner.tick(now).await
    }

    /// Receiver for every subsequent tick result
    pub fn subscribe(&self) -> broadcast::Receiver<LiquidityCheck> {
        self.inner.signals.subscribe()
    }

    pub async fn state(&self) -> MonitorState {
        self.inner.state.lock().await.clone()
    }

    fn task_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tick every `interval` on a background task. Returns false if already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut slot = self.task_slot();
        if slot.as_ref().map_or(false, |h| !h.is_finished()) {
            return false;
        }

        let inner = self.inner.clone();
        let period = interval.max(Duration::from_millis(1));
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.tick(Utc::now()).await;
            }
        }));
        info!("👁️ Monitoring {} every {}ms", self.inner.pair, period.as_millis());
        true
    }

    /// Abort the background loop; no-op when not running
    pub fn stop(&self) {
        if let Some(handle) = self.task_slot().take() {
            handle.abort();
            debug!("🛑 Monitor stopped for {}", self.inner.pair);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_slot().as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for LiquidityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mocks::MockChain;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_bps_change() {
        assert_eq!(bps_change(U256::from(1000), U256::from(1000)), 0);
        assert_eq!(bps_change(U256::from(1000), U256::from(975)), -250);
        assert_eq!(bps_change(U256::from(1000), U256::from(1100)), 1000);
        assert_eq!(bps_change(U256::ZERO, U256::from(5)), 0);
        assert_eq!(bps_change(U256::from(1), U256::MAX), i64::MAX);
    }

    #[test]
    fn test_classify_deltas_table() {
        let t = MonitorThresholds::default();
        let d = |token_bps, paired_bps, price_bps| ReserveDeltas {
            token_bps,
            paired_bps,
            price_bps,
        };

        assert_eq!(classify_deltas(&d(-300, -300, 0), &t).1, ReasonCode::LpDrain);
        assert_eq!(classify_deltas(&d(-249, -300, 0), &t).1, ReasonCode::Stable);
        assert_eq!(classify_deltas(&d(300, -300, -600), &t).1, ReasonCode::HeavySellPressure);
        assert!(classify_deltas(&d(300, -300, -600), &t).2);
        assert_eq!(classify_deltas(&d(300, -300, -250), &t).1, ReasonCode::LightSellPressure);
        assert_eq!(classify_deltas(&d(10, -10, -20), &t).1, ReasonCode::SellFlowNoPriceBreak);
        assert_eq!(classify_deltas(&d(-100, 100, 200), &t).1, ReasonCode::BuyPressure);
        assert_eq!(classify_deltas(&d(0, 0, 0), &t).1, ReasonCode::Stable);

        let blocking = MonitorThresholds {
            heavy_sell_blocks: true,
            ..t
        };
        assert!(!classify_deltas(&d(300, -300, -600), &blocking).2);
    }

    fn monitor(chain: &MockChain, pair: Address, weth: Address) -> LiquidityMonitor {
        LiquidityMonitor::new(Arc::new(chain.clone()), pair, weth, MonitorThresholds::default()).unwrap()
    }

    #[tokio::test]
    async fn test_orientation_with_paired_as_token0() {
        let (pair, weth, token) = (addr(1), addr(2), addr(3));
        // token0 = WETH, so reserve0 is the paired side
        let chain = MockChain::new()
            .with_pair(pair, weth, token)
            .with_reserves(pair, vec![Ok((U256::from(10), U256::from(1000)))]);
        let m = monitor(&chain, pair, weth);

        let c = m.check().await;
        assert_eq!(c.reason, ReasonCode::NoData);
        assert_eq!(c.token_reserve, Some(U256::from(1000)));
        assert_eq!(c.paired_reserve, Some(U256::from(10)));
    }

    #[tokio::test]
    async fn test_pair_side_resolved_once() {
        let (pair, weth, token) = (addr(1), addr(2), addr(3));
        let chain = MockChain::new()
            .with_pair(pair, token, weth)
            .with_reserves(pair, vec![Ok((U256::from(1000), U256::from(10)))]);
        let m = monitor(&chain, pair, weth);
        m.check().await;
        m.check().await;
        m.check().await;
        assert_eq!(chain.token_calls(), 1);
        assert_eq!(chain.reserve_calls(), 3);
    }

    #[tokio::test]
    async fn test_pair_mismatch_is_structural() {
        let (pair, weth) = (addr(1), addr(2));
        let chain = MockChain::new().with_pair(pair, addr(3), addr(4));
        let m = monitor(&chain, pair, weth);

        let c = m.check().await;
        assert!(!c.ok);
        assert!(!c.safe_to_buy);
        assert_eq!(c.reason, ReasonCode::PairMismatch);
        assert_eq!(chain.reserve_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_reserves_is_no_liquidity() {
        let (pair, weth, token) = (addr(1), addr(2), addr(3));
        let chain = MockChain::new().with_pair(pair, token, weth).with_reserves(
            pair,
            vec![
                Ok((U256::from(1000), U256::from(10))),
                Ok((U256::ZERO, U256::from(10))),
                Ok((U256::from(1000), U256::from(10))),
            ],
        );
        let m = monitor(&chain, pair, weth);

        assert_eq!(m.check().await.reason, ReasonCode::NoData);
        let empty = m.check().await;
        assert!(empty.ok);
        assert!(!empty.safe_to_buy);
        assert_eq!(empty.reason, ReasonCode::NoLiquidity);
        // baseline survived the empty read
        assert_eq!(m.check().await.reason, ReasonCode::Stable);
    }

    #[tokio::test]
    async fn test_cooldown_outranks_empty_pool() {
        let (pair, weth, token) = (addr(1), addr(2), addr(3));
        let chain = MockChain::new().with_pair(pair, token, weth).with_reserves(
            pair,
            vec![
                Ok((U256::from(1000), U256::from(10))),
                Ok((U256::from(700), U256::from(7))),
                Ok((U256::ZERO, U256::from(7))),
                Ok((U256::from(700), U256::from(7))),
            ],
        );
        let m = monitor(&chain, pair, weth);
        let t0 = Utc::now();

        assert_eq!(m.check_at(t0).await.reason, ReasonCode::NoData);
        let drain = m.check_at(t0 + chrono::Duration::seconds(1)).await;
        assert_eq!(drain.reason, ReasonCode::LpDrain);

        let empty = m.check_at(t0 + chrono::Duration::seconds(2)).await;
        assert_eq!(empty.reason, ReasonCode::Cooldown);
        assert_eq!(empty.state, LiquidityState::Cooldown);
        assert!(!empty.safe_to_buy);
        assert_eq!(empty.cooldown_until, drain.cooldown_until);
        // baseline is still the post-drain snapshot
        assert_eq!(m.state().await.prev.unwrap().token_reserve, U256::from(700));

        let after = m
            .check_at(drain.cooldown_until.unwrap() + chrono::Duration::seconds(1))
            .await;
        assert_eq!(after.reason, ReasonCode::Stable);
    }

    #[tokio::test]
    async fn test_subscribers_receive_signals() {
        let (pair, weth, token) = (addr(1), addr(2), addr(3));
        let chain = MockChain::new()
            .with_pair(pair, token, weth)
            .with_reserves(pair, vec![Ok((U256::from(1000), U256::from(10)))]);
        let m = monitor(&chain, pair, weth);
        let mut rx = m.subscribe();

        m.check().await;
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.reason, ReasonCode::NoData);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent() {
        let (pair, weth, token) = (addr(1), addr(2), addr(3));
        let chain = MockChain::new()
            .with_pair(pair, token, weth)
            .with_reserves(pair, vec![Ok((U256::from(1000), U256::from(10)))]);
        let m = monitor(&chain, pair, weth);

        assert!(m.start(Duration::from_secs(1)));
        assert!(!m.start(Duration::from_secs(1)));
        assert!(m.is_running());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(chain.reserve_calls() >= 2);

        m.stop();
        m.stop();
        assert!(!m.is_running());
        let calls = chain.reserve_calls();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(chain.reserve_calls(), calls);
    }
}
