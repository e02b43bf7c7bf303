//! Scriptable provider doubles
//!
//! Hand-written `ChainReader` / `MarketBehaviorCheck` implementations that
//! record their calls and replay scripted responses. Scripts are consumed in
//! order; once exhausted the last entry repeats.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::config::StatsWindow;
use crate::models::types::{MarketCheckResult, MarketStats};
use crate::providers::ports::{ChainReader, MarketBehaviorCheck};

/// Lock a mock mutex, recovering from poisoning caused by a panicking test
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A response script that repeats its final entry
#[derive(Debug)]
struct Script<T: Clone> {
    queue: VecDeque<T>,
    last: Option<T>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&mut self, item: T) {
        self.queue.push_back(item);
    }

    fn next(&mut self) -> Option<T> {
        if let Some(item) = self.queue.pop_front() {
            self.last = Some(item.clone());
            return Some(item);
        }
        self.last.clone()
    }
}

/// Scripted reserve reading: Ok((token0 reserve, token1 reserve)) or an RPC error message
pub type ReserveStep = std::result::Result<(U256, U256), String>;

#[derive(Debug, Default)]
struct ChainState {
    code: HashMap<Address, std::result::Result<Bytes, String>>,
    tokens: HashMap<Address, (Address, Address)>,
    reserves: HashMap<Address, Script<ReserveStep>>,
    code_calls: Vec<Address>,
    token_calls: Vec<Address>,
    reserve_calls: Vec<Address>,
}

/// Mock chain reader
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deployed code for an address
    pub fn with_code(self, address: Address, code: impl Into<Bytes>) -> Self {
        lock(&self.state).code.insert(address, Ok(code.into()));
        self
    }

    /// `eth_getCode` fails for an address
    pub fn with_code_error(self, address: Address, message: &str) -> Self {
        lock(&self.state)
            .code
            .insert(address, Err(message.to_string()));
        self
    }

    /// Pool token ordering
    pub fn with_pair(self, pair: Address, token0: Address, token1: Address) -> Self {
        lock(&self.state).tokens.insert(pair, (token0, token1));
        self
    }

    /// Append reserve readings for a pair
    pub fn with_reserves(self, pair: Address, steps: impl IntoIterator<Item = ReserveStep>) -> Self {
        self.push_reserves(pair, steps);
        self
    }

    /// Append reserve readings on a shared mock
    pub fn push_reserves(&self, pair: Address, steps: impl IntoIterator<Item = ReserveStep>) {
        let mut state = lock(&self.state);
        let script = state.reserves.entry(pair).or_default();
        for step in steps {
            script.push(step);
        }
    }

    pub fn code_calls(&self) -> usize {
        lock(&self.state).code_calls.len()
    }

    pub fn token_calls(&self) -> usize {
        lock(&self.state).token_calls.len()
    }

    pub fn reserve_calls(&self) -> usize {
        lock(&self.state).reserve_calls.len()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_code(&self, address: Address) -> Result<Bytes> {
        let mut state = lock(&self.state);
        state.code_calls.push(address);
        match state.code.get(&address) {
            Some(Ok(code)) => Ok(code.clone()),
            Some(Err(msg)) => Err(eyre!("{}", msg)),
            None => Ok(Bytes::new()),
        }
    }

    async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address)> {
        let mut state = lock(&self.state);
        state.token_calls.push(pair);
        state
            .tokens
            .get(&pair)
            .copied()
            .ok_or_else(|| eyre!("execution reverted: not a pair {}", pair))
    }

    async fn get_reserves(&self, pair: Address) -> Result<(U256, U256)> {
        let mut state = lock(&self.state);
        state.reserve_calls.push(pair);
        match state.reserves.get_mut(&pair).and_then(|s| s.next()) {
            Some(Ok(reserves)) => Ok(reserves),
            Some(Err(msg)) => Err(eyre!("{}", msg)),
            None => Err(eyre!("no reserves scripted for {}", pair)),
        }
    }
}

/// Mock market-behavior check; healthy unless scripted otherwise
#[derive(Debug, Clone, Default)]
pub struct MockMarket {
    script: Arc<Mutex<Script<MarketCheckResult>>>,
    calls: Arc<Mutex<Vec<(Address, Address)>>>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// A healthy result with plausible statistics
    pub fn healthy_result() -> MarketCheckResult {
        MarketCheckResult::healthy(MarketStats {
            window: StatsWindow::M5,
            buys: 25,
            sells: 10,
            volume_usd: 12_000.0,
            liquidity_usd: Some(80_000.0),
        })
    }

    pub fn with_results(self, results: impl IntoIterator<Item = MarketCheckResult>) -> Self {
        {
            let mut script = lock(&self.script);
            for r in results {
                script.push(r);
            }
        }
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl MarketBehaviorCheck for MockMarket {
    async fn check(&self, pair: Address, token: Address) -> MarketCheckResult {
        lock(&self.calls).push((pair, token));
        lock(&self.script)
            .next()
            .unwrap_or_else(Self::healthy_result)
    }
}
