//! Provider ports
//!
//! The core talks to the chain and to market statistics only through these
//! traits, so tests swap in the mocks from `providers::mocks`.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::Result;

use crate::models::types::MarketCheckResult;

/// Read-only chain access
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Deployed runtime bytecode; empty for an EOA or undeployed address
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// (token0, token1) of a V2-style pair
    async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address)>;

    /// (reserve0, reserve1) of a V2-style pair
    async fn get_reserves(&self, pair: Address) -> Result<(U256, U256)>;
}

/// Trade-flow health of a pair
///
/// Never fails: unreachable statistics come back as `ok == false`.
#[async_trait]
pub trait MarketBehaviorCheck: Send + Sync {
    async fn check(&self, pair: Address, token: Address) -> MarketCheckResult;
}
