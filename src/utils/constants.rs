//! Constants Module - Single Source of Truth
//!
//! Chain metadata, EVM opcodes, known selectors and the default decision
//! thresholds. Other modules import from here instead of inlining literals.

use alloy_primitives::Address;
use std::str::FromStr;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "LpSentry";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("LpSentry/", env!("CARGO_PKG_VERSION"));

// ============================================
// RPC CONSTANTS
// ============================================

/// Default timeout for a single RPC request (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Default number of in-flight RPC calls per process
pub const DEFAULT_RPC_MAX_CONCURRENT: usize = 8;

/// Default minimum spacing between RPC call starts (milliseconds)
pub const DEFAULT_RPC_MIN_INTERVAL_MS: u64 = 50;

/// Default TTL of cached bytecode classifications (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

// ============================================
// CHAIN IDS
// ============================================

/// Ethereum Mainnet
pub const CHAIN_ID_ETHEREUM: u64 = 1;
/// BNB Smart Chain
pub const CHAIN_ID_BSC: u64 = 56;
/// Polygon
pub const CHAIN_ID_POLYGON: u64 = 137;
/// Arbitrum One
pub const CHAIN_ID_ARBITRUM: u64 = 42161;
/// Optimism
pub const CHAIN_ID_OPTIMISM: u64 = 10;
/// Avalanche C-Chain
pub const CHAIN_ID_AVALANCHE: u64 = 43114;
/// Base
pub const CHAIN_ID_BASE: u64 = 8453;

/// All supported EVM chain IDs
pub const SUPPORTED_CHAIN_IDS: [u64; 7] = [
    CHAIN_ID_ETHEREUM,
    CHAIN_ID_BSC,
    CHAIN_ID_POLYGON,
    CHAIN_ID_ARBITRUM,
    CHAIN_ID_OPTIMISM,
    CHAIN_ID_AVALANCHE,
    CHAIN_ID_BASE,
];

// ============================================
// WRAPPED NATIVE ADDRESSES (default paired asset)
// ============================================

/// Get WETH/WBNB/... address for a chain
pub fn get_weth_address(chain_id: u64) -> Option<Address> {
    let addr_str = match chain_id {
        CHAIN_ID_ETHEREUM => "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        CHAIN_ID_BSC => "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c",
        CHAIN_ID_POLYGON => "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270",
        CHAIN_ID_ARBITRUM => "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1",
        CHAIN_ID_OPTIMISM => "0x4200000000000000000000000000000000000006",
        CHAIN_ID_AVALANCHE => "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7",
        CHAIN_ID_BASE => "0x4200000000000000000000000000000000000006",
        _ => return None,
    };
    Address::from_str(addr_str).ok()
}

// ============================================
// PUBLIC RPC FALLBACKS
// ============================================

/// Get public RPC fallback URL for a chain
pub fn get_public_rpc_fallback(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("https://eth.llamarpc.com"),
        CHAIN_ID_BSC => Some("https://bsc-dataseed.binance.org"),
        CHAIN_ID_POLYGON => Some("https://polygon-rpc.com"),
        CHAIN_ID_ARBITRUM => Some("https://arb1.arbitrum.io/rpc"),
        CHAIN_ID_OPTIMISM => Some("https://mainnet.optimism.io"),
        CHAIN_ID_AVALANCHE => Some("https://api.avax.network/ext/bc/C/rpc"),
        CHAIN_ID_BASE => Some("https://mainnet.base.org"),
        _ => None,
    }
}

// ============================================
// CHAIN METADATA
// ============================================

/// Get chain name
pub fn get_chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "Ethereum",
        CHAIN_ID_BSC => "BNB Smart Chain",
        CHAIN_ID_POLYGON => "Polygon",
        CHAIN_ID_ARBITRUM => "Arbitrum One",
        CHAIN_ID_OPTIMISM => "Optimism",
        CHAIN_ID_AVALANCHE => "Avalanche C-Chain",
        CHAIN_ID_BASE => "Base",
        _ => "Unknown",
    }
}

/// Check if chain ID is supported
#[inline]
pub fn is_chain_supported(chain_id: u64) -> bool {
    SUPPORTED_CHAIN_IDS.contains(&chain_id)
}

/// Convert numeric chain ID to DexScreener chain name
pub fn chain_id_to_dexscreener_name(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "ethereum",
        CHAIN_ID_BSC => "bsc",
        CHAIN_ID_POLYGON => "polygon",
        CHAIN_ID_ARBITRUM => "arbitrum",
        CHAIN_ID_OPTIMISM => "optimism",
        CHAIN_ID_AVALANCHE => "avalanche",
        CHAIN_ID_BASE => "base",
        _ => "ethereum",
    }
}

// ============================================
// EVM OPCODES
// ============================================

pub const OP_PUSH1: u8 = 0x60;
pub const OP_PUSH32: u8 = 0x7f;
pub const OP_CREATE: u8 = 0xf0;
pub const OP_DELEGATECALL: u8 = 0xf4;
pub const OP_CREATE2: u8 = 0xf5;
pub const OP_SELFDESTRUCT: u8 = 0xff;

/// CBOR map header range that opens a solc metadata trailer
pub const CBOR_MAP_MIN: u8 = 0xa0;
pub const CBOR_MAP_MAX: u8 = 0xbf;

/// Standard solc trailer: a2 64 'ipfs' 58 22 <34> 64 'solc' 43 <3> + 2-byte length
pub const METADATA_FALLBACK_TAIL: usize = 53;

/// Fallback stripping never shrinks code below this many bytes
pub const MIN_NORMALIZED_PREFIX: usize = 32;

// ============================================
// HIGH-RISK FUNCTION SELECTORS
// ============================================

/// Selector hex (no 0x) and name, searched as raw substrings of the bytecode hex
pub const RISKY_SELECTORS: [(&str, &str); 6] = [
    // mint(address,uint256)
    ("40c10f19", "mint"),
    // mint(uint256)
    ("a0712d68", "mintAmount"),
    // setBots(address[],bool)
    ("974d396d", "setBots"),
    // blacklistAddress(address)
    ("e4997dc5", "blacklistAddress"),
    // setTradingEnabled(bool)
    ("8a8c523c", "setTradingEnabled"),
    // setMaxTxAmount(uint256)
    ("ec28438a", "setMaxTxAmount"),
];

// ============================================
// DECISION DEFAULTS
// ============================================

/// Similarity at or above which a fingerprint is a confirmed rug
pub const DEFAULT_CONFIRM_SIMILARITY: f64 = 0.88;
/// Similarity at or above which a fingerprint is suspicious
pub const DEFAULT_SUSPICION_SIMILARITY: f64 = 0.72;

/// Both reserves down by at least this much = LP drain (bps)
pub const DEFAULT_DRAIN_BPS: u64 = 250;
/// Price move at or below -this = heavy sell pressure (bps)
pub const DEFAULT_HEAVY_SELL_BPS: u64 = 500;
/// Price move at or below -this = light sell pressure (bps)
pub const DEFAULT_LIGHT_SELL_BPS: u64 = 200;
/// Cooldown after a confirmed drain (minutes)
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 5;

/// Gate poll interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
/// Gate hard timeout (minutes)
pub const DEFAULT_MAX_WAIT_MINUTES: u64 = 5;
/// Consecutive clean polls required to clear the gate
pub const DEFAULT_REQUIRED_PASSES: u32 = 3;

/// Basis-point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_support() {
        assert!(is_chain_supported(1));
        assert!(is_chain_supported(56));
        assert!(!is_chain_supported(999));
    }

    #[test]
    fn test_weth_addresses() {
        assert!(get_weth_address(1).is_some());
        assert_eq!(get_weth_address(10), get_weth_address(8453));
        assert!(get_weth_address(999).is_none());
    }

    #[test]
    fn test_default_threshold_ordering() {
        assert!(DEFAULT_SUSPICION_SIMILARITY < DEFAULT_CONFIRM_SIMILARITY);
        assert!(DEFAULT_LIGHT_SELL_BPS <= DEFAULT_HEAVY_SELL_BPS);
        assert_eq!(OP_PUSH32 - OP_PUSH1 + 1, 32);
    }
}
