//! Providers Module - External Data Sources
//!
//! JSON-RPC chain reader, DexScreener statistics, the shared RPC queue and
//! scriptable doubles for tests.

pub mod dexscreener;
pub mod mocks;
pub mod ports;
pub mod queue;
pub mod rpc;

pub use dexscreener::DexScreenerMarketCheck;
pub use ports::*;
pub use queue::RpcQueue;
pub use rpc::RpcProvider;
