//! Core Module - Detection & Gating Logic
//!
//! Bytecode fingerprinting, the rug database, the detector, the liquidity
//! monitor and the buy-safety gate. Chain and market access comes in through
//! the traits in `providers::ports`.

pub mod bytecode;
pub mod buy_gate;
pub mod liquidity_monitor;
pub mod rug_database;
pub mod rug_detector;

pub use buy_gate::*;
pub use liquidity_monitor::*;
pub use rug_database::*;
pub use rug_detector::*;
