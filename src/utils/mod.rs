//! Utils Module - Helper Functions & Shared Utilities
//!
//! Constants, call decoding, the classification cache and session telemetry.

pub mod cache;
pub mod constants;
pub mod decoder;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use decoder::*;
pub use telemetry::*;
