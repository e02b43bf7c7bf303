//! Pool call decoder module
//! Encodes the Uniswap-V2 pair view calls and decodes their return data

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};

// Uniswap V2 pair view functions. Reserves are uint112 on-chain; they are
// ABI-encoded as full words, so decoding them as uint256 is lossless.
sol! {
    function token0() external view returns (address);

    function token1() external view returns (address);

    function getReserves() external view returns (
        uint256 reserve0,
        uint256 reserve1,
        uint32 blockTimestampLast
    );
}

/// Encoder/decoder for pair calls
pub struct PairDecoder;

impl PairDecoder {
    pub fn token0_calldata() -> Bytes {
        token0Call {}.abi_encode().into()
    }

    pub fn token1_calldata() -> Bytes {
        token1Call {}.abi_encode().into()
    }

    pub fn get_reserves_calldata() -> Bytes {
        getReservesCall {}.abi_encode().into()
    }

    pub fn decode_token0(data: &[u8]) -> Result<Address> {
        let ret = token0Call::abi_decode_returns(data, true)
            .map_err(|e| eyre!("Failed to decode token0(): {}", e))?;
        Ok(ret._0)
    }

    pub fn decode_token1(data: &[u8]) -> Result<Address> {
        let ret = token1Call::abi_decode_returns(data, true)
            .map_err(|e| eyre!("Failed to decode token1(): {}", e))?;
        Ok(ret._0)
    }

    /// Returns (reserve0, reserve1)
    pub fn decode_reserves(data: &[u8]) -> Result<(U256, U256)> {
        let ret = getReservesCall::abi_decode_returns(data, true)
            .map_err(|e| eyre!("Failed to decode getReserves(): {}", e))?;
        Ok((ret.reserve0, ret.reserve1))
    }
}

/// Parse a 0x-prefixed hex string from an RPC result
pub fn parse_hex_bytes(raw: &str) -> Result<Bytes> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| eyre!("Invalid hex in RPC result: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    #[test]
    fn test_calldata_selectors() {
        assert_eq!(PairDecoder::token0_calldata().as_ref(), &[0x0d, 0xfe, 0x16, 0x81]);
        assert_eq!(PairDecoder::token1_calldata().as_ref(), &[0xd2, 0x12, 0x20, 0xa7]);
        assert_eq!(PairDecoder::get_reserves_calldata().as_ref(), &[0x09, 0x02, 0xf1, 0xac]);
    }

    #[test]
    fn test_decode_reserves() {
        let mut data = Vec::new();
        data.extend_from_slice(&word(1_000));
        data.extend_from_slice(&word(25));
        data.extend_from_slice(&word(1_700_000_000));
        let (r0, r1) = PairDecoder::decode_reserves(&data).unwrap();
        assert_eq!(r0, U256::from(1_000u64));
        assert_eq!(r1, U256::from(25u64));
    }

    #[test]
    fn test_decode_token_address() {
        let addr = Address::repeat_byte(0x42);
        let mut data = [0u8; 32];
        data[12..].copy_from_slice(addr.as_slice());
        assert_eq!(PairDecoder::decode_token0(&data).unwrap(), addr);
        assert_eq!(PairDecoder::decode_token1(&data).unwrap(), addr);
    }

    #[test]
    fn test_decode_short_data_fails() {
        assert!(PairDecoder::decode_reserves(&[0u8; 31]).is_err());
        assert!(PairDecoder::decode_token0(&[]).is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("0x").unwrap().len(), 0);
        assert_eq!(parse_hex_bytes("0x6080").unwrap().as_ref(), &[0x60, 0x80]);
        assert!(parse_hex_bytes("0xzz").is_err());
    }
}
