//! Bytecode normalization and structural fingerprinting
//!
//! Pipeline:
//! 1. Strip the solc CBOR metadata trailer (it changes with every compile)
//! 2. Walk the instruction stream once, skipping PUSH immediates
//! 3. Count opcodes, flag self-modifying opcodes, flag risky selectors
//!
//! Similarity between two contracts is the cosine of their opcode histograms,
//! so embedded constants and addresses do not affect the score.

use alloy_primitives::keccak256;
use std::collections::BTreeMap;

use crate::models::types::{BytecodeFingerprint, RiskyOpcodes};
use crate::utils::constants::{
    CBOR_MAP_MAX, CBOR_MAP_MIN, METADATA_FALLBACK_TAIL, MIN_NORMALIZED_PREFIX, OP_CREATE,
    OP_CREATE2, OP_DELEGATECALL, OP_PUSH1, OP_PUSH32, OP_SELFDESTRUCT, RISKY_SELECTORS,
};

/// Remove the compiler metadata trailer from runtime bytecode
///
/// The last two bytes are read as the big-endian length of a CBOR map that
/// precedes them. The cut is accepted only when the byte at the computed start
/// is a CBOR map header; otherwise a fixed-size tail is dropped, never going
/// below `MIN_NORMALIZED_PREFIX` bytes.
pub fn normalize(code: &[u8]) -> &[u8] {
    let len = code.len();
    if len > 2 {
        let meta_len = u16::from_be_bytes([code[len - 2], code[len - 1]]) as usize;
        if let Some(start) = len.checked_sub(2 + meta_len) {
            if start > 0 && (CBOR_MAP_MIN..=CBOR_MAP_MAX).contains(&code[start]) {
                return &code[..start];
            }
        }
    }

    if len <= MIN_NORMALIZED_PREFIX {
        return code;
    }
    let keep = len
        .saturating_sub(METADATA_FALLBACK_TAIL)
        .max(MIN_NORMALIZED_PREFIX);
    &code[..keep]
}

/// keccak256 of normalized bytecode as 0x-prefixed lowercase hex
pub fn content_hash(normalized: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(normalized)))
}

/// Number of immediate bytes following `op`
#[inline]
fn push_width(op: u8) -> usize {
    if (OP_PUSH1..=OP_PUSH32).contains(&op) {
        (op - OP_PUSH1 + 1) as usize
    } else {
        0
    }
}

/// Build the structural fingerprint of normalized bytecode
pub fn fingerprint(normalized: &[u8]) -> BytecodeFingerprint {
    let mut op_hist: BTreeMap<u8, u32> = BTreeMap::new();
    let mut risky = RiskyOpcodes::default();

    let mut pc = 0usize;
    while pc < normalized.len() {
        let op = normalized[pc];
        *op_hist.entry(op).or_insert(0) += 1;

        match op {
            OP_DELEGATECALL => risky.delegatecall = true,
            OP_CREATE2 => risky.create2 = true,
            OP_SELFDESTRUCT => risky.selfdestruct = true,
            OP_CREATE => risky.create = true,
            _ => {}
        }

        pc += 1 + push_width(op);
    }

    let code_hex = hex::encode(normalized);
    let selectors = RISKY_SELECTORS
        .iter()
        .map(|(selector, name)| (name.to_string(), code_hex.contains(selector)))
        .collect();

    BytecodeFingerprint {
        op_hist,
        risky,
        selectors,
    }
}

/// Cosine similarity of two opcode histograms as sparse vectors
///
/// Returns 0.0 when either side is all-zero.
pub fn cosine_similarity(a: &BTreeMap<u8, u32>, b: &BTreeMap<u8, u32>) -> f64 {
    let norm = |h: &BTreeMap<u8, u32>| -> f64 {
        h.values().map(|&v| (v as f64) * (v as f64)).sum::<f64>().sqrt()
    };
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // keys missing on one side contribute zero to the dot product
    let dot: f64 = a
        .iter()
        .filter_map(|(op, &va)| b.get(op).map(|&vb| va as f64 * vb as f64))
        .sum();

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Dedup key of a fingerprint: keccak256 of its canonical JSON
pub fn fingerprint_hash(fp: &BytecodeFingerprint) -> String {
    // BTreeMap fields serialize in key order, so the encoding is canonical
    let encoded = serde_json::to_vec(fp).unwrap_or_default();
    format!("0x{}", hex::encode(keccak256(encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 32-byte metadata trailer: a1 65 'bzzr0' 58 20 <32 bytes> 00 29
    fn with_metadata(body: &[u8]) -> Vec<u8> {
        let mut meta = vec![0xa1, 0x65, b'b', b'z', b'z', b'r', b'0', 0x58, 0x20];
        meta.extend_from_slice(&[0xab; 32]);
        let len = meta.len() as u16;
        let mut code = body.to_vec();
        code.extend_from_slice(&meta);
        code.extend_from_slice(&len.to_be_bytes());
        code
    }

    #[test]
    fn test_normalize_strips_cbor_trailer() {
        let body = hex::decode("6080604052348015600f57600080fd5b50").unwrap();
        let code = with_metadata(&body);
        assert_eq!(normalize(&code), body.as_slice());
    }

    #[test]
    fn test_normalize_differs_only_in_metadata() {
        let body = hex::decode("6080604052600436106100").unwrap();
        let mut a = with_metadata(&body);
        let b = with_metadata(&body);
        // flip a byte inside the metadata hash
        let idx = body.len() + 12;
        a[idx] ^= 0xff;
        assert_eq!(content_hash(normalize(&a)), content_hash(normalize(&b)));
    }

    #[test]
    fn test_normalize_fallback_keeps_minimum_prefix() {
        // trailing 0xffff length is impossible for this input
        let mut code = vec![0x5b; 40];
        code.extend_from_slice(&[0xff, 0xff]);
        let out = normalize(&code);
        assert_eq!(out.len(), MIN_NORMALIZED_PREFIX);

        let long = vec![0x5b; 200];
        // last two bytes 0x5b5b = 23387 > len, so fallback strips the fixed tail
        assert_eq!(normalize(&long).len(), 200 - METADATA_FALLBACK_TAIL);
    }

    #[test]
    fn test_normalize_tiny_inputs() {
        assert!(normalize(&[]).is_empty());
        assert_eq!(normalize(&[0x00]), &[0x00]);
        assert_eq!(normalize(&[0x60, 0x01, 0x00]), &[0x60, 0x01, 0x00]);
    }

    #[test]
    fn test_normalize_rejects_non_cbor_start() {
        // length says 3, byte at start is 0x60 (not a CBOR map)
        let mut code = vec![0x5b; 10];
        code.extend_from_slice(&[0x60, 0x01, 0x02, 0x00, 0x03]);
        assert_eq!(normalize(&code), code.as_slice());
    }

    #[test]
    fn test_fingerprint_skips_push_immediates() {
        // PUSH2 0xf4f4 (DELEGATECALL bytes as data), STOP
        let code = [0x61, 0xf4, 0xf4, 0x00];
        let fp = fingerprint(&code);
        assert!(!fp.risky.delegatecall);
        assert_eq!(fp.op_hist.get(&0x61), Some(&1));
        assert_eq!(fp.op_hist.get(&0x00), Some(&1));
        assert_eq!(fp.op_hist.get(&0xf4), None);
    }

    #[test]
    fn test_fingerprint_push32_at_end_is_truncated_safely() {
        let code = [0x7f, 0x01, 0x02];
        let fp = fingerprint(&code);
        assert_eq!(fp.op_hist.len(), 1);
        assert_eq!(fp.op_hist.get(&0x7f), Some(&1));
    }

    #[test]
    fn test_fingerprint_flags_risky_opcodes() {
        let code = [0x60, 0x00, 0xf4, 0xf5, 0xff, 0xf0];
        let fp = fingerprint(&code);
        assert!(fp.risky.delegatecall);
        assert!(fp.risky.create2);
        assert!(fp.risky.selfdestruct);
        assert!(fp.risky.create);
    }

    #[test]
    fn test_fingerprint_selector_flags() {
        // PUSH4 mint(address,uint256)
        let code = hex::decode("6340c10f1914").unwrap();
        let fp = fingerprint(&code);
        assert_eq!(fp.selectors.get("mint"), Some(&true));
        assert_eq!(fp.selectors.get("setBots"), Some(&false));
        assert_eq!(fp.flagged_selectors(), vec!["mint".to_string()]);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let code = hex::decode("608060405234801561001057600080fd5b506004361061").unwrap();
        let n = normalize(&code);
        assert_eq!(fingerprint(n), fingerprint(n));
        assert_eq!(fingerprint_hash(&fingerprint(n)), fingerprint_hash(&fingerprint(n)));
        assert_eq!(content_hash(n), content_hash(n));
    }

    #[test]
    fn test_cosine_self_similarity_and_zero() {
        let fp = fingerprint(&hex::decode("6080604052348015600f57600080fd5b50").unwrap());
        let sim = cosine_similarity(&fp.op_hist, &fp.op_hist);
        assert!((sim - 1.0).abs() < 1e-12);

        let empty = BTreeMap::new();
        assert_eq!(cosine_similarity(&fp.op_hist, &empty), 0.0);
        let mut zeros = BTreeMap::new();
        zeros.insert(0x60u8, 0u32);
        assert_eq!(cosine_similarity(&zeros, &fp.op_hist), 0.0);
    }

    #[test]
    fn test_cosine_disjoint_keys() {
        let mut a = BTreeMap::new();
        a.insert(0x01u8, 3u32);
        let mut b = BTreeMap::new();
        b.insert(0x02u8, 4u32);
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        b.insert(0x01, 4);
        // (3*4) / (3 * sqrt(32))
        let expected = 12.0 / (3.0 * 32f64.sqrt());
        assert!((cosine_similarity(&a, &b) - expected).abs() < 1e-12);
    }
}
