//! OBI - the fixed-width binary encoding used by the price feed
//!
//! Integers are big-endian, strings and vectors carry a u32 length prefix.
//! Only the shapes the feeder actually exchanges are implemented.

use crate::error::{FeederError, Result};

/// Incremental OBI writer
#[derive(Debug, Default)]
pub struct ObiWriter {
    buf: Vec<u8>,
}

impl ObiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn string(self, s: &str) -> Self {
        let mut w = self.u32(s.len() as u32);
        w.buf.extend_from_slice(s.as_bytes());
        w
    }

    pub fn strings(self, items: &[String]) -> Self {
        items
            .iter()
            .fold(self.u32(items.len() as u32), |w, s| w.string(s))
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Calldata for the exchange price script: `{symbol: string, multiplier: u64}`
pub fn exchange_calldata(symbol: &str, multiplier: u64) -> Vec<u8> {
    ObiWriter::new().string(symbol).u64(multiplier).finish()
}

/// Calldata for the fx script: `{symbols: [string], multiplier: u64}`
pub fn fx_calldata(symbols: &[String], multiplier: u64) -> Vec<u8> {
    ObiWriter::new().strings(symbols).u64(multiplier).finish()
}

/// Decode exactly `N` big-endian i64 fields
pub fn decode_i64_fields<const N: usize>(source_name: &str, bytes: &[u8]) -> Result<[i64; N]> {
    let expected = N * 8;
    if bytes.len() != expected {
        return Err(FeederError::shape(source_name, expected, bytes.len()));
    }

    let mut out = [0i64; N];
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        *slot = i64::from_be_bytes(raw);
    }
    Ok(out)
}

/// Decode a length-prefixed `[u64]` that must hold exactly `expected_len` items
pub fn decode_u64_vec(source_name: &str, bytes: &[u8], expected_len: usize) -> Result<Vec<u64>> {
    let expected = 4 + expected_len * 8;
    if bytes.len() != expected {
        return Err(FeederError::shape(source_name, expected, bytes.len()));
    }

    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&bytes[..4]);
    let len = u32::from_be_bytes(prefix) as usize;
    if len != expected_len {
        return Err(FeederError::decode(
            source_name,
            format!("vector length prefix {} does not match {} requested symbols", len, expected_len),
        ));
    }

    Ok(bytes[4..]
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            u64::from_be_bytes(raw)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_calldata_matches_known_encoding() {
        assert_eq!(
            hex::encode(exchange_calldata("LUNA", 1_000_000)),
            "000000044c554e4100000000000f4240"
        );
        // legacy request with a 10^4 multiplier
        assert_eq!(
            hex::encode(exchange_calldata("LUNA", 10_000)),
            "000000044c554e410000000000002710"
        );
    }

    #[test]
    fn fx_calldata_matches_known_encoding() {
        let symbols = vec!["KRW".to_string(), "MNT".to_string(), "XDR".to_string()];
        assert_eq!(
            hex::encode(fx_calldata(&symbols, 1_000_000)),
            "00000003000000034b5257000000034d4e540000000358445200000000000f4240"
        );
    }

    #[test]
    fn decode_i64_fields_keeps_sign() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&42i64.to_be_bytes());
        bytes.extend_from_slice(&(-1i64).to_be_bytes());
        let fields: [i64; 2] = decode_i64_fields("test", &bytes).unwrap();
        assert_eq!(fields, [42, -1]);
    }

    #[test]
    fn decode_i64_fields_rejects_wrong_width() {
        let err = decode_i64_fields::<7>("test", &[0u8; 32]).unwrap_err();
        match err {
            FeederError::Shape { expected, actual, .. } => {
                assert_eq!(expected, 56);
                assert_eq!(actual, 32);
            }
            other => panic!("expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn decode_u64_vec_checks_prefix_and_width() {
        let bytes = ObiWriter::new().u32(2).u64(7).u64(9).finish();
        assert_eq!(decode_u64_vec("fx", &bytes, 2).unwrap(), vec![7, 9]);

        assert!(matches!(
            decode_u64_vec("fx", &bytes, 3),
            Err(FeederError::Shape { .. })
        ));

        let lying = ObiWriter::new().u32(5).u64(7).u64(9).finish();
        assert!(matches!(
            decode_u64_vec("fx", &lying, 2),
            Err(FeederError::Decode { .. })
        ));
    }
}
