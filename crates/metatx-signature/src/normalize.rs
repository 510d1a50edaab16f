//! Parsing and normalisation of 65-byte ECDSA signatures.

use crate::SignatureError;
use alloy::primitives::B256;

/// Offset added to `v` by the smart-wallet personal-sign path so the wallet
/// contract recognises an `eth_sign` style signature.
pub const SMART_WALLET_V_OFFSET: u8 = 4;

/// A signature split into its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParameters {
	pub r: B256,
	pub s: B256,
	pub v: u8,
}

impl SignatureParameters {
	/// Parses `r || s || v` from hex, normalising a 0/1 recovery id to 27/28.
	pub fn parse(signature: &str) -> Result<Self, SignatureError> {
		let body = signature.strip_prefix("0x").unwrap_or(signature);
		let bytes = hex::decode(body).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
		if bytes.len() != 65 {
			return Err(SignatureError::InvalidLength(bytes.len()));
		}

		let mut v = bytes[64];
		if v != 27 && v != 28 {
			v = v.wrapping_add(27);
		}

		Ok(Self {
			r: B256::from_slice(&bytes[..32]),
			s: B256::from_slice(&bytes[32..64]),
			v,
		})
	}

	/// Returns a copy with `offset` added to `v`.
	pub fn with_v_offset(self, offset: u8) -> Self {
		Self {
			v: self.v.wrapping_add(offset),
			..self
		}
	}

	pub fn to_bytes(&self) -> [u8; 65] {
		let mut out = [0u8; 65];
		out[..32].copy_from_slice(self.r.as_slice());
		out[32..64].copy_from_slice(self.s.as_slice());
		out[64] = self.v;
		out
	}

	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(self.to_bytes()))
	}
}

/// Parses and re-serialises a signature with a canonical `v`.
pub fn normalize_signature(signature: &str) -> Result<String, SignatureError> {
	Ok(SignatureParameters::parse(signature)?.to_hex())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn raw(v: u8) -> String {
		format!("0x{}{}{:02x}", "11".repeat(32), "22".repeat(32), v)
	}

	#[test]
	fn test_recovery_id_is_normalised() {
		assert_eq!(SignatureParameters::parse(&raw(0)).unwrap().v, 27);
		assert_eq!(SignatureParameters::parse(&raw(1)).unwrap().v, 28);
		assert_eq!(SignatureParameters::parse(&raw(28)).unwrap().v, 28);
		assert_eq!(normalize_signature(&raw(1)).unwrap(), raw(28));
	}

	#[test]
	fn test_smart_wallet_offset_is_exactly_four() {
		let parsed = SignatureParameters::parse(&raw(27)).unwrap();
		let shifted = parsed.with_v_offset(SMART_WALLET_V_OFFSET);
		assert_eq!(shifted.v, 31);
		assert_eq!(shifted.r, parsed.r);
		assert_eq!(shifted.to_hex(), raw(31));
	}

	#[test]
	fn test_malformed_signatures_are_rejected() {
		assert!(matches!(
			SignatureParameters::parse("0xzz"),
			Err(SignatureError::InvalidHex(_))
		));
		assert!(matches!(
			SignatureParameters::parse("0x1234"),
			Err(SignatureError::InvalidLength(2))
		));
	}
}
