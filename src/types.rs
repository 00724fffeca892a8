//! Primitive chain types: addresses, transaction hashes and hex quantities.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::WalletError;

/// A 20-byte account or contract address.
///
/// Parsing accepts any hex casing; display is always lowercase, so two
/// addresses compare equal exactly when they are equal case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Address from the low 20 bytes of a 32-byte ABI word or log topic.
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Address(out)
    }

    /// `0x1234...abcd`
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = strip_hex_prefix(s);
        if stripped.len() != 40 {
            return Err(WalletError::InvalidArgument(format!(
                "expected 20-byte address (40 hex chars), got {}",
                stripped.len()
            )));
        }
        let bytes = hex::decode(stripped)
            .map_err(|e| WalletError::InvalidArgument(format!("invalid address hex: {e}")))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = strip_hex_prefix(s);
        if stripped.len() != 64 {
            return Err(WalletError::MalformedResponse(format!(
                "expected 32-byte hash (64 hex chars), got {}",
                stripped.len()
            )));
        }
        let bytes = hex::decode(stripped)
            .map_err(|e| WalletError::MalformedResponse(format!("invalid hash hex: {e}")))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(TxHash(out))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub type ChainId = u64;

pub(crate) fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a hex quantity such as a `chainChanged` payload (`"0xaa36a7"`).
pub fn parse_hex_u64(hex_str: &str) -> Result<u64, WalletError> {
    u64::from_str_radix(strip_hex_prefix(hex_str), 16)
        .map_err(|e| WalletError::MalformedResponse(format!("invalid hex quantity {hex_str:?}: {e}")))
}

/// Decode hex bytes, tolerating odd length and an empty payload (`"0x"`).
pub fn parse_hex_bytes(hex_str: &str) -> Result<Vec<u8>, WalletError> {
    let stripped = strip_hex_prefix(hex_str);
    if stripped.is_empty() {
        return Ok(Vec::new());
    }
    let padded = if stripped.len() % 2 == 1 {
        format!("0{stripped}")
    } else {
        stripped.to_string()
    };
    hex::decode(&padded).map_err(|e| WalletError::MalformedResponse(format!("invalid hex: {e}")))
}
