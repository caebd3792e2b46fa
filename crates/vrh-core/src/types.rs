//! Core type definitions for the VRH engine
//!
//! Accounts and protocol components share one identifier space. Component
//! addresses are derived deterministically with BLAKE3 so that two runs of the
//! same scenario produce identical state.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::WEEK;

/// Seconds since Unix epoch
pub type Timestamp = u64;

/// Token amount in the smallest unit (10^-18)
pub type Amount = u128;

/// Address - 20-byte identifier for accounts and components
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address {
    bytes: [u8; 20],
}

impl Address {
    /// The zero address, used as "no account"
    pub const ZERO: Self = Self { bytes: [0u8; 20] };

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self { bytes }
    }

    /// Derive an address for a human-readable account label ("alice", "bob")
    pub fn from_label(label: &str) -> Self {
        Self::derive(b"account", &[label.as_bytes()])
    }

    /// Derive a component address from a domain tag and seed parts
    pub fn derive(domain: &[u8], parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let hash = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self { bytes }
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.bytes
    }

    /// Is this the zero address
    pub fn is_zero(&self) -> bool {
        self.bytes == [0u8; 20]
    }

    /// Convert to 0x-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Parse from hex (with or without 0x prefix)
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self { bytes })
    }

    /// Parse either a hex address or an account label
    ///
    /// Anything starting with `0x` must be a valid 20-byte hex address.
    pub fn parse(s: &str) -> Result<Self, hex::FromHexError> {
        if s.starts_with("0x") {
            return Self::from_hex(s);
        }
        Ok(Self::from_hex(s).unwrap_or_else(|_| Self::from_label(s)))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| serde::de::Error::custom(format!("invalid address {s}: {e}")))
    }
}

/// Floor a timestamp to its week boundary
pub fn week_floor(t: Timestamp) -> Timestamp {
    t / WEEK * WEEK
}

/// The first week boundary strictly after `t`
pub fn next_week(t: Timestamp) -> Timestamp {
    (t + WEEK) / WEEK * WEEK
}

/// Floor a timestamp to an arbitrary period boundary
pub fn period_floor(t: Timestamp, period: u64) -> Timestamp {
    t / period * period
}
