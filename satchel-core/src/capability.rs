//! Capability descriptor for cache adapters.
//!
//! The registry routes bulk operations through these flags instead of
//! probing adapters for methods at runtime.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional operations an adapter supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AdapterCapabilities: u8 {
        /// Whole-namespace wipe via `delete_all`.
        const DELETE_ALL = 0b0000_0001;
        /// Tag-index reconciliation via `optimize`.
        const OPTIMIZE = 0b0000_0010;
    }
}

// Manual serde implementation (bitflags 2.x + serde)
impl Serialize for AdapterCapabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AdapterCapabilities {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid AdapterCapabilities bits: {:#04x}", bits))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let caps = AdapterCapabilities::DELETE_ALL | AdapterCapabilities::OPTIMIZE;
        assert!(caps.contains(AdapterCapabilities::DELETE_ALL));
        assert!(caps.contains(AdapterCapabilities::OPTIMIZE));

        let partial = AdapterCapabilities::DELETE_ALL;
        assert!(!partial.contains(AdapterCapabilities::OPTIMIZE));
    }

    #[test]
    fn test_serde_roundtrip_via_bits() {
        let caps = AdapterCapabilities::all();
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, "3");
        let back: AdapterCapabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(back, caps);
    }

    #[test]
    fn test_deserialize_rejects_unknown_bits() {
        assert!(serde_json::from_str::<AdapterCapabilities>("255").is_err());
    }
}
