//! # Resource Vocabulary
//!
//! Value types shared by every part of the economy: the interned resource key,
//! the rarity ladder and opaque entity references.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Opaque reference to a simulation entity (producer, crafter, storehouse).
///
/// The economy core stores and returns these but never dereferences them.
pub type EntityId = u64;

/// Identifier of a resource, material or product category.
///
/// Keys compare and hash by string value. Cloning is a reference-count bump,
/// so the ledger can hand keys around without reallocating.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Creates a key from any string-like value.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Serialize for ResourceKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// Rarity tier for materials, products and inventory stacks.
///
/// Ordered by ordinal: `Common < Uncommon < Rare < Epic < Legendary`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rarity {
    /// Common (gray).
    #[default]
    Common = 0,
    /// Uncommon (green).
    Uncommon = 1,
    /// Rare (blue).
    Rare = 2,
    /// Epic (purple).
    Epic = 3,
    /// Legendary (orange).
    Legendary = 4,
}

impl Rarity {
    /// All tiers in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
    ];

    /// Derives a tier from a quality scalar.
    ///
    /// Step function over fixed thresholds: a higher quality never maps to a
    /// lower tier.
    #[inline]
    #[must_use]
    pub const fn from_quality(quality: u8) -> Self {
        match quality {
            0..=39 => Self::Common,
            40..=59 => Self::Uncommon,
            60..=79 => Self::Rare,
            80..=94 => Self::Epic,
            _ => Self::Legendary,
        }
    }

    /// Lowest quality that maps to this tier.
    #[inline]
    #[must_use]
    pub const fn min_quality(self) -> u8 {
        match self {
            Self::Common => 0,
            Self::Uncommon => 40,
            Self::Rare => 60,
            Self::Epic => 80,
            Self::Legendary => 95,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        };
        f.write_str(name)
    }
}
