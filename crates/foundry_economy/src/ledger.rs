//! # Resource Ledger
//!
//! Capacity-bounded stock for a single storehouse, with reservations.
//!
//! A [`Container`] accepts only the resource types listed in its capacity
//! table. Each stored type keeps a physical `amount`, a `reserved` claim on
//! part of that amount, and a blended stack quality.
//!
//! ## Reservation Model
//!
//! ```text
//! amount   [##########################..........]  max_capacity
//!           |-- reserved --|-- available --|
//! ```
//!
//! - `remove` and `reserve` only ever draw from `available`
//! - `commit_reservation` turns a claim into a real deduction
//! - `cancel_reservation` releases a claim without touching `amount`
//! - `claim` returns a [`Claim`] token; releasing or committing it restores
//!   the reservation level it found, bit for bit
//!
//! Two jobs targeting the same stock therefore cannot both be granted the
//! same units.
//!
//! Invalid input (non-positive amounts, unknown types, not enough free stock)
//! is reported through the return value, never by panicking.

use std::collections::HashMap;

use tracing::trace;

use crate::catalog::Catalog;
use crate::error::{EconomyError, EconomyResult};
use crate::resource::{Rarity, ResourceKey};

/// Stock of one resource type inside a container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InventoryEntry {
    /// Quantity physically stored.
    pub amount: f64,
    /// Quantity promised to in-flight jobs. Always `<= amount`.
    pub reserved: f64,
    /// Rarity tier of the stack.
    pub tier: Rarity,
    /// Blended quality of the whole stack (0-100).
    pub average_quality: u8,
}

impl InventoryEntry {
    /// Quality assigned to a stack that was never graded.
    pub const DEFAULT_QUALITY: u8 = 50;

    /// Creates an empty, ungraded entry.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            amount: 0.0,
            reserved: 0.0,
            tier: Rarity::Common,
            average_quality: Self::DEFAULT_QUALITY,
        }
    }

    /// Stored stock not covered by a reservation.
    #[inline]
    #[must_use]
    pub fn available(&self) -> f64 {
        (self.amount - self.reserved).max(0.0)
    }

    fn debug_check(&self) {
        debug_assert!(
            self.reserved >= 0.0 && self.reserved <= self.amount,
            "reservation invariant broken: reserved {} of {}",
            self.reserved,
            self.amount
        );
    }
}

impl Default for InventoryEntry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Rejects zero, negative and NaN quantities.
#[inline]
fn is_valid_amount(amount: f64) -> bool {
    !amount.is_nan() && amount > 0.0
}

/// A storehouse: stock per resource type plus the capacity table that decides
/// which types it accepts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Container {
    /// Stored stock, one entry per type ever accepted.
    inventory: HashMap<ResourceKey, InventoryEntry>,
    /// Maximum stock per accepted type.
    capacity: HashMap<ResourceKey, f64>,
}

impl Container {
    /// Creates a container that accepts nothing until capacities are set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container from `(type, max_capacity)` pairs.
    #[must_use]
    pub fn with_capacities<I, K>(capacities: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<ResourceKey>,
    {
        let mut container = Self::new();
        for (key, max) in capacities {
            container.set_capacity(key, max);
        }
        container
    }

    /// Creates a container using a named capacity profile from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UnknownProfile` if the catalog has no such profile.
    pub fn from_profile(catalog: &Catalog, profile: &str) -> EconomyResult<Self> {
        let table = catalog
            .profile(profile)
            .ok_or_else(|| EconomyError::UnknownProfile(profile.to_string()))?;
        Ok(Self::with_capacities(
            table.iter().map(|(key, &max)| (key.clone(), max)),
        ))
    }

    /// Sets (or replaces) the capacity for a type.
    ///
    /// Shrinking a capacity below current stock does not evict anything: the
    /// surplus stays until it is removed, and further adds are refused.
    pub fn set_capacity(&mut self, key: impl Into<ResourceKey>, max_capacity: f64) {
        let max_capacity = if max_capacity.is_nan() {
            0.0
        } else {
            max_capacity.max(0.0)
        };
        self.capacity.insert(key.into(), max_capacity);
    }

    /// Stops accepting a type. Existing stock remains removable.
    pub fn remove_capacity(&mut self, key: &str) -> Option<f64> {
        self.capacity.remove(key)
    }

    /// Whether the container accepts a type at all.
    #[inline]
    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        self.capacity.contains_key(key)
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Adds ungraded stock.
    ///
    /// Returns the quantity accepted, which is limited by the free space
    /// `max_capacity - amount`. The caller owns whatever did not fit.
    /// Returns `0.0` for non-positive amounts or types without capacity.
    pub fn add(&mut self, key: &str, amount: f64) -> f64 {
        self.store(key, amount, None)
    }

    /// Adds graded stock, blending it into the stack's quality.
    ///
    /// The stack's `average_quality` becomes the quantity-weighted mean of the
    /// old stack and the accepted units. Its tier becomes `tier` when the
    /// stack was empty, otherwise the lower of the two tiers.
    pub fn deposit(&mut self, key: &str, amount: f64, quality: u8, tier: Rarity) -> f64 {
        self.store(key, amount, Some((quality.min(100), tier)))
    }

    fn store(&mut self, key: &str, amount: f64, grade: Option<(u8, Rarity)>) -> f64 {
        if !is_valid_amount(amount) {
            trace!(resource = key, amount, "add rejected: invalid amount");
            return 0.0;
        }
        let Some((type_key, &max_capacity)) = self.capacity.get_key_value(key) else {
            trace!(resource = key, "add rejected: type not accepted");
            return 0.0;
        };

        let stored = self.inventory.get(key).map_or(0.0, |e| e.amount);
        let accepted = amount.min((max_capacity - stored).max(0.0));
        if accepted <= 0.0 {
            trace!(resource = key, amount, "add rejected: container full");
            return 0.0;
        }

        let entry = self
            .inventory
            .entry(type_key.clone())
            .or_insert_with(InventoryEntry::empty);
        entry.debug_check();

        if let Some((quality, tier)) = grade {
            if entry.amount > 0.0 {
                entry.average_quality = blend_quality(
                    entry.amount,
                    entry.average_quality,
                    accepted,
                    quality,
                );
                entry.tier = entry.tier.min(tier);
            } else {
                entry.average_quality = quality;
                entry.tier = tier;
            }
        }
        entry.amount += accepted;
        accepted
    }

    /// Removes unreserved stock.
    ///
    /// Returns the quantity removed, at most `amount - reserved`. Reserved
    /// units are never touched. Returns `0.0` for non-positive amounts or
    /// types with no entry.
    pub fn remove(&mut self, key: &str, amount: f64) -> f64 {
        if !is_valid_amount(amount) {
            trace!(resource = key, amount, "remove rejected: invalid amount");
            return 0.0;
        }
        let Some(entry) = self.inventory.get_mut(key) else {
            trace!(resource = key, "remove rejected: no stock entry");
            return 0.0;
        };
        entry.debug_check();

        let removed = amount.min(entry.available());
        entry.amount = (entry.amount - removed).max(entry.reserved);
        removed
    }

    /// Free capacity for a type, counting reservations as occupied.
    ///
    /// `max(0, max_capacity - amount - reserved)`, or `0.0` if the type is not
    /// accepted or its capacity is zero.
    #[must_use]
    pub fn space(&self, key: &str) -> f64 {
        match self.capacity.get(key) {
            Some(&max) if max > 0.0 => {
                let (amount, reserved) = self
                    .inventory
                    .get(key)
                    .map_or((0.0, 0.0), |e| (e.amount, e.reserved));
                (max - amount - reserved).max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Quantity physically stored.
    #[inline]
    #[must_use]
    pub fn stored(&self, key: &str) -> f64 {
        self.inventory.get(key).map_or(0.0, |e| e.amount)
    }

    /// Configured maximum for a type.
    #[inline]
    #[must_use]
    pub fn capacity(&self, key: &str) -> f64 {
        self.capacity.get(key).copied().unwrap_or(0.0)
    }

    /// Quantity currently reserved.
    #[inline]
    #[must_use]
    pub fn reserved(&self, key: &str) -> f64 {
        self.inventory.get(key).map_or(0.0, |e| e.reserved)
    }

    /// Stored stock not covered by a reservation.
    #[inline]
    #[must_use]
    pub fn available(&self, key: &str) -> f64 {
        self.inventory.get(key).map_or(0.0, InventoryEntry::available)
    }

    /// The full entry for a type.
    #[inline]
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&InventoryEntry> {
        self.inventory.get(key)
    }

    /// Iterates over all stock entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&ResourceKey, &InventoryEntry)> {
        self.inventory.iter()
    }

    /// Iterates over the capacity table, in no particular order.
    pub fn capacities(&self) -> impl Iterator<Item = (&ResourceKey, f64)> {
        self.capacity.iter().map(|(k, &v)| (k, v))
    }

    // =========================================================================
    // Reservations
    // =========================================================================

    /// Claims unreserved stock for a later commit.
    ///
    /// Fails without mutation if `amount <= 0`, the type has no entry, or
    /// fewer than `amount` units are unreserved.
    pub fn reserve(&mut self, key: &str, amount: f64) -> bool {
        if !is_valid_amount(amount) {
            trace!(resource = key, amount, "reserve rejected: invalid amount");
            return false;
        }
        let Some(entry) = self.inventory.get_mut(key) else {
            trace!(resource = key, "reserve rejected: no stock entry");
            return false;
        };
        entry.debug_check();

        if entry.amount - entry.reserved < amount {
            trace!(
                resource = key,
                amount,
                available = entry.available(),
                "reserve rejected: insufficient unreserved stock"
            );
            return false;
        }
        entry.reserved = (entry.reserved + amount).min(entry.amount);
        true
    }

    /// Releases part of a reservation. Over-cancelling clamps to zero.
    pub fn cancel_reservation(&mut self, key: &str, amount: f64) {
        if !is_valid_amount(amount) {
            return;
        }
        if let Some(entry) = self.inventory.get_mut(key) {
            entry.debug_check();
            entry.reserved = settle(entry.reserved - amount);
        }
    }

    /// Whether `amount` units are stored and unreserved.
    #[must_use]
    pub fn has_available(&self, key: &str, amount: f64) -> bool {
        self.inventory
            .get(key)
            .is_some_and(|e| e.amount - e.reserved >= amount)
    }

    /// Converts reserved stock into an actual deduction.
    ///
    /// Consumes `min(amount, reserved)` from both the reservation and the
    /// stored amount, and returns the quantity consumed.
    pub fn commit_reservation(&mut self, key: &str, amount: f64) -> f64 {
        if !is_valid_amount(amount) {
            return 0.0;
        }
        let Some(entry) = self.inventory.get_mut(key) else {
            return 0.0;
        };
        entry.debug_check();

        let consumed = amount.min(entry.reserved);
        entry.amount = (entry.amount - consumed).max(0.0);
        entry.reserved = settle(entry.reserved - consumed).min(entry.amount);
        consumed
    }

    // =========================================================================
    // Claims
    // =========================================================================

    /// Reserves stock and returns a token that can undo or commit exactly that
    /// reservation.
    ///
    /// Unlike [`Container::cancel_reservation`], releasing a claim restores
    /// the reservation to its exact prior value instead of subtracting, so a
    /// rolled-back transaction leaves existing reservations bit-for-bit intact.
    /// Claims on one type must be settled in reverse order of creation.
    ///
    /// Returns `None`, without mutation, when [`Container::reserve`] would fail.
    #[must_use]
    pub fn claim(&mut self, key: &str, amount: f64) -> Option<Claim> {
        let prior_reserved = self.inventory.get(key)?.reserved;
        if !self.reserve(key, amount) {
            return None;
        }
        Some(Claim {
            key: ResourceKey::new(key),
            amount,
            prior_reserved,
            claimed_reserved: self.reserved(key),
        })
    }

    /// Drops a claim, leaving stock untouched.
    pub fn release(&mut self, claim: Claim) {
        if let Some(entry) = self.inventory.get_mut(claim.key.as_str()) {
            entry.debug_check();
            entry.reserved = claim.restored(entry.reserved);
        }
    }

    /// Deducts a claim's units from stock and drops the claim.
    ///
    /// Returns the quantity consumed.
    pub fn commit_claim(&mut self, claim: Claim) -> f64 {
        let Some(entry) = self.inventory.get_mut(claim.key.as_str()) else {
            return 0.0;
        };
        entry.debug_check();

        let consumed = claim.amount.min(entry.reserved);
        entry.amount = (entry.amount - consumed).max(0.0);
        entry.reserved = claim.restored(entry.reserved).min(entry.amount);
        consumed
    }
}

/// An outstanding reservation made by [`Container::claim`].
#[derive(Clone, Debug, PartialEq)]
#[must_use = "a claim must be released or committed"]
pub struct Claim {
    key: ResourceKey,
    amount: f64,
    prior_reserved: f64,
    claimed_reserved: f64,
}

impl Claim {
    /// Resource type the claim holds.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Units held.
    #[inline]
    #[must_use]
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Reservation level once this claim is gone.
    ///
    /// Exact when nothing else touched the reservation since the claim was
    /// made, otherwise falls back to subtraction.
    fn restored(&self, current: f64) -> f64 {
        if current.to_bits() == self.claimed_reserved.to_bits() {
            self.prior_reserved
        } else {
            settle(current - self.amount)
        }
    }
}

/// Reservation residue below this is rounding noise, not a claim.
const RESERVATION_DUST: f64 = 1e-9;

/// Clamps a reservation level at zero and clears rounding residue.
#[inline]
fn settle(reserved: f64) -> f64 {
    if reserved < RESERVATION_DUST {
        0.0
    } else {
        reserved
    }
}

/// Quantity-weighted mean of two stack qualities, rounded to the nearest unit.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_quality(old_amount: f64, old_quality: u8, added: f64, added_quality: u8) -> u8 {
    let total = old_amount + added;
    let blended =
        (old_amount * f64::from(old_quality) + added * f64::from(added_quality)) / total;
    blended.round().clamp(0.0, 100.0) as u8
}
