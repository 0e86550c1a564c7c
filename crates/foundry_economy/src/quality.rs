//! # Quality Propagation
//!
//! Derives the quality, rarity and tech tier of refined materials and crafted
//! products from what went into them.
//!
//! The formula lives behind [`QualityStrategy`] so balance changes never touch
//! pipeline control flow. [`WeightedAverage`] is the default and is a working
//! assumption, not a confirmed design contract.
//!
//! Rarity is always derived from the final quality through
//! [`Rarity::from_quality`], never inherited from inputs, so it stays a pure
//! function of one scalar.

use serde::{Deserialize, Serialize};

use crate::catalog::{MAX_QUALITY, MAX_TECH_TIER};
use crate::resource::{EntityId, Rarity, ResourceKey};

/// Lowest quality a material or product can carry.
pub const MIN_QUALITY: u8 = 1;

/// A slice of material actually consumed by a craft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialInput {
    /// Container the units were drawn from.
    pub material_ref: EntityId,
    /// Material consumed.
    pub material_type: ResourceKey,
    /// Stack quality at the time of consumption.
    pub quality_used: u8,
    /// Units consumed.
    pub quantity_used: u8,
}

/// Everything a strategy may look at when grading a craft.
#[derive(Clone, Copy, Debug)]
pub struct CraftContext<'a> {
    /// Consumed material slices.
    pub inputs: &'a [MaterialInput],
    /// Crafter skill (0-100, 50 is neutral).
    pub crafter_skill: u8,
    /// Tech tier the recipe assigns to its product.
    pub recipe_tech_tier: u8,
    /// Highest tech tier among consumed materials.
    pub input_tech_tier: u8,
}

/// Grade of a crafted product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityOutcome {
    /// Quality (1-100).
    pub quality: u8,
    /// Rarity derived from quality.
    pub rarity: Rarity,
    /// Tech tier (0-10).
    pub tech_tier: u8,
}

/// Pluggable quality rule used by the refining and crafting stages.
pub trait QualityStrategy {
    /// Quality of material refined from a stack of the given quality.
    fn refined_quality(&self, source_quality: u8) -> u8 {
        source_quality.clamp(MIN_QUALITY, MAX_QUALITY)
    }

    /// Grade of a product crafted from the given inputs.
    fn crafted(&self, context: &CraftContext<'_>) -> QualityOutcome;
}

impl<T: QualityStrategy + ?Sized> QualityStrategy for &T {
    fn refined_quality(&self, source_quality: u8) -> u8 {
        (**self).refined_quality(source_quality)
    }

    fn crafted(&self, context: &CraftContext<'_>) -> QualityOutcome {
        (**self).crafted(context)
    }
}

impl<T: QualityStrategy + ?Sized> QualityStrategy for Box<T> {
    fn refined_quality(&self, source_quality: u8) -> u8 {
        (**self).refined_quality(source_quality)
    }

    fn crafted(&self, context: &CraftContext<'_>) -> QualityOutcome {
        (**self).crafted(context)
    }
}

/// Quantity-weighted mean of input qualities, scaled by crafter skill.
///
/// ```text
/// mean     = sum(quality_used * quantity_used) / sum(quantity_used)
/// modifier = 1 + skill_weight * (skill - 50) / 50
/// quality  = clamp(round(mean * modifier), 1, 100)
/// ```
///
/// With the default weight of `0.2`, a master crafter (skill 100) lifts the
/// mean by 20% and a novice (skill 0) lowers it by 20%.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedAverage {
    /// How strongly crafter skill bends the result.
    pub skill_weight: f64,
}

impl WeightedAverage {
    /// Default skill weight.
    pub const DEFAULT_SKILL_WEIGHT: f64 = 0.2;

    /// Creates the strategy with a custom skill weight.
    #[must_use]
    pub const fn new(skill_weight: f64) -> Self {
        Self { skill_weight }
    }

    /// Quantity-weighted mean quality of the inputs, `None` if nothing was consumed.
    #[must_use]
    pub fn mean_quality(inputs: &[MaterialInput]) -> Option<f64> {
        let (weighted, total) = inputs.iter().fold((0.0, 0.0), |(w, t), input| {
            let qty = f64::from(input.quantity_used);
            (w + f64::from(input.quality_used) * qty, t + qty)
        });
        (total > 0.0).then(|| weighted / total)
    }
}

impl Default for WeightedAverage {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SKILL_WEIGHT)
    }
}

impl QualityStrategy for WeightedAverage {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn crafted(&self, context: &CraftContext<'_>) -> QualityOutcome {
        let mean = Self::mean_quality(context.inputs).unwrap_or(f64::from(MIN_QUALITY));
        let skill = f64::from(context.crafter_skill.min(100));
        let modifier = 1.0 + self.skill_weight * (skill - 50.0) / 50.0;

        let quality = (mean * modifier)
            .round()
            .clamp(f64::from(MIN_QUALITY), f64::from(MAX_QUALITY)) as u8;

        QualityOutcome {
            quality,
            rarity: Rarity::from_quality(quality),
            tech_tier: context
                .recipe_tech_tier
                .max(context.input_tech_tier)
                .min(MAX_TECH_TIER),
        }
    }
}
