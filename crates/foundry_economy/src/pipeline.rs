//! # Production Pipeline
//!
//! **Extraction -> Refining -> Crafting, all through the ledger API.**
//!
//! ```text
//! ExtractedResource ──extract()──> raw stock ──refine()──> material stock
//!   (purity, qty)       deposit                claim+commit    deposit
//!
//! material stock ──craft()──> EndProduct
//!                claim+commit
//! ```
//!
//! ## Guarantees
//!
//! 1. **All-or-nothing**: a stage either completes, or leaves every container
//!    exactly as it found it, existing reservations included
//! 2. **No double allocation**: inputs are claimed with reservations before
//!    anything is deducted, and only unreserved stock can be claimed
//! 3. **Deterministic**: no randomness; same inputs = same outputs
//!
//! Quality, rarity and tech tier of crafted products come from the pipeline's
//! [`QualityStrategy`].

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::debug;

use crate::catalog::{Catalog, Recipe, MAX_TECH_TIER};
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::{Claim, Container, InventoryEntry};
use crate::quality::{CraftContext, MaterialInput, QualityStrategy, WeightedAverage};
use crate::resource::{EntityId, Rarity, ResourceKey};

/// A raw yield event reported by an extractor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedResource {
    /// Resource extracted.
    pub resource_type: ResourceKey,
    /// Fraction of the raw quantity that survives (0-100).
    pub purity: u8,
    /// Raw quantity extracted.
    pub quantity: u16,
    /// Extractor that produced the yield.
    pub source_producer_ref: EntityId,
}

/// What happened to an extraction yield.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractionOutcome {
    /// Units left after applying purity.
    pub yielded: u16,
    /// Units the destination accepted.
    pub accepted: f64,
}

impl ExtractionOutcome {
    /// Units that did not fit. The caller decides whether to drop or reroute them.
    #[inline]
    #[must_use]
    pub fn remainder(&self) -> f64 {
        (f64::from(self.yielded) - self.accepted).max(0.0)
    }
}

/// A batch of refined material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedMaterial {
    /// Material produced.
    pub material_type: ResourceKey,
    /// Quality (1-100).
    pub quality: u8,
    /// Rarity from the material's catalog rule.
    pub rarity: Rarity,
    /// Tech tier from the material's catalog rule (0-10).
    pub tech_tier: u8,
    /// Units produced.
    pub quantity: u16,
    /// Refinery that produced the batch.
    pub producer_ref: EntityId,
}

/// A crafted product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndProduct {
    /// Product type (the recipe key).
    pub product_type: ResourceKey,
    /// Display name from the recipe.
    pub name: String,
    /// Quality (1-100).
    pub quality: u8,
    /// Rarity derived from quality.
    pub rarity: Rarity,
    /// Tech tier (0-10).
    pub tech_tier: u8,
    /// Crafter that built it.
    pub crafter_ref: EntityId,
    /// Material slices consumed.
    pub inputs: Vec<MaterialInput>,
}

/// A container offered to a craft, tagged with the entity that owns it.
#[derive(Debug)]
pub struct CraftSource<'a> {
    /// Storehouse entity, recorded as `material_ref` on consumed inputs.
    pub owner: EntityId,
    /// The storehouse's stock.
    pub container: &'a mut Container,
}

impl<'a> CraftSource<'a> {
    /// Creates a craft source.
    #[must_use]
    pub fn new(owner: EntityId, container: &'a mut Container) -> Self {
        Self { owner, container }
    }
}

/// Units of one material claimed from one candidate during planning.
#[derive(Clone, Debug)]
struct Hold {
    line: usize,
    source: usize,
    material_type: ResourceKey,
    quantity: u8,
    quality: u8,
}

/// Units left after applying purity: `floor(raw * purity / 100)`.
///
/// Purity above 100 is treated as 100.
#[inline]
#[must_use]
pub fn refined_yield(purity: u8, raw_quantity: u16) -> u16 {
    let purity = u32::from(purity.min(100));
    let refined = u32::from(raw_quantity) * purity / 100;
    u16::try_from(refined).unwrap_or(raw_quantity)
}

/// Whether a stack may satisfy a recipe line.
#[inline]
fn eligible(entry: &InventoryEntry, min_quality: u8, min_rarity: Rarity) -> bool {
    entry.average_quality >= min_quality && entry.tier >= min_rarity
}

/// The three production stages bound to a catalog and a quality strategy.
#[derive(Clone, Debug)]
pub struct ProductionPipeline<'c, Q = WeightedAverage> {
    catalog: &'c Catalog,
    quality: Q,
}

impl<'c> ProductionPipeline<'c, WeightedAverage> {
    /// Creates a pipeline using the default [`WeightedAverage`] strategy.
    #[must_use]
    pub fn new(catalog: &'c Catalog) -> Self {
        Self::with_strategy(catalog, WeightedAverage::default())
    }
}

impl<'c, Q: QualityStrategy> ProductionPipeline<'c, Q> {
    /// Creates a pipeline with a custom quality strategy.
    #[must_use]
    pub fn with_strategy(catalog: &'c Catalog, quality: Q) -> Self {
        Self { catalog, quality }
    }

    /// The catalog this pipeline reads.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// The quality strategy in use.
    #[must_use]
    pub fn strategy(&self) -> &Q {
        &self.quality
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    /// Applies purity to a raw yield and stores the result.
    ///
    /// The stack is graded with quality = purity. Whatever the destination
    /// cannot hold is reported in the outcome, not stored.
    pub fn extract(&self, event: &ExtractedResource, dest: &mut Container) -> ExtractionOutcome {
        let yielded = refined_yield(event.purity, event.quantity);
        if yielded == 0 {
            return ExtractionOutcome {
                yielded,
                accepted: 0.0,
            };
        }

        let purity = event.purity.min(100);
        let accepted = dest.deposit(
            event.resource_type.as_str(),
            f64::from(yielded),
            purity,
            Rarity::from_quality(purity),
        );

        let outcome = ExtractionOutcome { yielded, accepted };
        if outcome.remainder() > 0.0 {
            debug!(
                resource = %event.resource_type,
                producer = event.source_producer_ref,
                remainder = outcome.remainder(),
                "extraction overflowed destination"
            );
        }
        outcome
    }

    // =========================================================================
    // Refining
    // =========================================================================

    /// Refines raw stock from `source` into `dest`.
    ///
    /// # Arguments
    ///
    /// * `material_type` - Material to produce; selects the refining rule
    /// * `batches` - Number of rule batches to run
    /// * `producer_ref` - Refinery entity, recorded on the output
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `batches` is zero or the output overflows `u16`
    /// - `UnknownRefiningRule` / `UnknownMaterial` for catalog misses
    /// - `InsufficientStock` if the source lacks unreserved input
    /// - `InsufficientSpace` if the destination cannot hold the output
    ///
    /// On error neither container is modified.
    pub fn refine(
        &self,
        source: &mut Container,
        dest: &mut Container,
        material_type: &str,
        batches: u16,
        producer_ref: EntityId,
    ) -> EconomyResult<ProducedMaterial> {
        self.refine_between(source, Some(dest), material_type, batches, producer_ref)
    }

    /// Refines raw stock into material within a single container.
    ///
    /// # Errors
    ///
    /// Same as [`ProductionPipeline::refine`].
    pub fn refine_in_place(
        &self,
        container: &mut Container,
        material_type: &str,
        batches: u16,
        producer_ref: EntityId,
    ) -> EconomyResult<ProducedMaterial> {
        self.refine_between(container, None, material_type, batches, producer_ref)
    }

    fn refine_between(
        &self,
        source: &mut Container,
        dest: Option<&mut Container>,
        material_type: &str,
        batches: u16,
        producer_ref: EntityId,
    ) -> EconomyResult<ProducedMaterial> {
        if batches == 0 {
            return Err(EconomyError::InvalidQuantity(
                "refining needs at least one batch".to_string(),
            ));
        }
        let rule = self
            .catalog
            .refining_rule_for(material_type)
            .ok_or_else(|| EconomyError::UnknownRefiningRule(ResourceKey::new(material_type)))?;
        let material = self
            .catalog
            .material(material_type)
            .ok_or_else(|| EconomyError::UnknownMaterial(ResourceKey::new(material_type)))?;

        let output = u16::try_from(u32::from(rule.output_per_batch) * u32::from(batches))
            .map_err(|_| {
                EconomyError::InvalidQuantity(format!(
                    "{batches} batches of {material_type} overflow a single output"
                ))
            })?;
        let input_key = rule.input.as_str();
        let required = f64::from(rule.input_per_batch) * f64::from(batches);
        let short = |available: f64| EconomyError::InsufficientStock {
            resource: rule.input.clone(),
            required,
            available,
        };

        // Every check runs before the first mutation.
        if !source.has_available(input_key, required) {
            return Err(short(source.available(input_key)));
        }
        let free = dest.as_deref().unwrap_or(&*source).space(material_type);
        if free < f64::from(output) {
            debug!(
                material = material_type,
                output, free, "refining refused: destination full"
            );
            return Err(EconomyError::InsufficientSpace {
                resource: rule.output.clone(),
                required: f64::from(output),
                free,
            });
        }

        let source_quality = source
            .entry(input_key)
            .map_or(InventoryEntry::DEFAULT_QUALITY, |e| e.average_quality);
        let Some(claim) = source.claim(input_key, required) else {
            return Err(short(source.available(input_key)));
        };
        source.commit_claim(claim);

        let quality = self.quality.refined_quality(source_quality);
        let target = match dest {
            Some(dest) => dest,
            None => source,
        };
        target.deposit(material_type, f64::from(output), quality, material.rarity);

        debug!(
            material = material_type,
            batches, output, quality, producer = producer_ref, "refined"
        );

        Ok(ProducedMaterial {
            material_type: rule.output.clone(),
            quality,
            rarity: material.rarity,
            tech_tier: material.tech_tier.min(MAX_TECH_TIER),
            quantity: output,
            producer_ref,
        })
    }

    // =========================================================================
    // Crafting
    // =========================================================================

    /// Checks whether the candidates can satisfy a recipe, without touching them.
    ///
    /// # Errors
    ///
    /// - `UnknownRecipe` if the product has no recipe
    /// - `RequirementUnmet` for the first line that cannot be covered
    pub fn can_craft(&self, product: &str, candidates: &[&Container]) -> EconomyResult<()> {
        let recipe = self.recipe(product)?;
        plan(recipe, candidates).map(|_| ())
    }

    /// Crafts a product, consuming materials from the candidate containers.
    ///
    /// Each recipe line is covered from the candidates in order, splitting
    /// across containers when one alone is not enough. A stack qualifies when
    /// its quality and tier meet the line's minimums. Stricter lines are
    /// covered first, so a lenient line never takes the only units a stricter
    /// line accepts. Consumed inputs are reported in recipe line order.
    ///
    /// **ATOMIC**: either every line is covered and all materials are
    /// consumed, or no container changes.
    ///
    /// # Errors
    ///
    /// - `UnknownRecipe` if the product has no recipe
    /// - `RequirementUnmet` if a line cannot be covered
    /// - `InsufficientStock` if a planned reservation is refused
    pub fn craft(
        &self,
        product: &str,
        candidates: &mut [CraftSource<'_>],
        crafter_ref: EntityId,
        crafter_skill: u8,
    ) -> EconomyResult<EndProduct> {
        let recipe = self.recipe(product)?;

        let holds = {
            let views: Vec<&Container> = candidates.iter().map(|c| &*c.container).collect();
            plan(recipe, &views)?
        };

        // Claim everything before deducting anything.
        let mut claims = Vec::with_capacity(holds.len());
        for hold in &holds {
            let amount = f64::from(hold.quantity);
            let container = &mut *candidates[hold.source].container;
            match container.claim(hold.material_type.as_str(), amount) {
                Some(claim) => claims.push((hold.source, claim)),
                None => {
                    let available = container.available(hold.material_type.as_str());
                    release(candidates, claims);
                    debug!(product, material = %hold.material_type, "craft rolled back");
                    return Err(EconomyError::InsufficientStock {
                        resource: hold.material_type.clone(),
                        required: amount,
                        available,
                    });
                }
            }
        }

        // Newest first, so each claim settles against its own prior reservation.
        for (source, claim) in claims.into_iter().rev() {
            candidates[source].container.commit_claim(claim);
        }

        let inputs: Vec<MaterialInput> = holds
            .iter()
            .map(|hold| MaterialInput {
                material_ref: candidates[hold.source].owner,
                material_type: hold.material_type.clone(),
                quality_used: hold.quality,
                quantity_used: hold.quantity,
            })
            .collect();

        let input_tech_tier = inputs
            .iter()
            .map(|i| self.catalog.material_tech_tier(i.material_type.as_str()))
            .max()
            .unwrap_or(0);
        let outcome = self.quality.crafted(&CraftContext {
            inputs: &inputs,
            crafter_skill,
            recipe_tech_tier: recipe.tech_tier,
            input_tech_tier,
        });

        debug!(
            product,
            quality = outcome.quality,
            rarity = %outcome.rarity,
            crafter = crafter_ref,
            "crafted"
        );

        Ok(EndProduct {
            product_type: ResourceKey::new(product),
            name: recipe.name.clone(),
            quality: outcome.quality,
            rarity: outcome.rarity,
            tech_tier: outcome.tech_tier,
            crafter_ref,
            inputs,
        })
    }

    fn recipe(&self, product: &str) -> EconomyResult<&'c Recipe> {
        self.catalog
            .recipe(product)
            .ok_or_else(|| EconomyError::UnknownRecipe(ResourceKey::new(product)))
    }
}

/// Works out which candidate covers which part of each recipe line.
///
/// Read-only. Lines are planned strictest first (rarity floor, then quality
/// floor), and holds already planned count against later lines, so two lines
/// naming the same material never plan the same units. The returned holds
/// are in recipe line order.
fn plan(recipe: &Recipe, candidates: &[&Container]) -> EconomyResult<Vec<Hold>> {
    let mut order: Vec<usize> = (0..recipe.requirements.len()).collect();
    order.sort_by_key(|&line| {
        let requirement = &recipe.requirements[line];
        Reverse((requirement.min_rarity, requirement.min_quality))
    });

    let mut holds: Vec<Hold> = Vec::new();
    for line in order {
        let requirement = &recipe.requirements[line];
        let key = requirement.material_type.as_str();
        let mut remaining = requirement.quantity_required;

        for (index, container) in candidates.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let Some(entry) = container.entry(key) else {
                continue;
            };
            if !eligible(entry, requirement.min_quality, requirement.min_rarity) {
                continue;
            }

            let planned: f64 = holds
                .iter()
                .filter(|h| h.source == index && h.material_type.as_str() == key)
                .map(|h| f64::from(h.quantity))
                .sum();
            let free_units = (entry.available() - planned).max(0.0).floor();
            let take = if free_units >= f64::from(remaining) {
                remaining
            } else {
                whole_units(free_units)
            };
            if take == 0 {
                continue;
            }

            holds.push(Hold {
                line,
                source: index,
                material_type: requirement.material_type.clone(),
                quantity: take,
                quality: entry.average_quality,
            });
            remaining -= take;
        }

        if remaining > 0 {
            let found = requirement.quantity_required - remaining;
            debug!(
                material = key,
                required = requirement.quantity_required,
                found,
                "craft requirement unmet"
            );
            return Err(EconomyError::RequirementUnmet {
                material: requirement.material_type.clone(),
                required: requirement.quantity_required,
                min_quality: requirement.min_quality,
                found: f64::from(found),
            });
        }
    }

    holds.sort_by_key(|hold| hold.line);
    Ok(holds)
}

/// Converts a floored, non-negative unit count below `u8::MAX` to `u8`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_units(units: f64) -> u8 {
    units.clamp(0.0, f64::from(u8::MAX)) as u8
}

/// Drops claims made during a craft attempt, newest first.
fn release(candidates: &mut [CraftSource<'_>], claims: Vec<(usize, Claim)>) {
    for (source, claim) in claims.into_iter().rev() {
        candidates[source].container.release(claim);
    }
}
