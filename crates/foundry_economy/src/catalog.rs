//! # Economy Catalog
//!
//! **Read-only balance data: capacities, materials, refining rules, recipes.**
//!
//! The catalog is loaded once (normally from TOML) and then passed by
//! reference to everything that needs it. Nothing in the economy mutates it
//! after startup.
//!
//! ## TOML Layout
//!
//! ```toml
//! [profiles.smelter]
//! IronOre = 500.0
//! IronIngot = 200.0
//!
//! [materials.IronIngot]
//! rarity = "Common"
//! tech_tier = 1
//!
//! [[refining]]
//! input = "IronOre"
//! output = "IronIngot"
//! input_per_batch = 2
//! output_per_batch = 1
//!
//! [recipes.IronSword]
//! name = "Iron Sword"
//! tech_tier = 2
//! requirements = [
//!     { material_type = "IronIngot", quantity_required = 3, min_quality = 30 },
//! ]
//! ```
//!
//! ## Validation
//!
//! [`Catalog::validate`] rejects configurations that would break the economy:
//! non-positive capacities, tech tiers above [`MAX_TECH_TIER`], empty recipes,
//! and refining chains that loop back on themselves.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::warn;

use crate::error::{EconomyError, EconomyResult};
use crate::resource::{Rarity, ResourceKey};

/// Highest tech tier a material or product may carry.
pub const MAX_TECH_TIER: u8 = 10;

/// Highest quality a stack, material or product may carry.
pub const MAX_QUALITY: u8 = 100;

/// Per-material classification used when a material is produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRule {
    /// Rarity assigned to freshly refined units.
    #[serde(default)]
    pub rarity: Rarity,
    /// Technological sophistication (0-10).
    #[serde(default)]
    pub tech_tier: u8,
}

impl MaterialRule {
    /// Creates a material rule.
    #[inline]
    #[must_use]
    pub const fn new(rarity: Rarity, tech_tier: u8) -> Self {
        Self { rarity, tech_tier }
    }
}

/// Conversion of raw stock into a refined material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefiningRule {
    /// Raw resource consumed.
    pub input: ResourceKey,
    /// Material produced.
    pub output: ResourceKey,
    /// Raw units consumed per batch.
    pub input_per_batch: u16,
    /// Material units produced per batch.
    pub output_per_batch: u16,
}

impl RefiningRule {
    /// Creates a refining rule.
    #[must_use]
    pub fn new(
        input: impl Into<ResourceKey>,
        output: impl Into<ResourceKey>,
        input_per_batch: u16,
        output_per_batch: u16,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            input_per_batch,
            output_per_batch,
        }
    }
}

/// One line of a recipe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRequirement {
    /// Material consumed.
    pub material_type: ResourceKey,
    /// Units consumed.
    pub quantity_required: u8,
    /// Lowest stack quality accepted.
    #[serde(default)]
    pub min_quality: u8,
    /// Lowest stack tier accepted.
    #[serde(default)]
    pub min_rarity: Rarity,
}

impl ComponentRequirement {
    /// Creates a requirement with no quality or rarity floor.
    #[must_use]
    pub fn new(material_type: impl Into<ResourceKey>, quantity_required: u8) -> Self {
        Self {
            material_type: material_type.into(),
            quantity_required,
            min_quality: 0,
            min_rarity: Rarity::Common,
        }
    }

    /// Sets the minimum stack quality.
    #[must_use]
    pub fn with_min_quality(mut self, min_quality: u8) -> Self {
        self.min_quality = min_quality;
        self
    }

    /// Sets the minimum stack tier.
    #[must_use]
    pub fn with_min_rarity(mut self, min_rarity: Rarity) -> Self {
        self.min_rarity = min_rarity;
        self
    }
}

/// An end-product recipe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Human-readable product name.
    pub name: String,
    /// Base tech tier of the product.
    #[serde(default)]
    pub tech_tier: u8,
    /// Materials consumed, all of which must be satisfied.
    pub requirements: Vec<ComponentRequirement>,
}

impl Recipe {
    /// Creates a new recipe with basic validation.
    ///
    /// # Errors
    ///
    /// Returns error if the recipe has no requirements.
    pub fn new(
        name: impl Into<String>,
        requirements: Vec<ComponentRequirement>,
    ) -> EconomyResult<Self> {
        if requirements.is_empty() {
            return Err(EconomyError::InvalidConfig(
                "Recipe must have at least one requirement".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            tech_tier: 0,
            requirements,
        })
    }

    /// Sets the base tech tier.
    #[must_use]
    pub const fn with_tech_tier(mut self, tech_tier: u8) -> Self {
        self.tech_tier = tech_tier;
        self
    }
}

/// The complete, immutable balance configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Named capacity tables for kinds of storehouse.
    #[serde(default)]
    profiles: HashMap<String, HashMap<ResourceKey, f64>>,
    /// Classification of every material.
    #[serde(default)]
    materials: HashMap<ResourceKey, MaterialRule>,
    /// Raw -> material conversions.
    #[serde(default)]
    refining: Vec<RefiningRule>,
    /// End-product recipes keyed by product type.
    #[serde(default)]
    recipes: HashMap<ResourceKey, Recipe>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a catalog from a TOML document.
    ///
    /// # Errors
    ///
    /// - `ConfigParse` if the document does not match the catalog schema
    /// - `InvalidConfig` if validation fails
    pub fn from_toml_str(source: &str) -> EconomyResult<Self> {
        let catalog: Self =
            toml::from_str(source).map_err(|e| EconomyError::ConfigParse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reads, parses and validates a catalog file.
    ///
    /// # Errors
    ///
    /// - `ConfigIo` if the file cannot be read
    /// - anything [`Catalog::from_toml_str`] returns
    pub fn load(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| EconomyError::ConfigIo {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Registers a capacity profile, replacing any profile with the same name.
    pub fn add_profile<I, K>(&mut self, name: impl Into<String>, capacities: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<ResourceKey>,
    {
        let table = capacities
            .into_iter()
            .map(|(key, max)| (key.into(), max))
            .collect();
        self.profiles.insert(name.into(), table);
    }

    /// Registers or replaces a material rule.
    pub fn add_material(&mut self, key: impl Into<ResourceKey>, rule: MaterialRule) {
        self.materials.insert(key.into(), rule);
    }

    /// Registers a refining rule.
    ///
    /// # Errors
    ///
    /// Returns error if a rule already produces the same output, or the batch
    /// sizes are zero.
    pub fn add_refining_rule(&mut self, rule: RefiningRule) -> EconomyResult<()> {
        check_refining_rule(&rule)?;
        if self.refining_rule_for(rule.output.as_str()).is_some() {
            return Err(EconomyError::InvalidConfig(format!(
                "Refining output {} already has a rule",
                rule.output
            )));
        }
        self.refining.push(rule);
        Ok(())
    }

    /// Registers a recipe for a product type.
    ///
    /// # Errors
    ///
    /// Returns error if the product already has a recipe or the recipe is
    /// malformed.
    pub fn add_recipe(
        &mut self,
        product: impl Into<ResourceKey>,
        recipe: Recipe,
    ) -> EconomyResult<()> {
        let product = product.into();
        if self.recipes.contains_key(&product) {
            return Err(EconomyError::InvalidConfig(format!(
                "Recipe for {product} already exists"
            )));
        }
        check_recipe(&product, &recipe)?;
        self.recipes.insert(product, recipe);
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Gets a capacity profile by name.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&HashMap<ResourceKey, f64>> {
        self.profiles.get(name)
    }

    /// Gets a material rule.
    #[must_use]
    pub fn material(&self, key: &str) -> Option<&MaterialRule> {
        self.materials.get(key)
    }

    /// Tech tier of a material, `0` for unclassified materials.
    #[must_use]
    pub fn material_tech_tier(&self, key: &str) -> u8 {
        self.materials.get(key).map_or(0, |m| m.tech_tier)
    }

    /// Gets the refining rule that produces a material.
    #[must_use]
    pub fn refining_rule_for(&self, output: &str) -> Option<&RefiningRule> {
        self.refining.iter().find(|r| r.output.as_str() == output)
    }

    /// Returns all refining rules.
    #[must_use]
    pub fn refining_rules(&self) -> &[RefiningRule] {
        &self.refining
    }

    /// Gets a recipe by product type.
    #[must_use]
    pub fn recipe(&self, product: &str) -> Option<&Recipe> {
        self.recipes.get(product)
    }

    /// Returns all recipes with their product types.
    pub fn recipes(&self) -> impl Iterator<Item = (&ResourceKey, &Recipe)> {
        self.recipes.iter()
    }

    /// Returns the number of recipes.
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks the whole catalog for configurations the economy cannot honor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> EconomyResult<()> {
        for (name, table) in &self.profiles {
            for (key, &max) in table {
                if !max.is_finite() || max <= 0.0 {
                    return Err(EconomyError::InvalidConfig(format!(
                        "Profile {name}: capacity for {key} must be positive, got {max}"
                    )));
                }
            }
        }

        for (key, rule) in &self.materials {
            if rule.tech_tier > MAX_TECH_TIER {
                return Err(EconomyError::InvalidConfig(format!(
                    "Material {key}: tech tier {} exceeds {MAX_TECH_TIER}",
                    rule.tech_tier
                )));
            }
        }

        let mut outputs = HashSet::new();
        for rule in &self.refining {
            check_refining_rule(rule)?;
            if !outputs.insert(rule.output.clone()) {
                return Err(EconomyError::InvalidConfig(format!(
                    "Refining output {} already has a rule",
                    rule.output
                )));
            }
            if !self.materials.contains_key(&rule.output) {
                return Err(EconomyError::InvalidConfig(format!(
                    "Refining output {} has no material rule",
                    rule.output
                )));
            }
        }

        if let Some(cycle) = self.find_refining_cycle() {
            let path: Vec<&str> = cycle.iter().map(ResourceKey::as_str).collect();
            return Err(EconomyError::InvalidConfig(format!(
                "Refining chain loops: {}",
                path.join(" -> ")
            )));
        }

        for (product, recipe) in &self.recipes {
            check_recipe(product, recipe)?;
            for requirement in &recipe.requirements {
                if !self.materials.contains_key(&requirement.material_type) {
                    warn!(
                        product = %product,
                        material = %requirement.material_type,
                        "recipe material has no material rule, tech tier defaults to 0"
                    );
                }
            }
        }

        Ok(())
    }

    /// Finds a refining chain that leads back to its own starting material.
    ///
    /// Such a loop would let stock be refined forever. Returns the materials
    /// along the loop, first and last equal.
    #[must_use]
    pub fn find_refining_cycle(&self) -> Option<Vec<ResourceKey>> {
        for start in &self.refining {
            let mut path = vec![start.output.clone()];
            let mut current = start.input.clone();
            // Each output has at most one rule, so a chain longer than the
            // rule count must repeat.
            for _ in 0..self.refining.len() {
                path.push(current.clone());
                if current == start.output {
                    path.reverse();
                    return Some(path);
                }
                match self.refining_rule_for(current.as_str()) {
                    Some(rule) => current = rule.input.clone(),
                    None => break,
                }
            }
        }
        None
    }
}

fn check_refining_rule(rule: &RefiningRule) -> EconomyResult<()> {
    if rule.input_per_batch == 0 || rule.output_per_batch == 0 {
        return Err(EconomyError::InvalidConfig(format!(
            "Refining {} -> {}: batch sizes must be non-zero",
            rule.input, rule.output
        )));
    }
    if rule.input == rule.output {
        return Err(EconomyError::InvalidConfig(format!(
            "Refining {}: input and output are the same",
            rule.input
        )));
    }
    Ok(())
}

fn check_recipe(product: &ResourceKey, recipe: &Recipe) -> EconomyResult<()> {
    if recipe.requirements.is_empty() {
        return Err(EconomyError::InvalidConfig(format!(
            "Recipe {product} has no requirements"
        )));
    }
    if recipe.tech_tier > MAX_TECH_TIER {
        return Err(EconomyError::InvalidConfig(format!(
            "Recipe {product}: tech tier {} exceeds {MAX_TECH_TIER}",
            recipe.tech_tier
        )));
    }
    for requirement in &recipe.requirements {
        if requirement.quantity_required == 0 {
            return Err(EconomyError::InvalidConfig(format!(
                "Recipe {product}: {} requires zero units",
                requirement.material_type
            )));
        }
        if requirement.min_quality > MAX_QUALITY {
            return Err(EconomyError::InvalidConfig(format!(
                "Recipe {product}: min quality {} for {} exceeds {MAX_QUALITY}",
                requirement.min_quality, requirement.material_type
            )));
        }
    }
    Ok(())
}
