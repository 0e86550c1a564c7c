//! # FOUNDRY Economy System
//!
//! Pure Rust resource economy for the FOUNDRY simulation.
//!
//! ## Design Principles
//!
//! 1. **Reservation-aware stock** - Claims on stock are tracked separately from stock itself
//! 2. **Transactional production** - All-or-nothing refining and crafting
//! 3. **Deterministic** - No hidden randomness; same inputs = same outputs
//! 4. **External configuration** - All balance data in TOML files
//!
//! ## Thread Safety
//!
//! Every type here is plain owned data mutated through `&mut self`. Distinct
//! containers share nothing, so a host may process them in parallel.
//!
//! ## Example
//!
//! ```rust
//! use foundry_economy::{Catalog, Container, CraftSource, ProductionPipeline};
//!
//! let catalog = Catalog::from_toml_str(r#"
//!     [materials.Plank]
//!     tech_tier = 1
//!
//!     [recipes.Chair]
//!     name = "Chair"
//!     requirements = [{ material_type = "Plank", quantity_required = 4 }]
//! "#).unwrap();
//!
//! let mut workshop = Container::with_capacities([("Plank", 50.0)]);
//! workshop.add("Plank", 10.0);
//!
//! let pipeline = ProductionPipeline::new(&catalog);
//! let chair = pipeline
//!     .craft("Chair", &mut [CraftSource::new(1, &mut workshop)], 2, 50)
//!     .unwrap();
//!
//! assert_eq!(chair.name, "Chair");
//! assert_eq!(workshop.stored("Plank"), 6.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod quality;
pub mod resource;

pub use catalog::{Catalog, ComponentRequirement, MaterialRule, Recipe, RefiningRule};
pub use error::{EconomyError, EconomyResult};
pub use ledger::{Claim, Container, InventoryEntry};
pub use pipeline::{
    refined_yield, CraftSource, EndProduct, ExtractedResource, ExtractionOutcome,
    ProducedMaterial, ProductionPipeline,
};
pub use pool::{AccumulatorPool, ConsumptionRequest, GeneratorId, PoolConfig, RequestId, TickReport};
pub use quality::{CraftContext, MaterialInput, QualityOutcome, QualityStrategy, WeightedAverage};
pub use resource::{EntityId, Rarity, ResourceKey};
