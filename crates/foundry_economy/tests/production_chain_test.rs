//! Integration tests for the full Extraction -> Refining -> Crafting chain.

use foundry_economy::{
    Catalog, Container, CraftContext, CraftSource, EconomyError, ExtractedResource,
    ProductionPipeline, QualityOutcome, QualityStrategy, Rarity, ResourceKey,
};

const CATALOG_TOML: &str = r#"
[profiles.mine]
IronOre = 1000.0

[profiles.smelter]
IronOre = 400.0
IronIngot = 200.0

[profiles.armory]
IronIngot = 100.0
Leather = 50.0

[materials.IronIngot]
rarity = "Uncommon"
tech_tier = 2

[materials.Leather]
rarity = "Common"
tech_tier = 1

[[refining]]
input = "IronOre"
output = "IronIngot"
input_per_batch = 2
output_per_batch = 1

[recipes.IronSword]
name = "Iron Sword"
tech_tier = 3
requirements = [
    { material_type = "IronIngot", quantity_required = 6, min_quality = 50 },
    { material_type = "Leather", quantity_required = 2 },
]

[recipes.KnightsBlade]
name = "Knight's Blade"
tech_tier = 4
requirements = [
    { material_type = "IronIngot", quantity_required = 4, min_rarity = "Rare" },
]
"#;

fn catalog() -> Catalog {
    Catalog::from_toml_str(CATALOG_TOML).expect("catalog should parse")
}

fn ore_event(purity: u8, quantity: u16) -> ExtractedResource {
    ExtractedResource {
        resource_type: ResourceKey::new("IronOre"),
        purity,
        quantity,
        source_producer_ref: 100,
    }
}

#[test]
fn test_catalog_loads_from_file() {
    let path = std::env::temp_dir().join(format!("foundry_catalog_{}.toml", std::process::id()));
    std::fs::write(&path, CATALOG_TOML).unwrap();

    let loaded = Catalog::load(&path);
    std::fs::remove_file(&path).unwrap();

    let loaded = loaded.unwrap();
    assert_eq!(loaded, catalog());
    assert_eq!(loaded.recipe_count(), 2);
    assert_eq!(loaded.material_tech_tier("IronIngot"), 2);
}

#[test]
fn test_catalog_rejects_refining_loop() {
    let looping = r#"
        [materials.Slag]
        [materials.Ore]

        [[refining]]
        input = "Ore"
        output = "Slag"
        input_per_batch = 1
        output_per_batch = 1

        [[refining]]
        input = "Slag"
        output = "Ore"
        input_per_batch = 1
        output_per_batch = 1
    "#;
    assert!(matches!(
        Catalog::from_toml_str(looping),
        Err(EconomyError::InvalidConfig(_))
    ));
}

#[test]
fn test_extract_refine_craft_chain() {
    let catalog = catalog();
    let pipeline = ProductionPipeline::new(&catalog);

    let mut mine = Container::from_profile(&catalog, "mine").unwrap();
    let mut smelter = Container::from_profile(&catalog, "smelter").unwrap();
    let mut armory = Container::from_profile(&catalog, "armory").unwrap();

    // 100 raw at 69% purity -> 69 units of graded ore.
    let outcome = pipeline.extract(&ore_event(69, 100), &mut mine);
    assert_eq!(outcome.yielded, 69);
    assert_eq!(mine.stored("IronOre"), 69.0);

    // 10 batches consume 20 ore and yield 10 ingots at the ore's quality.
    let ingots = pipeline
        .refine(&mut mine, &mut smelter, "IronIngot", 10, 200)
        .unwrap();
    assert_eq!(ingots.quantity, 10);
    assert_eq!(ingots.quality, 69);
    assert_eq!(ingots.rarity, Rarity::Uncommon);
    assert_eq!(mine.stored("IronOre"), 49.0);
    assert_eq!(smelter.stored("IronIngot"), 10.0);

    armory.deposit("Leather", 5.0, 45, Rarity::Common);

    let mut sources = [
        CraftSource::new(2, &mut smelter),
        CraftSource::new(3, &mut armory),
    ];
    let sword = pipeline.craft("IronSword", &mut sources, 300, 50).unwrap();

    // (6*69 + 2*45) / 8 = 63
    assert_eq!(sword.quality, 63);
    assert_eq!(sword.rarity, Rarity::Rare);
    assert_eq!(sword.tech_tier, 3);
    assert_eq!(sword.crafter_ref, 300);
    assert_eq!(smelter.stored("IronIngot"), 4.0);
    assert_eq!(armory.stored("Leather"), 3.0);
}

#[test]
fn test_craft_splits_across_containers() {
    let catalog = catalog();
    let pipeline = ProductionPipeline::new(&catalog);

    let mut left = Container::from_profile(&catalog, "armory").unwrap();
    let mut right = Container::from_profile(&catalog, "armory").unwrap();
    left.deposit("IronIngot", 4.0, 60, Rarity::Uncommon);
    right.deposit("IronIngot", 10.0, 80, Rarity::Uncommon);
    right.add("Leather", 2.0);

    let mut sources = [CraftSource::new(10, &mut left), CraftSource::new(20, &mut right)];
    let sword = pipeline.craft("IronSword", &mut sources, 1, 50).unwrap();

    let ingot_slices: Vec<_> = sword
        .inputs
        .iter()
        .filter(|i| i.material_type.as_str() == "IronIngot")
        .map(|i| (i.material_ref, i.quantity_used, i.quality_used))
        .collect();
    assert_eq!(ingot_slices, vec![(10, 4, 60), (20, 2, 80)]);

    assert_eq!(left.stored("IronIngot"), 0.0);
    assert_eq!(right.stored("IronIngot"), 8.0);
    assert_eq!(right.stored("Leather"), 0.0);
}

#[test]
fn test_failed_craft_leaves_every_container_untouched() {
    let catalog = catalog();
    let pipeline = ProductionPipeline::new(&catalog);

    let mut left = Container::from_profile(&catalog, "armory").unwrap();
    let mut right = Container::from_profile(&catalog, "armory").unwrap();
    left.deposit("IronIngot", 3.0, 70, Rarity::Uncommon);
    right.deposit("IronIngot", 5.0, 70, Rarity::Uncommon);
    assert!(right.reserve("IronIngot", 1.5));
    // No leather anywhere.

    let left_before = left.clone();
    let right_before = right.clone();

    let mut sources = [CraftSource::new(1, &mut left), CraftSource::new(2, &mut right)];
    let result = pipeline.craft("IronSword", &mut sources, 1, 50);

    match result {
        Err(EconomyError::RequirementUnmet { material, found, .. }) => {
            assert_eq!(material.as_str(), "Leather");
            assert_eq!(found, 0.0);
        }
        other => panic!("expected RequirementUnmet, got {other:?}"),
    }
    assert_eq!(left, left_before);
    assert_eq!(right, right_before);
}

#[test]
fn test_rarity_floor_gates_stacks() {
    let catalog = catalog();
    let pipeline = ProductionPipeline::new(&catalog);

    let mut common = Container::from_profile(&catalog, "armory").unwrap();
    let mut rare = Container::from_profile(&catalog, "armory").unwrap();
    common.deposit("IronIngot", 20.0, 90, Rarity::Uncommon);
    rare.deposit("IronIngot", 4.0, 65, Rarity::Rare);

    assert!(pipeline.can_craft("KnightsBlade", &[&common]).is_err());
    assert!(pipeline.can_craft("KnightsBlade", &[&common, &rare]).is_ok());

    let mut sources = [CraftSource::new(1, &mut common), CraftSource::new(2, &mut rare)];
    let blade = pipeline.craft("KnightsBlade", &mut sources, 9, 50).unwrap();
    assert!(blade.inputs.iter().all(|i| i.material_ref == 2));
    assert_eq!(blade.quality, 65);
    assert_eq!(common.stored("IronIngot"), 20.0);
    assert_eq!(rare.stored("IronIngot"), 0.0);
}

#[test]
fn test_repeated_crafts_until_exhausted() {
    let catalog = catalog();
    let pipeline = ProductionPipeline::new(&catalog);

    let mut armory = Container::from_profile(&catalog, "armory").unwrap();
    armory.deposit("IronIngot", 13.0, 60, Rarity::Uncommon);
    armory.add("Leather", 10.0);

    let mut crafted = 0;
    loop {
        let mut sources = [CraftSource::new(1, &mut armory)];
        if pipeline.craft("IronSword", &mut sources, 1, 50).is_err() {
            break;
        }
        crafted += 1;
    }

    assert_eq!(crafted, 2);
    assert_eq!(armory.stored("IronIngot"), 1.0);
    assert_eq!(armory.stored("Leather"), 6.0);
    assert_eq!(armory.reserved("IronIngot"), 0.0);
    assert_eq!(armory.reserved("Leather"), 0.0);
}

/// Grades every product at a fixed quality, ignoring its inputs.
struct FlatGrade(u8);

impl QualityStrategy for FlatGrade {
    fn refined_quality(&self, _source_quality: u8) -> u8 {
        self.0
    }

    fn crafted(&self, context: &CraftContext<'_>) -> QualityOutcome {
        QualityOutcome {
            quality: self.0,
            rarity: Rarity::from_quality(self.0),
            tech_tier: context.recipe_tech_tier,
        }
    }
}

#[test]
fn test_quality_strategy_is_swappable() {
    let catalog = catalog();
    let pipeline = ProductionPipeline::with_strategy(&catalog, FlatGrade(97));

    let mut smelter = Container::from_profile(&catalog, "smelter").unwrap();
    smelter.deposit("IronOre", 10.0, 20, Rarity::Common);

    let ingots = pipeline.refine_in_place(&mut smelter, "IronIngot", 5, 1).unwrap();
    assert_eq!(ingots.quality, 97);

    let mut armory = Container::from_profile(&catalog, "armory").unwrap();
    armory.deposit("IronIngot", 6.0, 55, Rarity::Uncommon);
    armory.add("Leather", 2.0);
    let mut sources = [CraftSource::new(1, &mut armory)];
    let sword = pipeline.craft("IronSword", &mut sources, 1, 0).unwrap();
    assert_eq!(sword.quality, 97);
    assert_eq!(sword.rarity, Rarity::Legendary);
}

#[test]
fn test_identical_runs_are_bit_identical() {
    fn run() -> (Vec<u64>, u8) {
        let catalog = catalog();
        let pipeline = ProductionPipeline::new(&catalog);
        let mut mine = Container::from_profile(&catalog, "mine").unwrap();
        let mut smelter = Container::from_profile(&catalog, "smelter").unwrap();

        for (purity, qty) in [(69, 100), (33, 17), (91, 250)] {
            pipeline.extract(&ore_event(purity, qty), &mut mine);
        }
        mine.remove("IronOre", 0.1);
        mine.reserve("IronOre", 1.7);
        let ingots = pipeline
            .refine(&mut mine, &mut smelter, "IronIngot", 30, 1)
            .unwrap();

        let bits = vec![
            mine.stored("IronOre").to_bits(),
            mine.reserved("IronOre").to_bits(),
            smelter.stored("IronIngot").to_bits(),
        ];
        (bits, ingots.quality)
    }

    assert_eq!(run(), run());
}
