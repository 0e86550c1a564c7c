//! Property tests for the ledger's capacity and reservation invariants.

use foundry_economy::Container;
use proptest::prelude::*;

const CAPACITY: f64 = 500.0;

/// One ledger call with arbitrary arguments.
#[derive(Clone, Debug)]
enum Op {
    Add(f64),
    Remove(f64),
    Reserve(f64),
    Cancel(f64),
    Commit(f64),
}

fn amount() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => 0.0..200.0f64,
        1 => -50.0..0.0f64,
        1 => Just(0.0),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        amount().prop_map(Op::Add),
        amount().prop_map(Op::Remove),
        amount().prop_map(Op::Reserve),
        amount().prop_map(Op::Cancel),
        amount().prop_map(Op::Commit),
    ]
}

fn apply(store: &mut Container, op: &Op) {
    match *op {
        Op::Add(a) => {
            store.add("Wood", a);
        }
        Op::Remove(a) => {
            store.remove("Wood", a);
        }
        Op::Reserve(a) => {
            store.reserve("Wood", a);
        }
        Op::Cancel(a) => store.cancel_reservation("Wood", a),
        Op::Commit(a) => {
            store.commit_reservation("Wood", a);
        }
    }
}

proptest! {
    #[test]
    fn prop_stock_stays_within_bounds(ops in prop::collection::vec(op(), 0..64)) {
        let mut store = Container::with_capacities([("Wood", CAPACITY)]);
        for op in &ops {
            apply(&mut store, op);
            let stored = store.stored("Wood");
            let reserved = store.reserved("Wood");
            prop_assert!(stored >= 0.0 && stored <= CAPACITY, "stored {stored}");
            prop_assert!(reserved >= 0.0 && reserved <= stored, "reserved {reserved} of {stored}");
            prop_assert!(store.space("Wood") >= 0.0);
        }
    }

    #[test]
    fn prop_accepted_never_exceeds_request_or_space(
        first in 0.0..600.0f64,
        second in 0.0..600.0f64,
    ) {
        let mut store = Container::with_capacities([("Wood", CAPACITY)]);
        let a = store.add("Wood", first);
        let b = store.add("Wood", second);
        prop_assert!(a <= first && b <= second);
        prop_assert!((store.stored("Wood") - (a + b)).abs() < 1e-9);
        prop_assert!(store.stored("Wood") <= CAPACITY);
    }

    #[test]
    fn prop_reservations_never_double_allocate(
        stock in 1.0..CAPACITY,
        claims in prop::collection::vec(0.1..100.0f64, 1..16),
    ) {
        let mut store = Container::with_capacities([("Wood", CAPACITY)]);
        store.add("Wood", stock);

        let granted: f64 = claims
            .iter()
            .filter(|&&claim| store.reserve("Wood", claim))
            .sum();

        prop_assert!(granted <= stock + 1e-9);
        prop_assert!((store.reserved("Wood") - granted).abs() < 1e-9);
    }

    #[test]
    fn prop_remove_leaves_reserved_stock(
        stock in 1.0..CAPACITY,
        share in 0.0..1.0f64,
        request in 0.0..600.0f64,
    ) {
        let mut store = Container::with_capacities([("Wood", CAPACITY)]);
        store.add("Wood", stock);
        let held = stock * share;
        if held > 0.0 {
            prop_assert!(store.reserve("Wood", held));
        }

        store.remove("Wood", request);
        prop_assert!(store.stored("Wood") >= store.reserved("Wood"));
        prop_assert!((store.reserved("Wood") - held.max(0.0)).abs() < 1e-9);
    }

    #[test]
    fn prop_add_then_remove_restores_stock(initial in 0.0..250.0f64, delta in 0.001..250.0f64) {
        let mut store = Container::with_capacities([("Wood", CAPACITY)]);
        if initial > 0.0 {
            store.add("Wood", initial);
        }
        let before = store.stored("Wood");

        let accepted = store.add("Wood", delta);
        let removed = store.remove("Wood", accepted);

        prop_assert_eq!(accepted, removed);
        prop_assert!((store.stored("Wood") - before).abs() < 1e-9);
    }
}
