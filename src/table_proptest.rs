#![cfg(test)]

// Property tests for Table kept inside the crate so they do not require
// feature gates to access the private module.

use crate::heap::{Heap, StrRef, StringHeap};
use crate::key::{LazyKey, StringTableKey};
use crate::shape::{Shape, StringTableShape};
use crate::table::{Table, TableConfig};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::HashMap;

/// String-table semantics, optionally forcing every key onto one probe chain.
struct ProbeShape<const COLLIDE: bool>;

impl<const COLLIDE: bool> Shape for ProbeShape<COLLIDE> {
    type Key<'k> = StringTableKey<'k>;
    type Entry = StrRef;

    fn hash<H>(heap: &H, key: &StringTableKey<'_>) -> u32
    where
        H: Heap + ?Sized,
    {
        if COLLIDE {
            0
        } else {
            StringTableShape::hash(heap, key)
        }
    }

    fn hash_for_entry<H>(heap: &H, entry: StrRef) -> Option<u32>
    where
        H: Heap + ?Sized,
    {
        if COLLIDE {
            heap.get(entry).map(|_| 0)
        } else {
            StringTableShape::hash_for_entry(heap, entry)
        }
    }

    fn is_match<H>(heap: &H, key: &StringTableKey<'_>, entry: StrRef) -> bool
    where
        H: Heap + ?Sized,
    {
        StringTableShape::is_match(heap, key, entry)
    }
}

// Pool-indexed operations so shrinking moves toward earlier strings.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize),
    Delete(usize),
    Find(usize),
    Reclaim(usize),
    ClearReclaimed,
    Shrink,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::hash_set("[a-z]{0,4}", 1..=12).prop_flat_map(|pool| {
        let pool: Vec<String> = pool.into_iter().collect();
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => idx.clone().prop_map(Op::Insert),
            2 => idx.clone().prop_map(Op::Delete),
            2 => idx.clone().prop_map(Op::Find),
            1 => idx.prop_map(Op::Reclaim),
            1 => Just(Op::ClearReclaimed),
            1 => Just(Op::Shrink),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn lazy(s: &str) -> StringTableKey<'_> {
    StringTableKey::Lazy(LazyKey::one_byte(s.as_bytes()))
}

// State-machine equivalence against a HashMap of live canonical strings.
// Invariants exercised after every operation:
// - insert is idempotent and returns the model's canonical entry on a hit;
// - find agrees with the model and never changes the bookkeeping;
// - live + deleted stays strictly below capacity;
// - the live entries reachable by iteration are exactly the model's.
fn run<const COLLIDE: bool>(pool: Vec<String>, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut heap = StringHeap::new();
    let config = TableConfig::default().with_initial_capacity(4);
    let mut sut: Table<ProbeShape<COLLIDE>> = Table::new(&mut heap, config).expect("unbounded heap");
    let mut model: HashMap<String, StrRef> = HashMap::new();

    for op in ops {
        match op {
            Op::Insert(i) => {
                let key = lazy(&pool[i]);
                let already = model.get(&pool[i]).copied();
                let (entry, inserted) = sut
                    .find_or_insert_with(&mut heap, &key, |h| key.materialize(h))
                    .expect("unbounded heap");
                prop_assert_eq!(inserted, already.is_none());
                if let Some(existing) = already {
                    prop_assert_eq!(entry, existing);
                }
                model.insert(pool[i].clone(), entry);
            }
            Op::Delete(i) => {
                let key = lazy(&pool[i]);
                match model.remove(&pool[i]) {
                    Some(r) => {
                        let idx = sut.find(&heap, &key).expect("present in model");
                        prop_assert_eq!(sut.delete(idx), Some(r));
                    }
                    None => prop_assert!(sut.find(&heap, &key).is_none()),
                }
            }
            Op::Find(i) => {
                let key = lazy(&pool[i]);
                let found = sut.find(&heap, &key).and_then(|idx| sut.entry(idx));
                prop_assert_eq!(found, model.get(&pool[i]).copied());
            }
            Op::Reclaim(i) => {
                if let Some(r) = model.remove(&pool[i]) {
                    prop_assert!(heap.reclaim(r));
                }
            }
            Op::ClearReclaimed => {
                sut.clear_reclaimed(&heap);
                prop_assert_eq!(sut.len(), model.len());
            }
            Op::Shrink => {
                sut.shrink(&mut heap).expect("unbounded heap");
                prop_assert_eq!(sut.len(), model.len());
                prop_assert_eq!(sut.deleted(), 0);
            }
        }

        // Lookups are pure.
        let before = sut.stats();
        for s in &pool {
            let key = lazy(s);
            let found = sut.find(&heap, &key).and_then(|idx| sut.entry(idx));
            prop_assert_eq!(found, model.get(s).copied());
        }
        prop_assert_eq!(sut.stats(), before);

        prop_assert!(before.len + before.deleted < before.capacity);
        prop_assert!(before.len >= model.len());
        let live = sut
            .iter()
            .filter(|&r| ProbeShape::<COLLIDE>::is_live(&heap, r))
            .count();
        prop_assert_eq!(live, model.len());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run::<false>(pool, ops)?;
    }

    // Same invariants with every key on a single chain, stressing equality
    // resolution and tombstone handling.
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run::<true>(pool, ops)?;
    }
}
