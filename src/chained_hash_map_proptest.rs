#![cfg(test)]

// Property tests for ChainedHashMap kept inside the crate so they can check
// bucket bookkeeping through the test-only accessors.

use crate::chained_hash_map::ChainedHashMap;
use crate::error::Error;
use crate::policy::hash_str;
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

// Pool-indexed operations so shrinking moves toward earlier keys and shorter
// op lists.
#[derive(Clone, Debug)]
enum OpI {
    Upsert(usize, i32),
    Remove(usize),
    At(usize),
    Mutate(usize, i32),
    MoveOut(usize),
    Rehash(usize),
    Clear,
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=10).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Upsert(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::At),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => idx.clone().prop_map(OpI::MoveOut),
            1 => (0usize..200).prop_map(OpI::Rehash),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn check_bookkeeping<K, V>(m: &ChainedHashMap<K, V>) -> Result<(), TestCaseError> {
    let lens = m.chain_lens();
    prop_assert_eq!(lens.iter().sum::<usize>(), m.len());
    prop_assert_eq!(lens.len(), m.capacity());
    let mut seen = vec![false; lens.len()];
    for b in m.occupied_buckets() {
        prop_assert!(!seen[b], "bucket {} listed twice", b);
        seen[b] = true;
        prop_assert!(lens[b] > 0);
    }
    let listed = seen.iter().filter(|&&s| s).count();
    let non_empty = lens.iter().filter(|&&n| n > 0).count();
    prop_assert_eq!(listed, non_empty);
    prop_assert!(m.positions_match(), "occupied back-references out of step");
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Only `update_or_insert` adds entries, so keys stay unique and the model
// applies. Invariants exercised after every op:
// - `len` and lookups match the model; missing keys report `MissingKey`.
// - Every non-empty bucket is in the occupied index exactly once.
// - Each listed bucket's recorded slot points back at it.
// - Destructor runs equal removals + clears; `move_kv` runs none.
// - `rehash` keeps every entry and honors the requested minimum.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut: ChainedHashMap<String, i32> =
            ChainedHashMap::new(2, |k: &String| hash_str(k)).unwrap();
        let destroyed = Rc::new(Cell::new(0usize));
        let d = destroyed.clone();
        sut.set_kv_destructor_fn(move |_| d.set(d.get() + 1));
        let mut model: HashMap<String, i32> = HashMap::new();
        let mut expected_destroyed = 0usize;

        for op in ops {
            match op {
                OpI::Upsert(i, v) => {
                    let k = pool[i].clone();
                    sut.update_or_insert(&k, &v).unwrap();
                    model.insert(k, v);
                }
                OpI::Remove(i) => {
                    let k = &pool[i];
                    match sut.remove(k) {
                        Ok(()) => {
                            prop_assert!(model.remove(k).is_some());
                            expected_destroyed += 1;
                        }
                        Err(e) => {
                            prop_assert_eq!(e, Error::MissingKey);
                            prop_assert!(!model.contains_key(k));
                        }
                    }
                }
                OpI::At(i) => {
                    let k = &pool[i];
                    match model.get(k) {
                        Some(v) => prop_assert_eq!(sut.at(k).unwrap(), v),
                        None => prop_assert_eq!(sut.at(k).unwrap_err(), Error::MissingKey),
                    }
                    prop_assert_eq!(sut.contains_key(k), model.contains_key(k));
                }
                OpI::Mutate(i, delta) => {
                    let k = &pool[i];
                    if let Some(mv) = model.get_mut(k) {
                        *mv = mv.wrapping_add(delta);
                        let sv = sut.at_mut(k).unwrap();
                        *sv = sv.wrapping_add(delta);
                    } else {
                        prop_assert!(sut.at_mut(k).is_err());
                    }
                }
                OpI::MoveOut(i) => {
                    let k = &pool[i];
                    match (sut.move_kv(k), model.remove(k)) {
                        (Ok(kv), Some(v)) => {
                            prop_assert_eq!(&*kv.key, k);
                            prop_assert_eq!(*kv.value, v);
                        }
                        (Err(Error::MissingKey), None) => {}
                        (got, want) => {
                            let got = got.map(|kv| *kv.value);
                            prop_assert!(false, "move_kv {:?} vs model {:?}", got, want);
                        }
                    }
                }
                OpI::Rehash(min) => {
                    // Stop growing once the table is large; shrink instead.
                    let min = if sut.capacity() > 1000 { min.max(1) } else { min };
                    let before = sut.capacity();
                    sut.rehash(min).unwrap();
                    if min == 0 {
                        prop_assert!(sut.capacity() > before);
                    } else {
                        prop_assert!(sut.capacity() >= min);
                    }
                }
                OpI::Clear => {
                    expected_destroyed += model.len();
                    model.clear();
                    sut.clear();
                }
                OpI::Iterate => {
                    let mut got: Vec<(String, i32)> =
                        sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    got.sort();
                    let mut want: Vec<(String, i32)> =
                        model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    want.sort();
                    prop_assert_eq!(got, want);
                }
            }
            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(destroyed.get(), expected_destroyed);
            check_bookkeeping(&sut)?;
        }
    }
}

// Property: rehash preserves the multiset of entries, duplicates included,
// for any sequence of target capacities.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_rehash_preserves_multiset(
        entries in proptest::collection::vec((0u16..64, any::<u8>()), 0..120),
        targets in proptest::collection::vec(0usize..500, 1..6),
    ) {
        let mut m: ChainedHashMap<u16, u8> =
            ChainedHashMap::new(5, |k: &u16| u64::from(*k)).unwrap();
        for (k, v) in &entries {
            m.insert(k, v).unwrap();
        }
        let mut want = entries.clone();
        want.sort();

        for t in targets {
            m.rehash(t).unwrap();
            let mut got: Vec<(u16, u8)> = m.iter().map(|(k, v)| (*k, *v)).collect();
            got.sort();
            prop_assert_eq!(&got, &want);
            prop_assert_eq!(m.len(), entries.len());
            check_bookkeeping(&m)?;
        }
    }
}

// Property: total_collisions equals entries minus occupied buckets, and
// max_collisions is the longest chain minus one.
proptest! {
    #[test]
    fn prop_collision_stats(keys in proptest::collection::vec(0u64..1000, 0..100)) {
        let mut m: ChainedHashMap<u64, u64> = ChainedHashMap::new(11, |k: &u64| *k).unwrap();
        for k in &keys {
            m.insert(k, k).unwrap();
        }
        let mut per_bucket = [0usize; 11];
        for k in &keys {
            per_bucket[(*k % 11) as usize] += 1;
        }
        let occupied = per_bucket.iter().filter(|&&n| n > 0).count();
        prop_assert_eq!(m.total_collisions(), keys.len() - occupied);
        let longest = per_bucket.iter().copied().max().unwrap_or(0);
        prop_assert_eq!(m.max_collisions(), longest.saturating_sub(1));
    }
}
