// ChainedHashMap integration suite.
//
// Each test documents the behavior verified and the invariants it relies
// on. Core invariants exercised:
// - Lookup: every inserted key is found with its value; absent keys report
//   MissingKey without side effects.
// - Copy policies: stored entries are copies made by the installed policy,
//   never aliases of the caller's data when a deep-copy policy is set.
// - Destruction: remove/clear/drop run the destructor policy once per
//   entry; move-out operations never do.
// - Rehash: capacity changes keep the full multiset of entries.
use bedrock::policy::{hash_str, hash_usize};
use bedrock::{ChainedHashMap, Error, KeyValue, PolicySet};
use std::cell::Cell;
use std::rc::Rc;

const NAMES: [(&str, &str); 7] = [
    ("John", "Smith"),
    ("Stacy", "Jones"),
    ("Bob", "Ogden"),
    ("Tammera", "Trilby"),
    ("Joseph", "Connor"),
    ("James", "Hammond"),
    ("Alexis", "Wolner"),
];

fn deep_copy(s: &Rc<str>) -> Result<Rc<str>, Error> {
    Ok(Rc::from(&**s))
}

fn string_map(destroyed: Rc<Cell<usize>>) -> ChainedHashMap<Rc<str>, Rc<str>> {
    let mut policies: PolicySet<Rc<str>, Rc<str>> = PolicySet::new(|k: &Rc<str>| hash_str(k));
    policies.set_key_eq_fn(|a, b| **a == **b);
    policies.set_key_cpy_fn(deep_copy);
    policies.set_value_cpy_fn(deep_copy);
    policies.set_kv_destructor_fn(move |_kv| destroyed.set(destroyed.get() + 1));
    ChainedHashMap::with_policies(16, policies).expect("init")
}

// Test: 10,000 integer keys with identity values.
// Verifies: every key maps back to itself; collisions stay consistent.
#[test]
fn ten_thousand_usize_keys() {
    let mut m: ChainedHashMap<usize, usize> = ChainedHashMap::new(1000, hash_usize).unwrap();
    for k in 0..10_000 {
        m.insert(&k, &k).unwrap();
    }
    assert_eq!(m.len(), 10_000);
    for k in 0..10_000 {
        assert_eq!(*m.at(&k).unwrap(), k);
    }
    assert_eq!(m.iter().count(), 10_000);
    // 10,000 keys over 1009 buckets must share buckets.
    assert!(m.total_collisions() >= 10_000 - m.capacity());
    assert!(m.max_collisions() >= 1);
}

// Test: string map with deep-copy policies.
// Assumes: copy policies allocate fresh strings.
// Verifies: values are content-equal to the originals but not aliases,
// lookups compare content, and absent keys report MissingKey.
#[test]
fn string_map_deep_copies() {
    let destroyed = Rc::new(Cell::new(0));
    let mut m = string_map(destroyed.clone());
    let pairs: Vec<(Rc<str>, Rc<str>)> = NAMES
        .iter()
        .map(|&(k, v)| (Rc::from(k), Rc::from(v)))
        .collect();
    for (k, v) in &pairs {
        m.insert(k, v).unwrap();
    }

    for (k, v) in pairs.iter().rev() {
        let got = m.at(k).unwrap();
        assert_eq!(**got, **v);
        assert!(!Rc::ptr_eq(got, v), "value was aliased, not copied");
    }

    // A separately allocated key with the same content.
    let lookup: Rc<str> = Rc::from(String::from("Joseph"));
    assert_eq!(&**m.at(&lookup).unwrap(), "Connor");

    let missing: Rc<str> = Rc::from("lemon");
    assert_eq!(m.at(&missing).unwrap_err(), Error::MissingKey);
    assert_eq!(m.at(&missing).unwrap_err().code(), "MISSING_KEY");

    drop(m);
    assert_eq!(destroyed.get(), NAMES.len());
}

// Test: the default copy for Rc shares the allocation.
// Verifies: without a copy policy, stored values alias the caller's.
#[test]
fn default_copy_shares_rc() {
    let mut m: ChainedHashMap<Rc<str>, Rc<str>> =
        ChainedHashMap::new(5, |k: &Rc<str>| hash_str(k)).unwrap();
    let k: Rc<str> = Rc::from("k");
    let v: Rc<str> = Rc::from("v");
    m.insert(&k, &v).unwrap();
    assert!(Rc::ptr_eq(m.at(&k).unwrap(), &v));
    assert_eq!(Rc::strong_count(&v), 2);
    drop(m);
    assert_eq!(Rc::strong_count(&v), 1);
}

// Test: remove semantics.
// Verifies: absent key leaves count unchanged; present key decrements by
// one and subsequent lookups miss; the destructor runs once.
#[test]
fn remove_semantics() {
    let destroyed = Rc::new(Cell::new(0));
    let mut m = string_map(destroyed.clone());
    for &(k, v) in &NAMES {
        m.insert(&Rc::from(k), &Rc::from(v)).unwrap();
    }
    let before: Vec<(String, String)> = sorted_pairs(&m);

    assert_eq!(m.remove(&Rc::from("lemon")).unwrap_err(), Error::MissingKey);
    assert_eq!(m.len(), NAMES.len());
    assert_eq!(sorted_pairs(&m), before);
    assert_eq!(destroyed.get(), 0);

    m.remove(&Rc::from("Bob")).unwrap();
    assert_eq!(m.len(), NAMES.len() - 1);
    assert_eq!(m.at(&Rc::from("Bob")).unwrap_err(), Error::MissingKey);
    assert_eq!(destroyed.get(), 1);
}

fn sorted_pairs(m: &ChainedHashMap<Rc<str>, Rc<str>>) -> Vec<(String, String)> {
    let mut v: Vec<(String, String)> = m
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    v.sort();
    v
}

// Test: update_or_insert versus insert.
// Verifies: update on a present key keeps count; on an absent key it adds
// one entry; insert of an existing key adds a duplicate.
#[test]
fn update_or_insert_counts() {
    let mut m: ChainedHashMap<usize, usize> = ChainedHashMap::new(11, hash_usize).unwrap();
    m.update_or_insert(&1, &10).unwrap();
    assert_eq!(m.len(), 1);
    m.update_or_insert(&1, &20).unwrap();
    assert_eq!(m.len(), 1);
    assert_eq!(*m.at(&1).unwrap(), 20);

    m.insert(&1, &30).unwrap();
    assert_eq!(m.len(), 2);
    let ones = m.iter().filter(|(k, _)| **k == 1).count();
    assert_eq!(ones, 2);
}

// Test: rehash round trip with deep-copy policies installed.
// Verifies: no copy or destructor runs and every pair survives.
#[test]
fn rehash_keeps_string_entries() {
    let destroyed = Rc::new(Cell::new(0));
    let mut m = string_map(destroyed.clone());
    for &(k, v) in &NAMES {
        m.insert(&Rc::from(k), &Rc::from(v)).unwrap();
    }
    let before = sorted_pairs(&m);
    let cap = m.capacity();
    m.rehash(0).unwrap();
    assert!(m.capacity() > cap);
    assert_eq!(sorted_pairs(&m), before);
    m.rehash(2).unwrap();
    assert_eq!(m.capacity(), 2);
    assert_eq!(sorted_pairs(&m), before);
    assert_eq!(destroyed.get(), 0);
    assert!(m.rehash(ChainedHashMap::<Rc<str>, Rc<str>>::max_capacity() + 1).is_err());
    assert_eq!(sorted_pairs(&m), before);
}

// Test: collect and move-out APIs.
// Verifies: cpy_collect leaves the map intact; mv_collect empties it
// without destruction; the collected pairs own their data.
#[test]
fn collect_and_move_out() {
    let destroyed = Rc::new(Cell::new(0));
    let mut m = string_map(destroyed.clone());
    for &(k, v) in &NAMES {
        m.insert(&Rc::from(k), &Rc::from(v)).unwrap();
    }

    let copies = m.cpy_collect().unwrap();
    assert_eq!(copies.len(), NAMES.len());
    assert_eq!(m.len(), NAMES.len());

    let kv: KeyValue<Rc<str>, Rc<str>> = m.move_kv(&Rc::from("Stacy")).unwrap();
    let (k, v) = kv.into_parts();
    assert_eq!((&*k, &*v), ("Stacy", "Jones"));

    let moved = m.mv_collect().unwrap();
    assert_eq!(moved.len(), NAMES.len() - 1);
    assert!(m.is_empty());
    assert_eq!(destroyed.get(), 0);

    let mut names: Vec<&str> = moved.iter().map(|kv| &**kv.key).collect();
    names.sort_unstable();
    assert_eq!(names, ["Alexis", "Bob", "James", "John", "Joseph", "Tammera"]);
}

// Test: cpy_init produces an independent map.
// Verifies: same capacity and policies; entries are fresh allocations;
// mutating the copy leaves the source unchanged.
#[test]
fn cpy_init_is_independent() {
    let destroyed = Rc::new(Cell::new(0));
    let mut src = string_map(destroyed.clone());
    for &(k, v) in &NAMES {
        src.insert(&Rc::from(k), &Rc::from(v)).unwrap();
    }
    let mut dup = src.cpy_init().unwrap();
    assert_eq!(dup.capacity(), src.capacity());
    assert!(dup.policies().has_kv_destructor_fn());

    let key: Rc<str> = Rc::from("John");
    assert!(!Rc::ptr_eq(dup.at(&key).unwrap(), src.at(&key).unwrap()));
    *dup.at_mut(&key).unwrap() = Rc::from("Doe");
    assert_eq!(&**src.at(&key).unwrap(), "Smith");

    dup.clear();
    assert_eq!(destroyed.get(), NAMES.len());
    assert_eq!(src.len(), NAMES.len());
}

// Test: policy errors propagate unchanged.
// Verifies: a failing value copy aborts insert with CopyError and the map
// is unchanged.
#[test]
fn failing_copy_policy_propagates() {
    let mut m: ChainedHashMap<usize, usize> = ChainedHashMap::new(11, hash_usize).unwrap();
    m.insert(&1, &1).unwrap();
    m.set_value_cpy_fn(|_| Err(Error::Copy));
    assert_eq!(m.insert(&2, &2).unwrap_err(), Error::Copy);
    assert_eq!(m.update_or_insert(&1, &5).unwrap_err(), Error::Copy);
    assert_eq!(m.len(), 1);
    assert_eq!(*m.at(&1).unwrap(), 1);
}
