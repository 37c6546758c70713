//! ChainedHashMap: separate-chaining map over `Buffer`s with pluggable
//! policies and a rollback-safe rehash.
//!
//! Layout: `buckets` is a `Buffer` of `capacity` chains, each chain a
//! `Buffer<KeyValue>`. `occupied` lists the index of every non-empty chain
//! exactly once, so clearing and full traversal cost O(occupied) rather
//! than O(capacity). Invariant after every public call:
//! `count == Σ chain lengths == Σ over occupied of chain length`.
//!
//! The bucket count only changes through an explicit `rehash`; inserts never
//! resize. `insert` does not look for an existing equal key (duplicates
//! accumulate as separate entries); `update_or_insert` does.

use crate::buffer::Buffer;
use crate::error::Error;
use crate::policy::PolicySet;
use crate::primes;
use crate::reentrancy::DebugReentrancy;
use core::mem::size_of;

/// Initial capacity of each chain.
pub const BUCKET_INITIAL_CAPACITY: usize = 1;

/// An owned entry: key and value live in separate heap blocks, so chains
/// only store two pointers and relocating an entry never moves its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<K, V> {
    pub key: Box<K>,
    pub value: Box<V>,
}

impl<K, V> KeyValue<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn into_parts(self) -> (K, V) {
        (*self.key, *self.value)
    }
}

type Chain<K, V> = Buffer<KeyValue<K, V>>;

// Bucket storage and bookkeeping. Kept apart from the reentrancy tracker so
// guarded entry points can hold the guard while mutating the table.
struct Table<K, V> {
    count: usize,
    capacity: usize,
    policies: PolicySet<K, V>,
    buckets: Buffer<Chain<K, V>>,
    occupied: Buffer<usize>,
    // positions[b] is the index of `b` in `occupied`; meaningful only while
    // chain `b` is non-empty.
    positions: Buffer<usize>,
}

// Where each entry goes under a given bucket count, and how many land in
// each bucket.
struct Plan {
    dests: Buffer<usize>,
    sizes: Buffer<usize>,
    non_empty: usize,
}

// A fully allocated replacement for a table's bucket storage.
struct Layout<K, V> {
    buckets: Buffer<Chain<K, V>>,
    occupied: Buffer<usize>,
    positions: Buffer<usize>,
    dests: Buffer<usize>,
}

pub struct ChainedHashMap<K, V> {
    table: Table<K, V>,
    reentrancy: DebugReentrancy,
}

impl<K, V> core::fmt::Debug for ChainedHashMap<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChainedHashMap")
            .field("count", &self.table.count)
            .field("capacity", &self.table.capacity)
            .field("occupied", &self.table.occupied.len())
            .field("policies", &self.table.policies)
            .field("busy", &self.reentrancy.active())
            .finish()
    }
}

// Allocate `capacity` empty chains. A failure drops whatever was built.
fn alloc_buckets<K, V>(capacity: usize) -> Result<Buffer<Chain<K, V>>, Error> {
    let mut buckets = Buffer::with_capacity(capacity)?;
    for _ in 0..capacity {
        buckets.push_reserved(Buffer::with_capacity(BUCKET_INITIAL_CAPACITY)?);
    }
    Ok(buckets)
}

fn zeroed(len: usize) -> Result<Buffer<usize>, Error> {
    let mut buf = Buffer::with_capacity(len)?;
    for _ in 0..len {
        buf.push_reserved(0);
    }
    Ok(buf)
}

/// Iterator over `(&K, &V)` in occupied-bucket order, then chain order.
pub struct Iter<'a, K, V> {
    occupied: core::slice::Iter<'a, usize>,
    buckets: &'a [Chain<K, V>],
    chain: core::slice::Iter<'a, KeyValue<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(kv) = self.chain.next() {
                return Some((&*kv.key, &*kv.value));
            }
            let &b = self.occupied.next()?;
            self.chain = self.buckets[b].iter();
        }
    }
}

impl<K, V> Table<K, V> {
    fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            occupied: self.occupied.iter(),
            buckets: self.buckets.as_slice(),
            chain: [].iter(),
        }
    }

    #[inline]
    fn bucket_index(&self, key: &K) -> usize {
        (self.policies.hash(key) % self.capacity as u64) as usize
    }

    #[inline]
    fn chain(&self, b: usize) -> &Chain<K, V> {
        debug_assert!(b < self.buckets.len());
        // SAFETY: bucket indices come from `hash % capacity` or from
        // `occupied`, and `buckets.len() == capacity`.
        unsafe { self.buckets.at_unchecked(b) }
    }

    #[inline]
    fn chain_mut(&mut self, b: usize) -> &mut Chain<K, V> {
        debug_assert!(b < self.buckets.len());
        // SAFETY: as in `chain`.
        unsafe { self.buckets.at_unchecked_mut(b) }
    }

    fn total_collisions(&self) -> usize {
        self.occupied
            .iter()
            .map(|&b| self.chain(b).len().saturating_sub(1))
            .sum()
    }

    // First occupied bucket with the longest chain.
    fn longest_chain(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for &b in self.occupied.iter() {
            let len = self.chain(b).len();
            if best.map_or(true, |(_, l)| len > l) {
                best = Some((b, len));
            }
        }
        best.map(|(b, _)| b)
    }

    // Reserve room for one more entry in chain `b` (and in `occupied` if the
    // chain is empty) so the following `commit` cannot fail.
    fn reserve_slot(&mut self, b: usize) -> Result<(), Error> {
        let was_empty = self.chain(b).is_empty();
        self.chain_mut(b).reserve_additional(1)?;
        if was_empty {
            self.occupied.reserve_additional(1)?;
        }
        Ok(())
    }

    fn commit(&mut self, b: usize, kv: KeyValue<K, V>) {
        if self.chain(b).is_empty() {
            // SAFETY: positions.len() == capacity > b.
            unsafe { *self.positions.at_unchecked_mut(b) = self.occupied.len() };
            self.occupied.push_reserved(b);
        }
        self.chain_mut(b).push_reserved(kv);
        self.count += 1;
    }

    // Link an owned pair into its bucket. On failure the pair goes through
    // the destructor policy.
    fn place(&mut self, kv: KeyValue<K, V>) -> Result<(), Error> {
        let b = self.bucket_index(&kv.key);
        if let Err(e) = self.reserve_slot(b) {
            self.policies.destroy(kv);
            return Err(e);
        }
        self.commit(b, kv);
        Ok(())
    }

    // Unlink entry `i` of chain `b`, keeping `occupied` and `count` in sync.
    // An emptied bucket leaves `occupied` by swap-remove, so the last listed
    // bucket takes its slot.
    fn take_at(&mut self, b: usize, i: usize) -> Result<KeyValue<K, V>, Error> {
        let kv = self.chain_mut(b).remove_at(i)?;
        if self.chain(b).is_empty() {
            let pos = *self.positions.at(b)?;
            self.occupied.swap_remove(pos)?;
            if let Ok(&moved) = self.occupied.at(pos) {
                *self.positions.at_mut(moved)? = pos;
            }
        }
        self.count -= 1;
        Ok(kv)
    }

    fn clear_inner(&mut self) {
        let policies = &self.policies;
        for &b in self.occupied.iter() {
            // SAFETY: occupied indices are < buckets.len().
            let chain = unsafe { self.buckets.at_unchecked_mut(b) };
            for kv in chain.drain_all() {
                policies.destroy(kv);
            }
        }
        self.occupied.clear();
        self.count = 0;
    }

    fn mv_collect(&mut self) -> Result<Buffer<KeyValue<K, V>>, Error> {
        let mut out = Buffer::with_capacity(self.count.max(1))?;
        for &b in self.occupied.iter() {
            // SAFETY: occupied indices are < buckets.len().
            let chain = unsafe { self.buckets.at_unchecked_mut(b) };
            for kv in chain.drain_all() {
                out.push_reserved(kv);
            }
        }
        self.occupied.clear();
        self.count = 0;
        Ok(out)
    }

    fn try_for_each<F>(&mut self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&K, &mut V) -> Result<(), Error>,
    {
        for &b in self.occupied.iter() {
            // SAFETY: occupied indices are < buckets.len().
            let chain = unsafe { self.buckets.at_unchecked_mut(b) };
            for kv in chain.iter_mut() {
                f(&kv.key, &mut kv.value)?;
            }
        }
        Ok(())
    }

    fn rehash(&mut self, target: usize) -> Result<(), Error> {
        let from = self.capacity;
        let Layout {
            mut buckets,
            mut occupied,
            mut positions,
            dests,
        } = self.build_layout(target).map_err(|e| {
            tracing::warn!(from, to = target, error = %e, "rehash rolled back");
            e
        })?;

        // Everything is allocated; relocation below cannot fail.
        let mut dests = dests.iter();
        for &b in self.occupied.iter() {
            // SAFETY: occupied indices are < buckets.len().
            let chain = unsafe { self.buckets.at_unchecked_mut(b) };
            for (kv, &d) in chain.drain_all().zip(&mut dests) {
                // SAFETY: d = hash % target, and both buckets and positions
                // have length target.
                let new_chain = unsafe { buckets.at_unchecked_mut(d) };
                if new_chain.is_empty() {
                    unsafe { *positions.at_unchecked_mut(d) = occupied.len() };
                    occupied.push_reserved(d);
                }
                new_chain.push_reserved(kv);
            }
        }

        tracing::debug!(from, to = target, count = self.count, "rehash");
        self.buckets = buckets;
        self.occupied = occupied;
        self.positions = positions;
        self.capacity = target;
        Ok(())
    }

    // Destination bucket (mod `modulus`) of each key, in iteration order,
    // plus per-bucket totals.
    fn plan<'a, I>(&self, keys: I, len: usize, modulus: usize) -> Result<Plan, Error>
    where
        I: Iterator<Item = &'a K>,
        K: 'a,
    {
        let mut dests = Buffer::with_capacity(len.max(1))?;
        let mut sizes = zeroed(modulus)?;
        let mut non_empty = 0usize;
        for key in keys {
            let d = (self.policies.hash(key) % modulus as u64) as usize;
            dests.push_reserved(d);
            let slot = sizes.at_mut(d)?;
            if *slot == 0 {
                non_empty += 1;
            }
            *slot += 1;
        }
        Ok(Plan {
            dests,
            sizes,
            non_empty,
        })
    }

    // Allocate the complete layout for `target` buckets: every chain sized to
    // the entries it will receive, the occupied index, and each entry's
    // destination in traversal order.
    fn build_layout(&self, target: usize) -> Result<Layout<K, V>, Error> {
        let plan = self.plan(self.iter().map(|(k, _)| k), self.count, target)?;
        let mut buckets = Buffer::with_capacity(target)?;
        for &n in plan.sizes.iter() {
            buckets.push_reserved(Buffer::with_capacity(n.max(BUCKET_INITIAL_CAPACITY))?);
        }
        Ok(Layout {
            buckets,
            occupied: Buffer::with_capacity(plan.non_empty.max(1))?,
            positions: zeroed(target)?,
            dests: plan.dests,
        })
    }

    // Grow chains and the occupied index so that, once the table is cleared,
    // every pair in `entries` can be committed without allocating. Returns
    // each pair's bucket.
    fn reserve_for(&mut self, entries: &Buffer<KeyValue<K, V>>) -> Result<Buffer<usize>, Error> {
        let plan = self.plan(entries.iter().map(|kv| &*kv.key), entries.len(), self.capacity)?;
        for (b, &n) in plan.sizes.iter().enumerate() {
            if n > 0 {
                self.chain_mut(b).ensure_capacity(n)?;
            }
        }
        self.occupied.ensure_capacity(plan.non_empty)?;
        Ok(plan.dests)
    }

    fn destroy_all(&self, entries: &mut Buffer<KeyValue<K, V>>) {
        for kv in entries.drain_all() {
            self.policies.destroy(kv);
        }
    }
}

impl<K, V> Table<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    fn locate(&self, key: &K) -> Option<(usize, usize)> {
        let b = self.bucket_index(key);
        let i = self
            .chain(b)
            .iter()
            .position(|kv| self.policies.key_eq(&kv.key, key))?;
        Some((b, i))
    }

    fn find(&self, key: &K) -> Result<&KeyValue<K, V>, Error> {
        let (b, i) = self.locate(key).ok_or(Error::MissingKey)?;
        self.chain(b).at(i)
    }

    fn find_mut(&mut self, key: &K) -> Result<&mut KeyValue<K, V>, Error> {
        let (b, i) = self.locate(key).ok_or(Error::MissingKey)?;
        self.chain_mut(b).at_mut(i)
    }

    // Deep copies of every entry of `src`, made with this table's copy
    // policies. On failure the copies made so far are destroyed.
    fn copy_entries_from(&self, src: &Self) -> Result<Buffer<KeyValue<K, V>>, Error> {
        let mut out = Buffer::with_capacity(src.count.max(1))?;
        for (k, v) in src.iter() {
            match self.policies.copy_pair(k, v) {
                Ok(kv) => out.push_reserved(kv),
                Err(e) => {
                    self.destroy_all(&mut out);
                    return Err(e);
                }
            }
        }
        Ok(out)
    }
}

impl<K, V> ChainedHashMap<K, V> {
    pub fn len(&self) -> usize {
        self.table.count
    }

    pub fn is_empty(&self) -> bool {
        self.table.count == 0
    }

    /// Number of buckets; always an entry of the prime table.
    pub fn capacity(&self) -> usize {
        self.table.capacity
    }

    pub fn policies(&self) -> &PolicySet<K, V> {
        &self.table.policies
    }

    /// Largest bucket count a map can be created or rehashed to on this
    /// target.
    pub fn max_capacity() -> usize {
        primes::max_capacity()
    }

    pub fn set_key_eq_fn<F>(&mut self, f: F)
    where
        F: Fn(&K, &K) -> bool + 'static,
    {
        self.table.policies.set_key_eq_fn(f);
    }

    pub fn set_key_cpy_fn<F>(&mut self, f: F)
    where
        F: Fn(&K) -> Result<K, Error> + 'static,
    {
        self.table.policies.set_key_cpy_fn(f);
    }

    pub fn set_value_cpy_fn<F>(&mut self, f: F)
    where
        F: Fn(&V) -> Result<V, Error> + 'static,
    {
        self.table.policies.set_value_cpy_fn(f);
    }

    pub fn set_kv_destructor_fn<F>(&mut self, f: F)
    where
        F: Fn(KeyValue<K, V>) + 'static,
    {
        self.table.policies.set_kv_destructor_fn(f);
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        self.table.iter()
    }

    /// Sum over occupied buckets of `(len - 1)`: entries that share a bucket
    /// with an earlier entry.
    pub fn total_collisions(&self) -> usize {
        self.table.total_collisions()
    }

    /// Longest chain length minus one (0 for an empty map).
    pub fn max_collisions(&self) -> usize {
        self.table
            .longest_chain()
            .map(|b| self.table.chain(b).len().saturating_sub(1))
            .unwrap_or(0)
    }

    /// Destroy every entry. Capacity and bucket storage are kept.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        tracing::debug!(count = self.table.count, capacity = self.table.capacity, "clear");
        self.table.clear_inner();
    }

    /// Move every entry out (no destructor runs) into a flat buffer, leaving
    /// the map empty.
    pub fn mv_collect(&mut self) -> Result<Buffer<KeyValue<K, V>>, Error> {
        let _g = self.reentrancy.enter("mv_collect");
        let out = self.table.mv_collect()?;
        tracing::debug!(moved = out.len(), "mv_collect");
        Ok(out)
    }

    /// Visit every entry (occupied-bucket order, then chain order). Stops at
    /// the first error from `f` and returns it.
    pub fn try_for_each<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut(&K, &mut V) -> Result<(), Error>,
    {
        let _g = self.reentrancy.enter("try_for_each");
        self.table.try_for_each(f)
    }

    /// Rebuild the bucket array at the smallest table prime `>= new_min_capacity`,
    /// or at the next prime above the current capacity when `new_min_capacity`
    /// is 0. Entries are relocated, not copied. If any allocation fails the
    /// map is left exactly as it was.
    pub fn rehash(&mut self, new_min_capacity: usize) -> Result<(), Error> {
        let _g = self.reentrancy.enter("rehash");
        let target = if new_min_capacity == 0 {
            primes::prime_above(self.table.capacity)
        } else {
            primes::prime_at_least(new_min_capacity)
        }
        .ok_or(Error::InsufficientMemory)?;
        self.table.rehash(target)
    }
}

#[cfg(test)]
impl<K, V> ChainedHashMap<K, V> {
    pub(crate) fn chain_lens(&self) -> Vec<usize> {
        self.table.buckets.iter().map(|c| c.len()).collect()
    }

    pub(crate) fn occupied_buckets(&self) -> Vec<usize> {
        self.table.occupied.iter().copied().collect()
    }

    // Every listed bucket records its own slot in `occupied`.
    pub(crate) fn positions_match(&self) -> bool {
        let t = &self.table;
        t.occupied
            .iter()
            .enumerate()
            .all(|(i, &b)| t.positions.as_slice()[b] == i)
    }
}

impl<K, V> ChainedHashMap<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    /// Create an empty map with the smallest table prime `>= min_capacity`
    /// buckets and `hash` as its hash policy. The other policies start unset.
    pub fn new<H>(min_capacity: usize, hash: H) -> Result<Self, Error>
    where
        H: Fn(&K) -> u64 + 'static,
    {
        Self::with_policies(min_capacity, PolicySet::new(hash))
    }

    /// Create an empty map with a complete policy set.
    ///
    /// Errors: `InvalidArgument` if `K` or `V` is zero-sized;
    /// `InsufficientMemory` if no table prime is large enough or allocation
    /// fails.
    pub fn with_policies(min_capacity: usize, policies: PolicySet<K, V>) -> Result<Self, Error> {
        if size_of::<K>() == 0 || size_of::<V>() == 0 {
            return Err(Error::InvalidArgument);
        }
        let capacity = primes::prime_at_least(min_capacity).ok_or(Error::InsufficientMemory)?;
        let buckets = alloc_buckets(capacity)?;
        let occupied = Buffer::with_capacity(0)?;
        let positions = zeroed(capacity)?;
        tracing::debug!(min_capacity, capacity, "chained hash map init");
        Ok(Self {
            table: Table {
                count: 0,
                capacity,
                policies,
                buckets,
                occupied,
                positions,
            },
            reentrancy: DebugReentrancy::new(),
        })
    }

    /// Copy `key` and `value` in through the copy policies and add them as a
    /// new entry. Existing equal keys are not checked for.
    pub fn insert(&mut self, key: &K, value: &V) -> Result<(), Error> {
        let _g = self.reentrancy.enter("insert");
        let kv = self.table.policies.copy_pair(key, value)?;
        self.table.place(kv)
    }

    /// Overwrite the value of an existing equal key in place, or insert.
    pub fn update_or_insert(&mut self, key: &K, value: &V) -> Result<(), Error> {
        let _g = self.reentrancy.enter("update_or_insert");
        match self.table.locate(key) {
            Some((b, i)) => {
                let v = self.table.policies.copy_value(value)?;
                let kv = self.table.chain_mut(b).at_mut(i)?;
                *kv.value = v;
                Ok(())
            }
            None => {
                let kv = self.table.policies.copy_pair(key, value)?;
                self.table.place(kv)
            }
        }
    }

    pub fn at(&self, key: &K) -> Result<&V, Error> {
        let _g = self.reentrancy.enter("at");
        let kv = self.table.find(key)?;
        Ok(&*kv.value)
    }

    pub fn at_mut(&mut self, key: &K) -> Result<&mut V, Error> {
        let _g = self.reentrancy.enter("at_mut");
        let kv = self.table.find_mut(key)?;
        Ok(&mut *kv.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter("contains_key");
        self.table.locate(key).is_some()
    }

    /// Remove the first entry equal to `key` and run the destructor policy on it.
    pub fn remove(&mut self, key: &K) -> Result<(), Error> {
        let _g = self.reentrancy.enter("remove");
        let (b, i) = self.table.locate(key).ok_or(Error::MissingKey)?;
        let kv = self.table.take_at(b, i)?;
        self.table.policies.destroy(kv);
        Ok(())
    }

    /// Deep-copy the entry for `key` through the copy policies; the map is
    /// unchanged.
    pub fn cpy_kv(&self, key: &K) -> Result<KeyValue<K, V>, Error> {
        let _g = self.reentrancy.enter("cpy_kv");
        let kv = self.table.find(key)?;
        self.table.policies.copy_pair(&kv.key, &kv.value)
    }

    /// Unlink the entry for `key` and hand ownership to the caller. No
    /// destructor runs.
    pub fn move_kv(&mut self, key: &K) -> Result<KeyValue<K, V>, Error> {
        let _g = self.reentrancy.enter("move_kv");
        let (b, i) = self.table.locate(key).ok_or(Error::MissingKey)?;
        self.table.take_at(b, i)
    }

    /// Longest chain length minus one, plus a copy (via the key copy policy)
    /// of the first key in that chain. The key is `None` only for an empty
    /// map.
    pub fn max_collisions_key(&self) -> Result<(usize, Option<K>), Error> {
        let _g = self.reentrancy.enter("max_collisions_key");
        let Some(b) = self.table.longest_chain() else {
            return Ok((0, None));
        };
        let chain = self.table.chain(b);
        let collisions = chain.len().saturating_sub(1);
        let key = self.table.policies.copy_key(&chain.at(0)?.key)?;
        Ok((collisions, Some(key)))
    }

    /// Deep-copy every entry into a flat buffer; the map is unchanged.
    pub fn cpy_collect(&self) -> Result<Buffer<KeyValue<K, V>>, Error> {
        let _g = self.reentrancy.enter("cpy_collect");
        let out = self.table.copy_entries_from(&self.table)?;
        tracing::debug!(copied = out.len(), "cpy_collect");
        Ok(out)
    }

    /// Replace the contents of `self` with deep copies of every entry in
    /// `src`, made with `self`'s copy policies. Copies are made and storage
    /// is reserved before anything is cleared, so on any error `self` keeps
    /// its entries and the copies are destroyed.
    pub fn cpy_assign(&mut self, src: &Self) -> Result<(), Error> {
        let _g = self.reentrancy.enter("cpy_assign");
        let mut copies = self.table.copy_entries_from(&src.table)?;
        let dests = match self.table.reserve_for(&copies) {
            Ok(dests) => dests,
            Err(e) => {
                self.table.destroy_all(&mut copies);
                return Err(e);
            }
        };
        self.table.clear_inner();
        for (kv, &b) in copies.drain_all().zip(dests.iter()) {
            self.table.commit(b, kv);
        }
        Ok(())
    }

    /// A new map with the same capacity and policies holding deep copies of
    /// every entry.
    pub fn cpy_init(&self) -> Result<Self, Error> {
        let _g = self.reentrancy.enter("cpy_init");
        let mut dest = Self::with_policies(self.table.capacity, self.table.policies.clone())?;
        dest.cpy_assign(self)?;
        Ok(dest)
    }
}

impl<K, V> Drop for ChainedHashMap<K, V> {
    fn drop(&mut self) {
        let _g = self.reentrancy.enter("drop");
        self.table.clear_inner();
    }
}

impl<'a, K, V> IntoIterator for &'a ChainedHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
