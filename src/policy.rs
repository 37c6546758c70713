//! Key/value policies for `ChainedHashMap`, plus hash helpers usable as the
//! mandatory hash policy.
//!
//! A `PolicySet` always carries a hash function. Equality, key copy, value
//! copy and the pair destructor are optional; when unset the map falls back
//! to `PartialEq`, `Clone` and plain `Drop`. For plain-old-data keys those
//! defaults are the byte-wise compare/copy/free behavior; for handle types
//! such as `Rc<str>` the default copy shares the pointee, and a custom copy
//! policy is how callers ask for deep copies.
//!
//! Contract for custom policies:
//! - `key_eq(a, b)` must never be true when `hash(a) != hash(b)`; violating
//!   this silently breaks lookups.
//! - Copies must preserve both equality and hash.

use crate::chained_hash_map::KeyValue;
use crate::error::Error;
use bytemuck::Pod;
use core::hash::{BuildHasher, Hash};
use std::rc::Rc;

pub type HashFn<K> = Rc<dyn Fn(&K) -> u64>;
pub type KeyEqFn<K> = Rc<dyn Fn(&K, &K) -> bool>;
/// Copy policy. Should report `Error::Copy` (or `Error::InsufficientMemory`)
/// on failure; the map returns whatever it reports.
pub type CopyFn<T> = Rc<dyn Fn(&T) -> Result<T, Error>>;
pub type KvDestructorFn<K, V> = Rc<dyn Fn(KeyValue<K, V>)>;

pub struct PolicySet<K, V> {
    hash: HashFn<K>,
    key_eq: Option<KeyEqFn<K>>,
    key_cpy: Option<CopyFn<K>>,
    value_cpy: Option<CopyFn<V>>,
    kv_destructor: Option<KvDestructorFn<K, V>>,
}

// Manual impl: cloning shares the installed functions and needs no bounds on K/V.
impl<K, V> Clone for PolicySet<K, V> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash.clone(),
            key_eq: self.key_eq.clone(),
            key_cpy: self.key_cpy.clone(),
            value_cpy: self.value_cpy.clone(),
            kv_destructor: self.kv_destructor.clone(),
        }
    }
}

impl<K, V> core::fmt::Debug for PolicySet<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicySet")
            .field("key_eq", &self.key_eq.is_some())
            .field("key_cpy", &self.key_cpy.is_some())
            .field("value_cpy", &self.value_cpy.is_some())
            .field("kv_destructor", &self.kv_destructor.is_some())
            .finish()
    }
}

impl<K, V> PolicySet<K, V> {
    /// A policy set with only the mandatory hash function installed.
    pub fn new<H>(hash: H) -> Self
    where
        H: Fn(&K) -> u64 + 'static,
    {
        Self {
            hash: Rc::new(hash),
            key_eq: None,
            key_cpy: None,
            value_cpy: None,
            kv_destructor: None,
        }
    }

    pub fn set_key_eq_fn<F>(&mut self, f: F)
    where
        F: Fn(&K, &K) -> bool + 'static,
    {
        self.key_eq = Some(Rc::new(f));
    }

    pub fn set_key_cpy_fn<F>(&mut self, f: F)
    where
        F: Fn(&K) -> Result<K, Error> + 'static,
    {
        self.key_cpy = Some(Rc::new(f));
    }

    pub fn set_value_cpy_fn<F>(&mut self, f: F)
    where
        F: Fn(&V) -> Result<V, Error> + 'static,
    {
        self.value_cpy = Some(Rc::new(f));
    }

    pub fn set_kv_destructor_fn<F>(&mut self, f: F)
    where
        F: Fn(KeyValue<K, V>) + 'static,
    {
        self.kv_destructor = Some(Rc::new(f));
    }

    pub fn has_key_eq_fn(&self) -> bool {
        self.key_eq.is_some()
    }

    pub fn has_key_cpy_fn(&self) -> bool {
        self.key_cpy.is_some()
    }

    pub fn has_value_cpy_fn(&self) -> bool {
        self.value_cpy.is_some()
    }

    pub fn has_kv_destructor_fn(&self) -> bool {
        self.kv_destructor.is_some()
    }

    #[inline]
    pub fn hash(&self, key: &K) -> u64 {
        (self.hash)(key)
    }

    /// Run the destructor policy on `kv`, or simply drop it.
    pub fn destroy(&self, kv: KeyValue<K, V>) {
        match &self.kv_destructor {
            Some(d) => d(kv),
            None => drop(kv),
        }
    }
}

impl<K, V> PolicySet<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    #[inline]
    pub fn key_eq(&self, a: &K, b: &K) -> bool {
        match &self.key_eq {
            Some(eq) => eq(a, b),
            None => a == b,
        }
    }

    pub fn copy_key(&self, key: &K) -> Result<K, Error> {
        match &self.key_cpy {
            Some(cpy) => cpy(key),
            None => Ok(key.clone()),
        }
    }

    pub fn copy_value(&self, value: &V) -> Result<V, Error> {
        match &self.value_cpy {
            Some(cpy) => cpy(value),
            None => Ok(value.clone()),
        }
    }

    /// Copy both halves into a freshly allocated pair.
    pub fn copy_pair(&self, key: &K, value: &V) -> Result<KeyValue<K, V>, Error> {
        let key = self.copy_key(key)?;
        let value = self.copy_value(value)?;
        Ok(KeyValue::new(key, value))
    }
}

// Hash helpers. The integer mixers are the splitmix64 / murmur3 finalizers,
// so sequential keys spread across buckets.

#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[inline]
pub fn mix32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x85eb_ca6b);
    x ^= x >> 13;
    x = x.wrapping_mul(0xc2b2_ae35);
    x ^ (x >> 16)
}

pub fn hash_u8(x: &u8) -> u64 {
    mix64(u64::from(*x))
}

pub fn hash_u16(x: &u16) -> u64 {
    mix64(u64::from(*x))
}

pub fn hash_u32(x: &u32) -> u64 {
    u64::from(mix32(*x))
}

pub fn hash_u64(x: &u64) -> u64 {
    mix64(*x)
}

pub fn hash_usize(x: &usize) -> u64 {
    mix64(*x as u64)
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `bytes`, finished with `mix64`.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let h = bytes
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    mix64(h)
}

pub fn hash_str(s: &str) -> u64 {
    hash_bytes(s.as_bytes())
}

/// Hash of the value's in-memory bytes.
pub fn hash_pod<T: Pod>(x: &T) -> u64 {
    hash_bytes(bytemuck::bytes_of(x))
}

/// Byte-wise equality, usable as a key equality policy.
pub fn pod_eq<T: Pod>(a: &T, b: &T) -> bool {
    bytemuck::bytes_of(a) == bytemuck::bytes_of(b)
}

/// Adapt a std `BuildHasher` into a hash policy.
pub fn hash_with<K, S>(state: S) -> impl Fn(&K) -> u64
where
    K: Hash + ?Sized,
    S: BuildHasher,
{
    move |k: &K| state.hash_one(k)
}
