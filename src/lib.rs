//! bedrock: growable buffers and a separate-chaining hash map with
//! pluggable key/value policies.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a small set of container primitives whose capacity changes are
//!   explicit and whose allocation failures are reported, not aborted on.
//! - Layers:
//!   - Buffer<T>: contiguous array with a logical capacity that doubles
//!     when full, fallible growth, checked and unchecked access, and
//!     copy/map/foreach helpers. RawBuffer is the same contract over raw
//!     bytes with a stride chosen at run time.
//!   - PolicySet<K, V>: the mandatory hash function plus optional key
//!     equality, key copy, value copy and pair destructor.
//!   - ChainedHashMap<K, V>: buckets of `Buffer<KeyValue>` chains, sized
//!     from a prime table, with an index of occupied buckets.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (policies are held in `Rc`).
//! - Capacity grows only on explicit request for the map (`rehash`);
//!   buffers grow by `GROW_FACTOR` when a push finds them full.
//! - Every allocation goes through `try_reserve_exact`; failure surfaces as
//!   `Error::InsufficientMemory` and leaves the container unchanged.
//!
//! Reentrancy policy
//! - ChainedHashMap calls user policies while its bookkeeping is
//!   transiently inconsistent. A debug-only guard at each entry point
//!   panics on nested entry, naming both operations. Release builds carry
//!   no guard state.
//!
//! Copy and ownership semantics
//! - `insert`/`update_or_insert` take borrowed keys and values and store
//!   copies made by the copy policies (`Clone` when unset).
//! - `move_kv` and `mv_collect` hand entries out without running the
//!   destructor policy; `remove`, `clear` and `Drop` run it.
//! - `rehash` relocates entries; it never copies or destroys them and calls
//!   only the hash policy.
//!
//! Notes and non-goals
//! - No automatic resizing on insert; callers watch `len`/`capacity` and
//!   the collision statistics and call `rehash`.
//! - `insert` does not deduplicate; use `update_or_insert` for unique keys.

pub mod buffer;
pub mod chained_hash_map;
mod chained_hash_map_proptest;
pub mod error;
pub mod policy;
#[cfg(feature = "bench_internal")]
pub mod primes;
#[cfg(not(feature = "bench_internal"))]
mod primes;
pub mod raw_buffer;
mod reentrancy;

// Public surface
pub use buffer::Buffer;
pub use chained_hash_map::{ChainedHashMap, KeyValue};
pub use error::Error;
pub use policy::PolicySet;
pub use raw_buffer::RawBuffer;
