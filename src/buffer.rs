//! Buffer: contiguous growable array with explicit, fallible capacity
//! management.
//!
//! Capacity is tracked logically rather than read back from the allocator so
//! growth is deterministic: a full buffer doubles (`GROW_FACTOR`), `shrink`
//! trims to exactly `len`, and every allocation failure is reported as
//! `Error::InsufficientMemory` with the buffer left as it was.

use crate::error::Error;
use core::mem::size_of;

/// Factor by which capacity is multiplied whenever a full buffer grows.
pub const GROW_FACTOR: usize = 2;
/// Capacity substituted when a buffer is created with `initial_capacity == 0`.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Buffer<T> {
    data: Vec<T>,
    cap: usize,
}

// Every allocation funnels through here so tests can fail one on demand.
fn try_reserve_exact<T>(data: &mut Vec<T>, additional: usize) -> Result<(), Error> {
    #[cfg(test)]
    {
        if fail_point::hit() {
            return Err(Error::InsufficientMemory);
        }
    }
    data.try_reserve_exact(additional)?;
    Ok(())
}


impl<T> Buffer<T> {
    /// Create an empty buffer able to hold `initial_capacity` elements before
    /// reallocating. Zero-sized element types are rejected with `Error::Data`.
    pub fn with_capacity(initial_capacity: usize) -> Result<Self, Error> {
        if size_of::<T>() == 0 {
            return Err(Error::Data);
        }
        let cap = if initial_capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            initial_capacity
        };
        let mut data = Vec::new();
        try_reserve_exact(&mut data, cap)?;
        Ok(Self { data, cap })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Element size in bytes.
    pub fn stride(&self) -> usize {
        size_of::<T>()
    }

    /// Resize the allocation to hold exactly `capacity` elements. Never drops
    /// live elements: `capacity < len` fails with `Error::Data`.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), Error> {
        if capacity < self.data.len() {
            return Err(Error::Data);
        }
        if capacity > self.data.capacity() {
            let additional = capacity - self.data.len();
            try_reserve_exact(&mut self.data, additional)?;
        } else {
            self.data.shrink_to(capacity);
        }
        self.cap = capacity;
        Ok(())
    }

    /// Equivalent to `reserve(len)`.
    pub fn shrink(&mut self) -> Result<(), Error> {
        if self.cap == self.data.len() {
            return Ok(());
        }
        self.reserve(self.data.len())
    }

    // Make room for `additional` more elements, multiplying the capacity by
    // GROW_FACTOR until it fits. Nothing changes on failure.
    fn grow_for(&mut self, additional: usize) -> Result<(), Error> {
        let needed = self
            .data
            .len()
            .checked_add(additional)
            .ok_or(Error::InsufficientMemory)?;
        if needed <= self.cap {
            return Ok(());
        }
        let mut new_cap = self.cap.max(1);
        while new_cap < needed {
            new_cap = new_cap
                .checked_mul(GROW_FACTOR)
                .ok_or(Error::InsufficientMemory)?;
        }
        let additional = new_cap - self.data.len();
        try_reserve_exact(&mut self.data, additional)?;
        tracing::trace!(old = self.cap, new = new_cap, "buffer grow");
        self.cap = new_cap;
        Ok(())
    }

    pub(crate) fn reserve_additional(&mut self, additional: usize) -> Result<(), Error> {
        self.grow_for(additional)
    }

    // Grow, if needed, so that `total` elements fit without reallocating.
    pub(crate) fn ensure_capacity(&mut self, total: usize) -> Result<(), Error> {
        if total <= self.cap {
            return Ok(());
        }
        self.grow_for(total - self.data.len())
    }

    // Remove element `index` by moving the last element into its place.
    pub(crate) fn swap_remove(&mut self, index: usize) -> Result<T, Error> {
        if index >= self.data.len() {
            return Err(Error::Index);
        }
        Ok(self.data.swap_remove(index))
    }

    // Push into space already secured by `with_capacity` or
    // `reserve_additional`; never reallocates.
    #[inline]
    pub(crate) fn push_reserved(&mut self, element: T) {
        debug_assert!(self.data.len() < self.cap);
        self.data.push(element);
    }

    /// Append `element`, doubling the capacity first if the buffer is full.
    pub fn push(&mut self, element: T) -> Result<(), Error> {
        self.grow_for(1)?;
        self.data.push(element);
        Ok(())
    }

    pub fn at(&self, index: usize) -> Result<&T, Error> {
        self.data.get(index).ok_or(Error::Index)
    }

    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, Error> {
        self.data.get_mut(index).ok_or(Error::Index)
    }

    /// # Safety
    /// `index` must be less than `len()`.
    #[inline]
    pub unsafe fn at_unchecked(&self, index: usize) -> &T {
        debug_assert!(index < self.data.len());
        self.data.get_unchecked(index)
    }

    /// # Safety
    /// `index` must be less than `len()`.
    #[inline]
    pub unsafe fn at_unchecked_mut(&mut self, index: usize) -> &mut T {
        debug_assert!(index < self.data.len());
        self.data.get_unchecked_mut(index)
    }

    /// Last live element, `Error::Index` when empty.
    pub fn last(&self) -> Result<&T, Error> {
        self.data.last().ok_or(Error::Index)
    }

    /// Insert `element` at `index` (`0..=len`), shifting later elements right.
    pub fn add_at(&mut self, element: T, index: usize) -> Result<(), Error> {
        if index > self.data.len() {
            return Err(Error::Index);
        }
        self.grow_for(1)?;
        self.data.insert(index, element);
        Ok(())
    }

    /// Remove and return the element at `index`, shifting later elements left.
    pub fn remove_at(&mut self, index: usize) -> Result<T, Error> {
        if index >= self.data.len() {
            return Err(Error::Index);
        }
        Ok(self.data.remove(index))
    }

    pub fn pop(&mut self) -> Result<T, Error> {
        self.data.pop().ok_or(Error::Index)
    }

    /// Drop every element; the allocation and capacity are kept.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Move every element out, leaving the buffer empty with its capacity.
    pub(crate) fn drain_all(&mut self) -> std::vec::Drain<'_, T> {
        self.data.drain(..)
    }

    /// Apply `f` to each element in order. Stops at the first error and
    /// returns it; elements before the failing one have been visited, the
    /// rest are untouched.
    pub fn try_for_each<F>(&mut self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&mut T) -> Result<(), Error>,
    {
        for element in self.data.iter_mut() {
            f(element)?;
        }
        Ok(())
    }

    /// Keep only the elements for which `keep` returns `Ok(true)`, preserving
    /// order. On error the already-visited prefix is filtered, the failing
    /// element and everything after it stay in place, and the error is
    /// returned.
    pub fn try_retain<F>(&mut self, mut keep: F) -> Result<(), Error>
    where
        F: FnMut(&T) -> Result<bool, Error>,
    {
        let len = self.data.len();
        let mut kept = 0;
        for i in 0..len {
            match keep(&self.data[i]) {
                Ok(true) => {
                    self.data.swap(kept, i);
                    kept += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    // Rejected elements sit in kept..i after the swaps.
                    self.data.drain(kept..i);
                    return Err(e);
                }
            }
        }
        self.data.truncate(kept);
        Ok(())
    }

    /// Replace `dest` with a fresh buffer (same capacity as `self`) holding
    /// `f` applied to each element in order. On error `dest` holds the
    /// successfully mapped prefix.
    pub fn map_into<U, F>(&self, dest: &mut Buffer<U>, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&T) -> Result<U, Error>,
    {
        *dest = Buffer::with_capacity(self.cap)?;
        for element in self.data.iter() {
            let out = f(element)?;
            dest.push(out)?;
        }
        Ok(())
    }

    /// `map_into` that discards the partial output on error.
    pub fn try_map<U, F>(&self, f: F) -> Result<Buffer<U>, Error>
    where
        F: FnMut(&T) -> Result<U, Error>,
    {
        let mut dest = Buffer::with_capacity(self.cap)?;
        self.map_into(&mut dest, f)?;
        Ok(dest)
    }
}

impl<T: Clone> Buffer<T> {
    /// Build a buffer whose capacity is exactly `items.len()` (or the default
    /// when `items` is empty).
    pub fn from_slice(items: &[T]) -> Result<Self, Error> {
        let mut b = Self::with_capacity(items.len())?;
        b.data.extend_from_slice(items);
        Ok(b)
    }

    /// Duplicate the buffer into a fresh allocation of the same capacity.
    pub fn try_clone(&self) -> Result<Self, Error> {
        let mut data = Vec::new();
        try_reserve_exact(&mut data, self.cap)?;
        data.extend_from_slice(&self.data);
        Ok(Self {
            data,
            cap: self.cap,
        })
    }

    /// Overwrite `self` with a copy of `src`, reusing the existing
    /// allocation when it is large enough.
    pub fn clone_from_buffer(&mut self, src: &Buffer<T>) -> Result<(), Error> {
        if src.len() > self.cap {
            let additional = src.len().saturating_sub(self.data.len());
            try_reserve_exact(&mut self.data, additional)?;
            self.cap = src.len();
        }
        self.data.clear();
        self.data.extend_from_slice(&src.data);
        Ok(())
    }

    /// Copy every element of `src` onto the end of `self`.
    pub fn append(&mut self, src: &Buffer<T>) -> Result<(), Error> {
        self.grow_for(src.len())?;
        self.data.extend_from_slice(&src.data);
        Ok(())
    }
}

impl<T: PartialEq> PartialEq for Buffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<'a, T> IntoIterator for &'a Buffer<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
