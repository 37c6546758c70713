//! RawBuffer: runtime-stride byte buffer.
//!
//! Same growth and failure rules as `Buffer<T>`, but the element size is a
//! runtime value and elements are `stride`-byte slices. Used where the
//! element layout is only known at runtime (file codecs, vertex streams).
//! `bytemuck` provides typed reads and construction from `Pod` slices.

use crate::buffer::{DEFAULT_CAPACITY, GROW_FACTOR};
use crate::error::Error;
use bytemuck::Pod;
use core::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    bytes: Vec<u8>,
    stride: usize,
    cap: usize,
}

impl RawBuffer {
    pub fn new(stride: usize, initial_capacity: usize) -> Result<Self, Error> {
        if stride == 0 {
            return Err(Error::Data);
        }
        let cap = if initial_capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            initial_capacity
        };
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(byte_len(stride, cap)?)?;
        Ok(Self { bytes, stride, cap })
    }

    /// Copy a typed slice into a buffer whose stride is `size_of::<T>()`.
    pub fn from_pod_slice<T: Pod>(items: &[T]) -> Result<Self, Error> {
        let mut raw = Self::new(size_of::<T>(), items.len())?;
        raw.bytes.extend_from_slice(bytemuck::cast_slice(items));
        Ok(raw)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn reserve(&mut self, capacity: usize) -> Result<(), Error> {
        if capacity < self.len() {
            return Err(Error::Data);
        }
        let want = byte_len(self.stride, capacity)?;
        if want > self.bytes.capacity() {
            self.bytes.try_reserve_exact(want - self.bytes.len())?;
        } else {
            self.bytes.shrink_to(want);
        }
        self.cap = capacity;
        Ok(())
    }

    pub fn shrink(&mut self) -> Result<(), Error> {
        if self.cap == self.len() {
            return Ok(());
        }
        self.reserve(self.len())
    }

    fn grow_for(&mut self, additional: usize) -> Result<(), Error> {
        let needed = self
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
        let want = byte_len(self.stride, new_cap)?;
        self.bytes.try_reserve_exact(want - self.bytes.len())?;
        tracing::trace!(old = self.cap, new = new_cap, stride = self.stride, "raw buffer grow");
        self.cap = new_cap;
        Ok(())
    }

    fn check_element(&self, element: &[u8]) -> Result<(), Error> {
        if element.len() != self.stride {
            return Err(Error::Data);
        }
        Ok(())
    }

    fn range(&self, index: usize) -> core::ops::Range<usize> {
        index * self.stride..(index + 1) * self.stride
    }

    /// Append one element; `element.len()` must equal the stride.
    pub fn push(&mut self, element: &[u8]) -> Result<(), Error> {
        self.check_element(element)?;
        self.grow_for(1)?;
        self.bytes.extend_from_slice(element);
        Ok(())
    }

    pub fn at(&self, index: usize) -> Result<&[u8], Error> {
        if index >= self.len() {
            return Err(Error::Index);
        }
        Ok(&self.bytes[self.range(index)])
    }

    pub fn at_mut(&mut self, index: usize) -> Result<&mut [u8], Error> {
        if index >= self.len() {
            return Err(Error::Index);
        }
        let r = self.range(index);
        Ok(&mut self.bytes[r])
    }

    pub fn last(&self) -> Result<&[u8], Error> {
        match self.len() {
            0 => Err(Error::Index),
            n => self.at(n - 1),
        }
    }

    /// Read element `index` as a `T`. `Error::Type` if `T` does not match the stride.
    pub fn read_pod<T: Pod>(&self, index: usize) -> Result<T, Error> {
        if size_of::<T>() != self.stride {
            return Err(Error::Type);
        }
        Ok(bytemuck::pod_read_unaligned(self.at(index)?))
    }

    pub fn add_at(&mut self, element: &[u8], index: usize) -> Result<(), Error> {
        self.check_element(element)?;
        if index > self.len() {
            return Err(Error::Index);
        }
        self.grow_for(1)?;
        let at = index * self.stride;
        self.bytes.splice(at..at, element.iter().copied());
        Ok(())
    }

    /// Remove element `index`, copying it into `dest` when given.
    pub fn remove_at(&mut self, index: usize, dest: Option<&mut [u8]>) -> Result<(), Error> {
        if index >= self.len() {
            return Err(Error::Index);
        }
        if let Some(d) = dest.as_deref() {
            self.check_element(d)?;
        }
        let r = self.range(index);
        if let Some(d) = dest {
            d.copy_from_slice(&self.bytes[r.clone()]);
        }
        self.bytes.drain(r);
        Ok(())
    }

    pub fn pop(&mut self, dest: Option<&mut [u8]>) -> Result<(), Error> {
        match self.len() {
            0 => Err(Error::Index),
            n => self.remove_at(n - 1, dest),
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn try_clone(&self) -> Result<Self, Error> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(byte_len(self.stride, self.cap)?)?;
        bytes.extend_from_slice(&self.bytes);
        Ok(Self {
            bytes,
            stride: self.stride,
            cap: self.cap,
        })
    }

    /// Overwrite `self` with a copy of `src`. The stride is taken from `src`.
    pub fn clone_from_raw(&mut self, src: &RawBuffer) -> Result<(), Error> {
        let want = src.bytes.len();
        if want > self.bytes.capacity() {
            self.bytes.try_reserve_exact(want - self.bytes.len())?;
        }
        self.bytes.clear();
        self.bytes.extend_from_slice(&src.bytes);
        self.stride = src.stride;
        self.cap = (self.bytes.capacity() / self.stride).max(src.len());
        Ok(())
    }

    /// Copy every element of `src` onto the end of `self`; strides must match.
    pub fn append(&mut self, src: &RawBuffer) -> Result<(), Error> {
        if src.stride != self.stride {
            return Err(Error::Type);
        }
        self.grow_for(src.len())?;
        self.bytes.extend_from_slice(&src.bytes);
        Ok(())
    }

    pub fn try_for_each<F>(&mut self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&mut [u8]) -> Result<(), Error>,
    {
        for element in self.bytes.chunks_exact_mut(self.stride) {
            f(element)?;
        }
        Ok(())
    }

    pub fn try_retain<F>(&mut self, mut keep: F) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> Result<bool, Error>,
    {
        let stride = self.stride;
        let len = self.len();
        let mut kept = 0;
        for i in 0..len {
            match keep(&self.bytes[i * stride..(i + 1) * stride]) {
                Ok(true) => {
                    if kept != i {
                        self.bytes
                            .copy_within(i * stride..(i + 1) * stride, kept * stride);
                    }
                    kept += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    self.bytes.drain(kept * stride..i * stride);
                    return Err(e);
                }
            }
        }
        self.bytes.truncate(kept * stride);
        Ok(())
    }

    /// Replace `dest` with a fresh buffer of `output_stride`, filled by `f`
    /// writing into a zeroed scratch element per input element. On error
    /// `dest` holds the mapped prefix.
    pub fn map_into<F>(
        &self,
        dest: &mut RawBuffer,
        output_stride: usize,
        mut f: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&[u8], &mut [u8]) -> Result<(), Error>,
    {
        *dest = RawBuffer::new(output_stride, self.cap)?;
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(output_stride)?;
        scratch.resize(output_stride, 0u8);
        for element in self.bytes.chunks_exact(self.stride) {
            scratch.fill(0);
            f(element, &mut scratch)?;
            dest.push(&scratch)?;
        }
        Ok(())
    }
}

fn byte_len(stride: usize, count: usize) -> Result<usize, Error> {
    stride.checked_mul(count).ok_or(Error::InsufficientMemory)
}
