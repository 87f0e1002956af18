//! Scratch vectors for the solve pipeline.
//!
//! A solve works entirely inside one scratch vector of length `n`; the
//! caller's output is only written once every step has succeeded. Scratch
//! comes from a [`ScratchAllocator`] so that allocation failure is an error
//! value rather than an abort, and can be injected in tests.

use std::ops::{Deref, DerefMut};

/// Allocation failure for a scratch vector of `len` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchUnavailable {
    pub len: usize,
}

/// Source of scratch vectors.
///
/// Implementations outside this crate wrap their storage with
/// `ScratchBuffer::from(vec)`. A buffer whose length differs from the
/// requested `len` is rejected by the solve.
pub trait ScratchAllocator {
    fn allocate(&self, len: usize) -> Result<ScratchBuffer, ScratchUnavailable>;
}

/// Heap allocator that reports failure instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl ScratchAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Result<ScratchBuffer, ScratchUnavailable> {
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| ScratchUnavailable { len })?;
        data.resize(len, 0.0);
        Ok(ScratchBuffer::from(data))
    }
}

/// Owned scratch vector, released when dropped.
#[derive(Debug)]
pub struct ScratchBuffer {
    data: Vec<f64>,
}

impl ScratchBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<f64>> for ScratchBuffer {
    fn from(data: Vec<f64>) -> Self {
        Self { data }
    }
}

impl Deref for ScratchBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        log::trace!("releasing scratch vector of length {}", self.data.len());
    }
}
