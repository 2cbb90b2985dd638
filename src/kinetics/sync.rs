//! Work distribution helpers shared by the stepper phases.
//!
//! Row passes hand each worker whole rows, so writes never overlap. Index-set
//! passes write through `SharedSlice`, which is only sound because the
//! driving `IndexSet` is strictly increasing.

use std::marker::PhantomData;
use std::ops::RangeInclusive;

use rayon::prelude::*;

/// Below this many cells, a row pass runs on the calling thread.
pub(crate) const PARALLEL_ROW_THRESHOLD: usize = 8_192;
/// Below this many indices, an index-set pass runs on the calling thread.
pub(crate) const PARALLEL_SET_THRESHOLD: usize = 2_048;

/// Map `op` over `rows`, in parallel once the block is large enough.
/// Results are returned in row order either way.
pub(crate) fn map_rows<T, F>(rows: RangeInclusive<usize>, row_len: usize, op: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if rows.is_empty() {
        return Vec::new();
    }
    let count = rows.end() - rows.start() + 1;
    if count.saturating_mul(row_len) >= PARALLEL_ROW_THRESHOLD {
        rows.into_par_iter().map(op).collect()
    } else {
        rows.map(op).collect()
    }
}

/// Mutable slice that can be shared across workers writing disjoint indices.
pub(crate) struct SharedSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for SharedSlice<'_, T> {}
unsafe impl<T: Send> Sync for SharedSlice<'_, T> {}

impl<'a, T> SharedSlice<'a, T> {
    #[inline(always)]
    pub(crate) fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// No other thread may read or write `idx` for the lifetime of this
    /// wrapper.
    #[inline(always)]
    pub(crate) unsafe fn write(&self, idx: usize, value: T) {
        assert!(idx < self.len);
        unsafe { self.ptr.add(idx).write(value) }
    }

    /// # Safety
    /// Same contract as [`SharedSlice::write`].
    #[inline(always)]
    pub(crate) unsafe fn read(&self, idx: usize) -> T
    where
        T: Copy,
    {
        assert!(idx < self.len);
        unsafe { self.ptr.add(idx).read() }
    }
}
