//! Cache-line aligned, fixed-size backing store for the ring.
//!
//! Slots are only ever touched through raw pointers so the producer and the
//! consumer can work on disjoint ranges at the same time without ever
//! materialising overlapping references.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

/// Alignment of the backing allocation (one x86-64 / ARM64 cache line).
pub(crate) const CACHE_LINE: usize = 64;

pub(crate) struct AlignedStorage<T> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// SAFETY: the storage owns its elements; cross-thread access is coordinated
// by the ring's cursors, which hand each slot to exactly one side at a time.
unsafe impl<T: Send> Send for AlignedStorage<T> {}
unsafe impl<T: Send> Sync for AlignedStorage<T> {}

impl<T: Copy + Default> AlignedStorage<T> {
    /// Allocate `len` default-initialised slots.
    ///
    /// Returns `None` for an empty request, a zero-sized `T` or a size that
    /// overflows `isize`.
    pub(crate) fn new(len: usize) -> Option<Self> {
        if len == 0 || mem::size_of::<T>() == 0 {
            return None;
        }
        let size = mem::size_of::<T>().checked_mul(len)?;
        let align = CACHE_LINE.max(mem::align_of::<T>());
        let layout = Layout::from_size_align(size, align).ok()?;

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) }.cast::<T>();
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout)
        };

        for i in 0..len {
            // SAFETY: `i < len` is inside the allocation; the slot is
            // uninitialised, so it is written without reading or dropping.
            unsafe { ptr.as_ptr().add(i).write(T::default()) };
        }

        Some(Self { ptr, len, layout })
    }
}

impl<T: Copy> AlignedStorage<T> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Copy `src` into the slots starting at `index`.
    ///
    /// # Safety
    /// `index + src.len() <= self.len()`, and no other thread reads or writes
    /// those slots for the duration of the call.
    pub(crate) unsafe fn write_slots(&self, index: usize, src: &[T]) {
        debug_assert!(index + src.len() <= self.len);
        // SAFETY: bounds and exclusivity are upheld by the caller.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(index), src.len()) };
    }

    /// Copy the slots starting at `index` into `dst`.
    ///
    /// # Safety
    /// `index + dst.len() <= self.len()`, the slots hold published data, and
    /// no other thread writes them for the duration of the call.
    pub(crate) unsafe fn read_slots(&self, index: usize, dst: &mut [T]) {
        debug_assert!(index + dst.len() <= self.len);
        // SAFETY: bounds and exclusivity are upheld by the caller.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr().add(index), dst.as_mut_ptr(), dst.len()) };
    }
}

impl<T> Drop for AlignedStorage<T> {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with exactly this layout. `T: Copy` at
        // construction, so there is nothing to drop in place.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
    }
}
