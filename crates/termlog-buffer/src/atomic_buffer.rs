use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};

/// A fixed-capacity byte region shared between one writer and many readers.
///
/// Backing storage is a slice of `AtomicU64`, so the region is 8-byte aligned
/// and may be mutated through a shared reference. Multi-byte fields are
/// little-endian regardless of host order.
///
/// Fields that publish progress (frame lengths, tail counters) go through the
/// `*_volatile` / `*_ordered` accessors, which use acquire loads and release
/// stores. Everything else is written before the publishing store and read
/// after the matching load, so plain accesses are sufficient for it.
///
/// Out-of-range or misaligned accesses panic, like slice indexing.
pub struct AtomicBuffer {
    storage: Box<[AtomicU64]>,
    capacity: usize,
}

impl AtomicBuffer {
    /// Allocate a zero-filled buffer of `capacity` bytes.
    pub fn allocate(capacity: usize) -> Self {
        let words = capacity.div_ceil(8);
        let storage = (0..words).map(|_| AtomicU64::new(0)).collect();
        Self { storage, capacity }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire-load an `i32` at `offset` (must be 4-byte aligned).
    pub fn get_i32_volatile(&self, offset: usize) -> i32 {
        i32::from_le(self.atomic_i32(offset).load(Ordering::Acquire))
    }

    /// Release-store an `i32` at `offset` (must be 4-byte aligned).
    pub fn put_i32_ordered(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value.to_le(), Ordering::Release);
    }

    /// Atomically replace `expected` with `update`. Returns true on success.
    pub fn compare_and_set_i32(&self, offset: usize, expected: i32, update: i32) -> bool {
        self.atomic_i32(offset)
            .compare_exchange(
                expected.to_le(),
                update.to_le(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Acquire-load an `i64` at `offset` (must be 8-byte aligned).
    pub fn get_i64_volatile(&self, offset: usize) -> i64 {
        i64::from_le(self.atomic_i64(offset).load(Ordering::Acquire))
    }

    /// Release-store an `i64` at `offset` (must be 8-byte aligned).
    pub fn put_i64_ordered(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value.to_le(), Ordering::Release);
    }

    /// Atomically add `delta` to the `i64` at `offset`, returning the previous value.
    pub fn get_and_add_i64(&self, offset: usize, delta: i64) -> i64 {
        let cell = self.atomic_i64(offset);
        let mut current = cell.load(Ordering::Acquire);
        loop {
            let next = i64::from_le(current).wrapping_add(delta).to_le();
            match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(previous) => return i64::from_le(previous),
                Err(actual) => current = actual,
            }
        }
    }

    /// Atomically replace `expected` with `update`. Returns true on success.
    pub fn compare_and_set_i64(&self, offset: usize, expected: i64, update: i64) -> bool {
        self.atomic_i64(offset)
            .compare_exchange(
                expected.to_le(),
                update.to_le(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        let mut raw = [0u8; 1];
        self.get_bytes(offset, &mut raw);
        raw[0]
    }

    pub fn get_u16(&self, offset: usize) -> u16 {
        let mut raw = [0u8; 2];
        self.get_bytes(offset, &mut raw);
        u16::from_le_bytes(raw)
    }

    pub fn get_i32(&self, offset: usize) -> i32 {
        let mut raw = [0u8; 4];
        self.get_bytes(offset, &mut raw);
        i32::from_le_bytes(raw)
    }

    pub fn get_i64(&self, offset: usize) -> i64 {
        let mut raw = [0u8; 8];
        self.get_bytes(offset, &mut raw);
        i64::from_le_bytes(raw)
    }

    pub fn put_u8(&self, offset: usize, value: u8) {
        self.put_bytes(offset, &[value]);
    }

    pub fn put_u16(&self, offset: usize, value: u16) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    pub fn put_i32(&self, offset: usize, value: i32) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    pub fn put_i64(&self, offset: usize, value: i64) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    /// Copy `src` into the buffer starting at `offset`.
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.bounds_check(offset, src.len());
        // SAFETY: the range is in bounds and the storage is built from atomics,
        // so writing through a shared reference is permitted. Readers only
        // look at these bytes after an acquire load of a later release store.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len());
        }
    }

    /// Fill `length` bytes starting at `offset` with `value`.
    pub fn set_memory(&self, offset: usize, length: usize, value: u8) {
        self.bounds_check(offset, length);
        // SAFETY: same argument as `put_bytes`.
        unsafe {
            std::ptr::write_bytes(self.base().add(offset), value, length);
        }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub fn get_bytes(&self, offset: usize, dst: &mut [u8]) {
        self.bounds_check(offset, dst.len());
        // SAFETY: in bounds, and no reference into the storage outlives the copy.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Borrow `length` bytes starting at `offset`.
    ///
    /// Panics if the range is out of bounds.
    ///
    /// # Safety
    ///
    /// Nothing may write to `offset..offset + length` while the returned
    /// slice is alive. For a term buffer this holds for a frame whose length
    /// was acquire-loaded as published, until the term is cleaned for reuse.
    pub unsafe fn slice(&self, offset: usize, length: usize) -> &[u8] {
        self.bounds_check(offset, length);
        // SAFETY: in bounds; the caller guarantees the range is not written
        // for the lifetime of the borrow.
        unsafe { std::slice::from_raw_parts(self.base().add(offset), length) }
    }

    fn base(&self) -> *mut u8 {
        self.storage.as_ptr() as *mut u8
    }

    fn bounds_check(&self, offset: usize, length: usize) {
        assert!(
            offset <= self.capacity && length <= self.capacity - offset,
            "buffer access out of bounds: offset {offset} + length {length} > capacity {}",
            self.capacity
        );
    }

    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.bounds_check(offset, 4);
        assert!(offset % 4 == 0, "misaligned i32 access at offset {offset}");
        // SAFETY: in bounds and 4-byte aligned (storage is 8-byte aligned).
        unsafe { &*(self.base().add(offset) as *const AtomicI32) }
    }

    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        self.bounds_check(offset, 8);
        assert!(offset % 8 == 0, "misaligned i64 access at offset {offset}");
        // SAFETY: in bounds and 8-byte aligned.
        unsafe { &*(self.base().add(offset) as *const AtomicI64) }
    }
}

impl fmt::Debug for AtomicBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicBuffer")
            .field("capacity", &self.capacity)
            .finish()
    }
}
