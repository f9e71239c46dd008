//! Shared byte arena backing one or more [`ZcBuffer`](super::ZcBuffer) views.
//!
//! A storage is owned collectively by every view that references it through
//! an `Rc`; the strong count is the reference count and the arena is freed when
//! the last view drops. Besides the bytes, the storage records a dirty
//! watermark: the internal byte range `[dirty_start, dirty_end)` that some
//! view has claimed. A view may only grow in place into bytes outside the
//! watermark, which is what keeps shared views from writing over each other.
//!
//! # Coordinates
//!
//! Storage indices are *internal* coordinates: the zero-compressed span of a
//! view occupies no storage, so the view's real header and trailer bytes sit
//! back to back in `[internal_start, internal_end)`.
//!
//! # Thread Safety
//!
//! Not thread-safe. The arena uses `Rc`, `Cell` and `RefCell`; each packet
//! object graph is processed by a single thread of control.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::error::{BufferError, Result};

/// Largest capacity a single storage may have.
pub const MAX_CAPACITY: usize = u32::MAX as usize;

/// Reference-counted byte arena with a dirty watermark.
///
/// # Invariants
/// - `dirty_start <= dirty_end <= capacity`
/// - `bytes.len() == capacity` for the lifetime of the storage
#[derive(Debug)]
pub struct BufferStorage {
    bytes: RefCell<Vec<u8>>,
    capacity: usize,
    dirty_start: Cell<usize>,
    dirty_end: Cell<usize>,
}

impl BufferStorage {
    /// Allocate a zero-initialized arena of `capacity` bytes.
    ///
    /// The returned handle is the only reference (`ref_count == 1`) and the
    /// dirty watermark is empty at offset 0.
    ///
    /// # Errors
    /// - `BufferError::BadSize` if `capacity > MAX_CAPACITY`
    /// - `BufferError::OutOfMemory` if the allocator refuses the request
    pub fn allocate(capacity: usize) -> Result<Rc<Self>> {
        if capacity > MAX_CAPACITY {
            return Err(BufferError::BadSize {
                requested: capacity,
                max: MAX_CAPACITY,
            }
            .into());
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| BufferError::OutOfMemory {
                requested: capacity,
            })?;
        bytes.resize(capacity, 0);

        tracing::trace!(capacity, "allocated buffer storage");

        Ok(Rc::new(Self {
            bytes: RefCell::new(bytes),
            capacity,
            dirty_start: Cell::new(0),
            dirty_end: Cell::new(0),
        }))
    }

    /// Total number of bytes in the arena.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of views currently sharing this arena.
    pub fn ref_count(this: &Rc<Self>) -> usize {
        Rc::strong_count(this)
    }

    /// Whether `this` is referenced by exactly one view.
    pub fn is_unique(this: &Rc<Self>) -> bool {
        Rc::strong_count(this) == 1
    }

    /// The claimed internal range `(dirty_start, dirty_end)`.
    pub fn dirty(&self) -> (usize, usize) {
        (self.dirty_start.get(), self.dirty_end.get())
    }

    /// Replace the watermark. Only the sole owner, or a freshly allocated
    /// storage, may reset it.
    pub(crate) fn set_dirty(&self, start: usize, end: usize) {
        debug_assert!(start <= end && end <= self.capacity);
        self.dirty_start.set(start);
        self.dirty_end.set(end);
    }

    /// Extend the watermark downwards to cover `start`.
    pub(crate) fn claim_front(&self, start: usize) {
        if start < self.dirty_start.get() {
            self.dirty_start.set(start);
        }
    }

    /// Extend the watermark upwards to cover everything before `end`.
    pub(crate) fn claim_back(&self, end: usize) {
        debug_assert!(end <= self.capacity);
        if end > self.dirty_end.get() {
            self.dirty_end.set(end);
        }
    }

    /// Whether a view starting at internal offset `start` is the lowest claim,
    /// i.e. the bytes below it belong to nobody.
    pub(crate) fn front_is_free(&self, start: usize) -> bool {
        start <= self.dirty_start.get()
    }

    /// Whether a view ending at internal offset `end` is the highest claim.
    pub(crate) fn back_is_free(&self, end: usize) -> bool {
        end >= self.dirty_end.get()
    }

    pub(crate) fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.bytes.borrow(), Vec::as_slice)
    }

    pub(crate) fn bytes_mut(&self) -> RefMut<'_, [u8]> {
        RefMut::map(self.bytes.borrow_mut(), Vec::as_mut_slice)
    }
}
