//! Tags anchored in the virtual coordinate space, and the fixed-capacity
//! array that stores them.

use std::cell::RefCell;
use std::rc::Rc;

use super::Tag;
use crate::error::{BufferError, Result};

/// A tag attached to the virtual byte range `[start, end)`.
///
/// Coordinates are shared by every tag list that descends from one ancestor,
/// so an entry keeps pointing at the same logical bytes across copies,
/// fragments and reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIndex {
    tag: Tag,
    start: usize,
    end: usize,
}

impl TagIndex {
    pub fn new(tag: Tag, start: usize, end: usize) -> Self {
        debug_assert!(start < end, "tag must span at least one byte");
        Self { tag, start, end }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Whether `[start, end)` shares at least one byte with `[lo, hi)`.
    /// An empty query range intersects nothing.
    pub fn has_tagged_byte(&self, lo: usize, hi: usize) -> bool {
        lo < hi && self.start < hi && lo < self.end
    }

    /// Whether the entry covers the single byte at `pos`.
    pub fn covers(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Same tag id at exactly the same position.
    pub fn same_position(&self, other: &TagIndex) -> bool {
        self.tag.id() == other.tag.id() && self.start == other.start && self.end == other.end
    }

    /// Copy of this entry restricted to `[lo, hi)`; `None` if disjoint.
    pub fn clipped(&self, lo: usize, hi: usize) -> Option<TagIndex> {
        self.has_tagged_byte(lo, hi).then(|| TagIndex {
            tag: self.tag.clone(),
            start: self.start.max(lo),
            end: self.end.min(hi),
        })
    }
}

/// Shared handle to a tag array.
pub(crate) type SharedTagArray = Rc<RefCell<TagIndexArray>>;

/// Fixed-capacity array of tag entries, shared copy-on-write between tag lists.
///
/// Slots `[0, dirty)` hold constructed entries. The array never grows in
/// place; a list that needs more room allocates a new array.
///
/// # Invariants
/// - `dirty() <= capacity()`
#[derive(Debug)]
pub struct TagIndexArray {
    capacity: usize,
    entries: Vec<TagIndex>,
}

impl TagIndexArray {
    /// Allocate an empty array with room for `capacity` entries.
    ///
    /// # Errors
    /// Returns `BufferError::OutOfMemory` if the allocator refuses the request.
    pub fn allocate(capacity: usize) -> Result<Rc<RefCell<Self>>> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| BufferError::OutOfMemory {
                requested: capacity.saturating_mul(std::mem::size_of::<TagIndex>()),
            })?;

        Ok(Rc::new(RefCell::new(Self { capacity, entries })))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of constructed entries.
    pub fn dirty(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.dirty() == self.capacity
    }

    pub fn entries(&self) -> &[TagIndex] {
        &self.entries
    }

    pub(crate) fn push(&mut self, entry: TagIndex) {
        debug_assert!(!self.is_full(), "tag array over capacity");
        self.entries.push(entry);
    }

    /// Destroy entries from slot `len` onwards.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Keep only entries intersecting `[lo, hi)`, packed toward the front in
    /// their original order.
    pub(crate) fn retain_intersecting(&mut self, lo: usize, hi: usize) {
        self.entries.retain(|entry| entry.has_tagged_byte(lo, hi));
    }
}
