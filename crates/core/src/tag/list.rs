//! Per-packet tracking of the byte tags attached to a buffer window.
//!
//! # Design
//!
//! A [`TagList`] does not own its tags. It owns a *window* `[buffer_start,
//! buffer_end)` in a virtual coordinate space and a count `size` of leading
//! slots in a shared [`TagIndexArray`]. An entry in `[0, size)` is visible iff
//! it intersects the window.
//!
//! Copying a list shares the array. Inserts go to slot `size`, which is only
//! safe when no sibling has already claimed that slot; otherwise the list
//! copies its visible entries into a fresh array. Shrinking the window never
//! touches the array; entries that fell out of view are dropped by the next
//! compaction, which only the sole owner may perform.
//!
//! Ownership of the array moves through `Unallocated -> SoleOwner -> Shared`
//! by insert and copy, and back to `SoleOwner` by reallocation.
//!
//! # Coordinates
//!
//! A fresh list places its window at [`REF_POINT`], half the address space, so
//! it can grow by up to `REF_POINT` bytes on either side over its lifetime.
//! Growing past that is an error, never a wrap-around.
//!
//! # Thread Safety
//!
//! Not thread-safe; the array is shared through `Rc<RefCell<_>>`.

use std::rc::Rc;

use super::index::SharedTagArray;
use super::{ByteTagSpan, Tag, TagId, TagIndex, TagIndexArray};
use crate::error::{Result, TagError};

/// Virtual origin of a freshly created list.
pub const REF_POINT: usize = usize::MAX / 2;

/// Capacity of the first array a list allocates.
pub const DEFAULT_TAG_CAPACITY: usize = 4;

/// How a list currently holds its array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOwnership {
    /// No array yet
    Unallocated,
    /// This list is the only holder; compaction is allowed
    SoleOwner,
    /// At least one sibling list holds the same array
    Shared,
}

/// The set of tags visible through one buffer window.
///
/// # Invariants
/// - `buffer_start <= buffer_end`
/// - `size <= array.dirty()`
#[derive(Debug, Clone)]
pub struct TagList {
    buffer_start: usize,
    buffer_end: usize,
    size: usize,
    array: Option<SharedTagArray>,
}

impl Default for TagList {
    fn default() -> Self {
        Self::new()
    }
}

impl TagList {
    /// Empty list over an empty window.
    pub fn new() -> Self {
        Self {
            buffer_start: REF_POINT,
            buffer_end: REF_POINT,
            size: 0,
            array: None,
        }
    }

    /// Empty list tracking a buffer of `buffer_size` bytes.
    ///
    /// # Errors
    /// Returns `TagError::CoordinateOverflow` if `buffer_size` exceeds the
    /// tail-room above [`REF_POINT`].
    pub fn with_buffer_size(buffer_size: usize) -> Result<Self> {
        let mut list = Self::new();
        list.check_room(0, buffer_size)?;
        list.buffer_end += buffer_size;
        Ok(list)
    }

    /// Like [`TagList::with_buffer_size`], with an array preallocated for
    /// `capacity` entries.
    ///
    /// # Errors
    /// - `TagError::CoordinateOverflow` as for [`TagList::with_buffer_size`]
    /// - `BufferError::OutOfMemory` if the array cannot be allocated
    pub fn with_capacity(capacity: usize, buffer_size: usize) -> Result<Self> {
        let mut list = Self::with_buffer_size(buffer_size)?;
        list.array = Some(TagIndexArray::allocate(capacity)?);
        Ok(list)
    }

    /// Number of bytes in the tracked window.
    pub fn buffer_size(&self) -> usize {
        self.buffer_end - self.buffer_start
    }

    /// The window as `(start, end)` virtual coordinates.
    pub fn window(&self) -> (usize, usize) {
        (self.buffer_start, self.buffer_end)
    }

    /// Number of visible tags.
    pub fn len(&self) -> usize {
        let (lo, hi) = self.window();
        self.live(|live| live.iter().filter(|e| e.has_tagged_byte(lo, hi)).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of array slots attributed to this list, including entries that
    /// are no longer visible.
    pub fn internal_size(&self) -> usize {
        self.size
    }

    pub fn ownership(&self) -> ArrayOwnership {
        match &self.array {
            None => ArrayOwnership::Unallocated,
            Some(array) if Rc::strong_count(array) == 1 => ArrayOwnership::SoleOwner,
            Some(_) => ArrayOwnership::Shared,
        }
    }

    /// Capacity of the current array, 0 when unallocated.
    pub fn array_capacity(&self) -> usize {
        self.array.as_ref().map_or(0, |array| array.borrow().capacity())
    }

    /// Whether both lists hold the same array.
    pub fn shares_array_with(&self, other: &TagList) -> bool {
        match (&self.array, &other.array) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Attach `tag` to the local byte range `[start, start + len)`.
    ///
    /// # Errors
    /// - `TagError::EmptyRange` if `len == 0`
    /// - `TagError::OutOfRange` if the range leaves the window
    /// - `BufferError::OutOfMemory` if a new array cannot be allocated
    pub fn insert(&mut self, tag: Tag, start: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Err(TagError::EmptyRange.into());
        }
        let size = self.buffer_size();
        match start.checked_add(len) {
            Some(end) if end <= size => {}
            _ => return Err(TagError::OutOfRange { start, len, size }.into()),
        }

        let lo = self.buffer_start + start;
        self.push_entry(TagIndex::new(tag, lo, lo + len))
    }

    /// Whether a tag with `id` covers the byte at local `offset`.
    pub fn exists(&self, id: TagId, offset: usize) -> bool {
        if offset >= self.buffer_size() {
            return false;
        }
        let pos = self.buffer_start + offset;
        self.live(|live| live.iter().any(|e| e.tag().id() == id && e.covers(pos)))
    }

    /// The first tag with `id` covering the byte at local `offset`.
    pub fn get(&self, id: TagId, offset: usize) -> Option<Tag> {
        if offset >= self.buffer_size() {
            return None;
        }
        let pos = self.buffer_start + offset;
        self.live(|live| {
            live.iter()
                .find(|e| e.tag().id() == id && e.covers(pos))
                .map(|e| e.tag().clone())
        })
    }

    /// Visible tags in local offsets, clipped to the window, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = ByteTagSpan> {
        let (lo, hi) = self.window();
        let spans: Vec<ByteTagSpan> = self.live(|live| {
            live.iter()
                .filter(|e| e.has_tagged_byte(lo, hi))
                .map(|e| ByteTagSpan {
                    tag: e.tag().clone(),
                    start: e.start().max(lo) - lo,
                    end: e.end().min(hi) - lo,
                })
                .collect()
        });
        spans.into_iter()
    }

    /// Drop every tag; the array is released.
    pub fn remove_all(&mut self) {
        self.array = None;
        self.size = 0;
    }

    /// Grow the window by `size` bytes at the front.
    ///
    /// # Errors
    /// - `TagError::CoordinateOverflow` if the reserved head-room is exhausted
    /// - `BufferError::OutOfMemory` if a shared array must be copied and
    ///   cannot be
    pub fn add_at_start(&mut self, size: usize) -> Result<()> {
        self.expand_buffer(size, 0)
    }

    /// Grow the window by `size` bytes at the back.
    ///
    /// # Errors
    /// Same as [`TagList::add_at_start`], for the tail-room.
    pub fn add_at_end(&mut self, size: usize) -> Result<()> {
        self.expand_buffer(0, size)
    }

    /// Shrink the window at the front, clamped to its size.
    pub fn remove_at_start(&mut self, size: usize) {
        self.buffer_start += size.min(self.buffer_size());
    }

    /// Shrink the window at the back, clamped to its size.
    pub fn remove_at_end(&mut self, size: usize) {
        self.buffer_end -= size.min(self.buffer_size());
    }

    /// A copy restricted to the local range `[start, start + len)`.
    ///
    /// # Errors
    /// Returns `TagError::OutOfRange` if the range leaves the window.
    pub fn make_fragment(&self, start: usize, len: usize) -> Result<TagList> {
        let size = self.buffer_size();
        let end = match start.checked_add(len) {
            Some(end) if end <= size => end,
            _ => return Err(TagError::OutOfRange { start, len, size }.into()),
        };

        let mut fragment = self.clone();
        fragment.remove_at_start(start);
        fragment.remove_at_end(size - end);
        Ok(fragment)
    }

    /// Grow the window by `rhs`'s size at the front and take over `rhs`'s
    /// visible tags, re-anchored so that `rhs`'s last byte sits right before
    /// this list's first byte.
    ///
    /// Tags already present at exactly the same position are not duplicated.
    /// A foreign tag is cut at the seam so it never spills over bytes this
    /// list already tracked.
    ///
    /// # Errors
    /// - `TagError::CoordinateOverflow` if the window or a re-anchored tag
    ///   leaves the virtual space
    /// - `BufferError::OutOfMemory` if an array cannot be allocated
    pub fn prepend(&mut self, rhs: &TagList) -> Result<()> {
        let seam = self.buffer_start;
        let incoming = rhs.translated(rhs.buffer_end, seam)?;
        let incoming = incoming
            .into_iter()
            .map(|e| (e.end() > seam, e))
            .collect::<Vec<_>>();
        self.merge(rhs.buffer_size(), 0, incoming, |e| {
            let end = e.end().min(seam);
            (e.start() < end).then(|| TagIndex::new(e.tag().clone(), e.start(), end))
        })
    }

    /// Grow the window by `rhs`'s size at the back and take over `rhs`'s
    /// visible tags, re-anchored so that `rhs`'s first byte sits right after
    /// this list's last byte.
    ///
    /// # Errors
    /// Same as [`TagList::prepend`].
    pub fn append(&mut self, rhs: &TagList) -> Result<()> {
        let seam = self.buffer_end;
        let incoming = rhs.translated(rhs.buffer_start, seam)?;
        let incoming = incoming
            .into_iter()
            .map(|e| (e.start() < seam, e))
            .collect::<Vec<_>>();
        self.merge(0, rhs.buffer_size(), incoming, |e| {
            let start = e.start().max(seam);
            (start < e.end()).then(|| TagIndex::new(e.tag().clone(), start, e.end()))
        })
    }

    /// Run `f` over the slots attributed to this list.
    fn live<R>(&self, f: impl FnOnce(&[TagIndex]) -> R) -> R {
        match &self.array {
            Some(array) => {
                let array = array.borrow();
                debug_assert!(self.size <= array.dirty());
                f(array.entries().get(..self.size).unwrap_or_default())
            }
            None => f(&[]),
        }
    }

    /// Owned copies of the visible entries, unclipped.
    fn visible(&self) -> Vec<TagIndex> {
        let (lo, hi) = self.window();
        self.live(|live| {
            live.iter()
                .filter(|e| e.has_tagged_byte(lo, hi))
                .cloned()
                .collect()
        })
    }

    /// Visible entries moved so that virtual coordinate `anchor` lands on `seam`.
    fn translated(&self, anchor: usize, seam: usize) -> Result<Vec<TagIndex>> {
        self.visible()
            .into_iter()
            .map(|e| {
                let start = translate(e.start(), anchor, seam)?;
                let end = translate(e.end(), anchor, seam)?;
                Ok(TagIndex::new(e.tag().clone(), start, end))
            })
            .collect()
    }

    /// Expand the window, then insert `incoming`. Entries flagged as
    /// crossing the seam go through `cut` unless an identical entry exists.
    fn merge(
        &mut self,
        delta_start: usize,
        delta_end: usize,
        incoming: Vec<(bool, TagIndex)>,
        cut: impl Fn(&TagIndex) -> Option<TagIndex>,
    ) -> Result<()> {
        self.check_room(delta_start, delta_end)?;
        // the inserts below must not allocate
        self.reserve(incoming.len())?;
        self.expand_buffer(delta_start, delta_end)?;

        let mut added = 0usize;
        for (crosses_seam, entry) in incoming {
            if self.contains_position(&entry) {
                continue;
            }
            let entry = if crosses_seam { cut(&entry) } else { Some(entry) };
            if let Some(entry) = entry {
                self.push_entry(entry)?;
                added += 1;
            }
        }

        tracing::trace!(delta_start, delta_end, added, "merged tag list");
        Ok(())
    }

    fn contains_position(&self, entry: &TagIndex) -> bool {
        self.live(|live| live.iter().any(|e| e.same_position(entry)))
    }

    fn check_room(&self, delta_start: usize, delta_end: usize) -> Result<()> {
        if delta_start > self.buffer_start {
            return Err(TagError::CoordinateOverflow {
                requested: delta_start,
                available: self.buffer_start,
            }
            .into());
        }
        let tail = usize::MAX - self.buffer_end;
        if delta_end > tail {
            return Err(TagError::CoordinateOverflow {
                requested: delta_end,
                available: tail,
            }
            .into());
        }
        Ok(())
    }

    fn expand_buffer(&mut self, delta_start: usize, delta_end: usize) -> Result<()> {
        self.check_room(delta_start, delta_end)?;
        let lo = self.buffer_start - delta_start;
        let hi = self.buffer_end + delta_end;

        match self.ownership() {
            ArrayOwnership::Unallocated => {}
            ArrayOwnership::SoleOwner => self.compact(),
            ArrayOwnership::Shared => {
                let exposes = self.exposes_hidden(lo, self.buffer_start)
                    || self.exposes_hidden(self.buffer_end, hi);
                if exposes {
                    self.reallocate(self.array_capacity())?;
                }
            }
        }

        self.buffer_start = lo;
        self.buffer_end = hi;
        Ok(())
    }

    /// Whether an entry outside the window would become visible if the window
    /// grew over `[lo, hi)`.
    fn exposes_hidden(&self, lo: usize, hi: usize) -> bool {
        if lo >= hi {
            return false;
        }
        let (start, end) = self.window();
        self.live(|live| {
            live.iter()
                .any(|e| !e.has_tagged_byte(start, end) && e.has_tagged_byte(lo, hi))
        })
    }

    fn push_entry(&mut self, entry: TagIndex) -> Result<()> {
        self.reserve(1)?;
        if let Some(array) = &self.array {
            let mut array = array.borrow_mut();
            debug_assert_eq!(array.dirty(), self.size);
            array.push(entry);
            self.size += 1;
        }
        Ok(())
    }

    /// Make slots `[size, size + additional)` writable by this list alone.
    fn reserve(&mut self, additional: usize) -> Result<()> {
        if additional == 0 {
            return Ok(());
        }

        match self.ownership() {
            ArrayOwnership::Unallocated => {
                let capacity = additional.max(DEFAULT_TAG_CAPACITY);
                self.array = Some(TagIndexArray::allocate(capacity)?);
                self.size = 0;
                tracing::trace!(capacity, "allocated tag array");
            }
            ArrayOwnership::SoleOwner => {
                self.compact();
                let capacity = self.array_capacity();
                if capacity - self.size < additional {
                    self.reallocate(grown(capacity, self.size, additional))?;
                }
            }
            ArrayOwnership::Shared => {
                let (capacity, dirty) = self
                    .array
                    .as_ref()
                    .map_or((0, 0), |a| (a.borrow().capacity(), a.borrow().dirty()));
                if capacity - self.size < additional {
                    self.reallocate(grown(capacity, self.size, additional))?;
                } else if dirty != self.size {
                    // a sibling already wrote past our slots
                    self.reallocate(capacity)?;
                }
            }
        }
        Ok(())
    }

    /// Drop stale slots and entries outside the window. Sole owner only.
    fn compact(&mut self) {
        debug_assert_ne!(self.ownership(), ArrayOwnership::Shared);
        let Some(array) = &self.array else {
            return;
        };

        let mut array = array.borrow_mut();
        let before = array.dirty();
        array.truncate(self.size);
        array.retain_intersecting(self.buffer_start, self.buffer_end);
        let after = array.dirty();
        drop(array);

        self.size = after;
        if after != before {
            tracing::trace!(before, after, "compacted tag array");
        }
    }

    /// Move the visible entries into a fresh array of at least `capacity`.
    fn reallocate(&mut self, capacity: usize) -> Result<()> {
        let survivors = self.visible();
        let kept = survivors.len();
        let capacity = capacity.max(kept).max(DEFAULT_TAG_CAPACITY);

        let array = TagIndexArray::allocate(capacity)?;
        {
            let mut fresh = array.borrow_mut();
            for entry in survivors {
                fresh.push(entry);
            }
        }

        let released = self.size;
        self.array = Some(array);
        self.size = kept;
        tracing::debug!(capacity, kept, released, "reallocated tag array");
        Ok(())
    }
}

fn grown(capacity: usize, size: usize, additional: usize) -> usize {
    capacity
        .saturating_mul(2)
        .max(size.saturating_add(additional))
}

fn translate(coordinate: usize, anchor: usize, seam: usize) -> Result<usize> {
    let moved = if seam >= anchor {
        coordinate.checked_add(seam - anchor)
    } else {
        coordinate.checked_sub(anchor - seam)
    };
    moved.ok_or_else(|| {
        TagError::CoordinateOverflow {
            requested: seam.abs_diff(anchor),
            available: if seam >= anchor {
                usize::MAX - coordinate
            } else {
                coordinate
            },
        }
        .into()
    })
}
