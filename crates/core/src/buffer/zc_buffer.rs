//! Zero-compressed buffer views.
//!
//! A [`ZcBuffer`] presents `size()` logical bytes laid out as three regions:
//!
//! ```text
//!  start        zero_start          zero_end         end
//!    |  header    |   zero span        |   trailer    |
//!    |  (real)    |   (no storage)     |   (real)     |
//! ```
//!
//! The header and trailer live in a shared [`BufferStorage`]; the zero span is
//! only a length. Header bytes sit at storage index `p` for logical position
//! `p`, trailer bytes at `p - zero_size`, so the real bytes of a view are one
//! contiguous internal range `[start, end - zero_size)`.
//!
//! # Growth Policy
//!
//! Adding bytes at either end takes the cheapest tier that is safe:
//! 1. **InPlace**: enough slack on that side, and either the view owns the
//!    storage alone or the slack is outside every sibling's claim (the dirty
//!    watermark). Only offsets move.
//! 2. **Moved**: sole owner, enough total capacity but not on that side. The
//!    real bytes are moved within the same storage.
//! 3. **Reallocated**: anything else. A new storage is allocated with slack on
//!    the growing side and the real bytes are copied over.
//!
//! Repeatedly adding headers to an unshared buffer is O(1) amortized.
//!
//! # Writes
//!
//! A sole owner may write any real byte. Over shared storage a view may only
//! write the bytes it was handed by in-place growth since the storage was last
//! cloned; anything else is rejected with `BufferError::SharedWrite` until
//! [`ZcBuffer::make_writable`] gives the view a private copy.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::iterator::{BufferIterator, ConstBufferIterator};
use super::storage::{BufferStorage, MAX_CAPACITY};
use crate::error::{BufferError, Result};

/// Which tier of the growth policy an `add_at_*` call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Growth {
    /// Offsets adjusted inside the existing storage
    InPlace,
    /// Real bytes moved within the existing storage
    Moved,
    /// Real bytes copied to a freshly allocated storage
    Reallocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

/// Offsets of a view, in the view's logical coordinates.
///
/// # Invariants
/// - `start <= zero_start <= zero_end <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Layout {
    pub(crate) start: usize,
    pub(crate) zero_start: usize,
    pub(crate) zero_end: usize,
    pub(crate) end: usize,
}

impl Layout {
    /// Layout whose real bytes begin at internal offset `internal_start`.
    fn placed(internal_start: usize, header: usize, zero: usize, trailer: usize) -> Self {
        let zero_start = internal_start + header;
        let zero_end = zero_start + zero;
        Self {
            start: internal_start,
            zero_start,
            zero_end,
            end: zero_end + trailer,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn zero_size(&self) -> usize {
        self.zero_end - self.zero_start
    }

    pub(crate) fn header_len(&self) -> usize {
        self.zero_start - self.start
    }

    pub(crate) fn trailer_len(&self) -> usize {
        self.end - self.zero_end
    }

    pub(crate) fn internal_size(&self) -> usize {
        self.header_len() + self.trailer_len()
    }

    pub(crate) fn internal_end(&self) -> usize {
        self.start + self.internal_size()
    }

    /// Storage index of a logical position outside the zero span.
    fn internal_index(&self, pos: usize) -> usize {
        if pos < self.zero_start {
            pos
        } else {
            debug_assert!(pos >= self.zero_end || self.zero_size() == 0);
            pos - self.zero_size()
        }
    }

    /// Copy logical bytes `[from, from + dst.len())` into `dst`, synthesizing
    /// the zero span. The caller has bounds-checked the range.
    pub(crate) fn gather(&self, storage: Option<&BufferStorage>, from: usize, dst: &mut [u8]) {
        debug_assert!(from >= self.start && from + dst.len() <= self.end);

        let mut pos = from;
        let mut written = 0;

        if pos < self.zero_start && written < dst.len() {
            let n = (self.zero_start - pos).min(dst.len() - written);
            if let Some(storage) = storage {
                dst[written..written + n].copy_from_slice(&storage.bytes()[pos..pos + n]);
            }
            pos += n;
            written += n;
        }

        if pos < self.zero_end && written < dst.len() {
            let n = (self.zero_end - pos).min(dst.len() - written);
            dst[written..written + n].fill(0);
            pos += n;
            written += n;
        }

        if written < dst.len() {
            let n = dst.len() - written;
            let idx = self.internal_index(pos);
            if let Some(storage) = storage {
                dst[written..].copy_from_slice(&storage.bytes()[idx..idx + n]);
            }
        }
    }

    /// Map logical `[from, from + len)` to a writable internal range.
    fn writable(&self, access: Access, from: usize, len: usize) -> Result<usize> {
        if len > 0 && self.zero_size() > 0 && from < self.zero_end && self.zero_start < from + len {
            return Err(BufferError::ZeroAreaWrite {
                offset: from.max(self.zero_start) - self.start,
            }
            .into());
        }
        let idx = self.internal_index(from);
        if !access.permits(idx, len) {
            return Err(BufferError::SharedWrite {
                offset: from - self.start,
                len,
            }
            .into());
        }
        Ok(idx)
    }

    /// Copy `src` to logical position `from`, rejecting the zero span and
    /// bytes `access` does not cover.
    pub(crate) fn scatter(
        &self,
        storage: Option<&BufferStorage>,
        access: Access,
        from: usize,
        src: &[u8],
    ) -> Result<()> {
        let idx = self.writable(access, from, src.len())?;
        if let Some(storage) = storage {
            storage.bytes_mut()[idx..idx + src.len()].copy_from_slice(src);
        }
        Ok(())
    }

    /// Write `len` copies of `value` at logical position `from`.
    pub(crate) fn fill(
        &self,
        storage: Option<&BufferStorage>,
        access: Access,
        from: usize,
        len: usize,
        value: u8,
    ) -> Result<()> {
        let idx = self.writable(access, from, len)?;
        if let Some(storage) = storage {
            storage.bytes_mut()[idx..idx + len].fill(value);
        }
        Ok(())
    }
}

/// Internal bytes a view received from in-place growth over shared storage:
/// `[layout.start, front_end)` and `[back_start, internal_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    front_end: usize,
    back_start: usize,
}

impl Default for Claim {
    fn default() -> Self {
        Self {
            front_end: 0,
            back_start: usize::MAX,
        }
    }
}

/// Internal ranges a cursor may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Sole owner, or bytes the caller just claimed
    All,
    /// Shared storage: only `[start, front_end)` and `[back_start, end)`
    Claimed {
        start: usize,
        front_end: usize,
        back_start: usize,
        end: usize,
    },
}

impl Access {
    fn permits(self, idx: usize, len: usize) -> bool {
        let Access::Claimed {
            start,
            front_end,
            back_start,
            end,
        } = self
        else {
            return true;
        };
        let hi = idx + len;
        len == 0
            || (idx >= start && hi <= front_end)
            || (idx >= back_start && hi <= end)
            || (back_start <= front_end && idx >= start.min(back_start) && hi <= end.max(front_end))
    }
}

/// Copy-on-write, zero-compressed byte buffer.
///
/// Cloning is O(1): the clone shares the storage and bumps its reference
/// count. Mutating growth never writes into bytes another view has claimed,
/// and cursors refuse to write shared bytes.
#[derive(Default)]
pub struct ZcBuffer {
    storage: Option<Rc<BufferStorage>>,
    layout: Layout,
    claim: Cell<Claim>,
}

impl Clone for ZcBuffer {
    fn clone(&self) -> Self {
        // both views now see every byte this one had to itself
        self.claim.set(Claim::default());
        Self {
            storage: self.storage.clone(),
            layout: self.layout,
            claim: Cell::default(),
        }
    }
}

impl ZcBuffer {
    /// Empty buffer without storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty buffer over `capacity` bytes of storage, parked at the end of the
    /// storage so that header growth has the whole arena available.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_zero_area_at(capacity, capacity, 0)
    }

    /// Buffer of `zero_size` logical zero bytes, with `capacity` bytes of
    /// head-room for headers.
    pub fn with_zero_area(capacity: usize, zero_size: usize) -> Result<Self> {
        Self::with_zero_area_at(capacity, capacity, zero_size)
    }

    /// Buffer of `zero_size` logical zero bytes placed at internal offset
    /// `zero_start` of a `capacity`-byte storage.
    ///
    /// # Errors
    /// - `BufferError::OutOfRange` if `zero_start > capacity`
    /// - `BufferError::BadSize` / `OutOfMemory` from allocation
    pub fn with_zero_area_at(capacity: usize, zero_start: usize, zero_size: usize) -> Result<Self> {
        if zero_start > capacity {
            return Err(BufferError::OutOfRange {
                offset: zero_start,
                len: 0,
                size: capacity,
            }
            .into());
        }
        check_logical(zero_start, zero_size)?;

        let storage = BufferStorage::allocate(capacity)?;
        storage.set_dirty(zero_start, zero_start);

        Ok(Self {
            storage: Some(storage),
            layout: Layout::placed(zero_start, 0, zero_size, 0),
            claim: Cell::default(),
        })
    }

    /// Fully real buffer holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Self::from_parts(data, 0, &[])
    }

    /// Zero-compressed buffer `header ++ [0; zero_len] ++ trailer`.
    pub fn from_parts(header: &[u8], zero_len: usize, trailer: &[u8]) -> Result<Self> {
        let internal = header.len() + trailer.len();
        check_logical(internal, zero_len)?;

        let storage = BufferStorage::allocate(internal)?;
        {
            let mut bytes = storage.bytes_mut();
            bytes[..header.len()].copy_from_slice(header);
            bytes[header.len()..].copy_from_slice(trailer);
        }
        storage.set_dirty(0, internal);

        Ok(Self {
            storage: Some(storage),
            layout: Layout::placed(0, header.len(), zero_len, trailer.len()),
            claim: Cell::default(),
        })
    }

    /// Logical size, including the zero span.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Whether the buffer holds no logical bytes.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Real bytes held in storage.
    pub fn internal_size(&self) -> usize {
        self.layout.internal_size()
    }

    /// Length of the zero-compressed span.
    pub fn zero_size(&self) -> usize {
        self.layout.zero_size()
    }

    /// Whether part of the buffer is represented by a zero span.
    pub fn is_zero_compressed(&self) -> bool {
        self.zero_size() > 0
    }

    /// Capacity of the backing storage (0 without storage).
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.capacity())
    }

    /// Number of views sharing the backing storage (0 without storage).
    pub fn storage_ref_count(&self) -> usize {
        self.storage.as_ref().map_or(0, BufferStorage::ref_count)
    }

    /// Whether both buffers are views over the same storage.
    pub fn shares_storage_with(&self, other: &ZcBuffer) -> bool {
        match (&self.storage, &other.storage) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    pub(crate) fn storage(&self) -> Option<&BufferStorage> {
        self.storage.as_deref()
    }

    /// What a cursor over this view may write.
    pub(crate) fn access(&self) -> Access {
        match &self.storage {
            Some(storage) if !BufferStorage::is_unique(storage) => {
                let claim = self.claim.get();
                Access::Claimed {
                    start: self.layout.start,
                    front_end: claim.front_end,
                    back_start: claim.back_start,
                    end: self.layout.internal_end(),
                }
            }
            _ => Access::All,
        }
    }

    /// Whether every real byte of this view can be written without touching
    /// bytes another view sees.
    pub fn is_writable(&self) -> bool {
        self.storage
            .as_ref()
            .map_or(true, |storage| BufferStorage::is_unique(storage))
    }

    /// Copy the real bytes into private storage if the current storage is
    /// shared, so the whole view becomes writable. Other views are untouched.
    ///
    /// # Errors
    /// `BufferError::OutOfMemory` if the copy cannot be allocated; the buffer
    /// is unchanged in that case.
    pub fn make_writable(&mut self) -> Result<()> {
        let Some(previous) = &self.storage else {
            return Ok(());
        };
        if BufferStorage::is_unique(previous) {
            return Ok(());
        }

        let old = self.layout;
        let internal = old.internal_size();
        let storage = BufferStorage::allocate(internal)?;
        storage
            .bytes_mut()
            .copy_from_slice(&previous.bytes()[old.start..old.internal_end()]);
        storage.set_dirty(0, internal);

        tracing::trace!(internal, "copied shared buffer bytes before writing");

        self.layout = Layout::placed(0, old.header_len(), old.zero_size(), old.trailer_len());
        self.storage = Some(storage);
        self.claim.set(Claim::default());
        Ok(())
    }

    /// Cursor on the first logical byte.
    pub fn begin(&self) -> ConstBufferIterator<'_> {
        ConstBufferIterator::new(self, false)
    }

    /// Cursor one past the last logical byte.
    pub fn end(&self) -> ConstBufferIterator<'_> {
        ConstBufferIterator::new(self, true)
    }

    /// Writable cursor on the first logical byte.
    pub fn begin_mut(&mut self) -> BufferIterator<'_> {
        BufferIterator::new(self, false)
    }

    /// Writable cursor one past the last logical byte.
    pub fn end_mut(&mut self) -> BufferIterator<'_> {
        BufferIterator::new(self, true)
    }

    /// Grow the buffer by `size` real bytes in front of the current start.
    ///
    /// The new bytes are exclusively owned by this view. Their content is
    /// unspecified until written.
    ///
    /// # Errors
    /// `BufferError::BadSize` or `OutOfMemory` if a reallocation is needed and
    /// fails; the buffer is unchanged in that case.
    pub fn add_at_start(&mut self, size: usize) -> Result<Growth> {
        self.grow(Side::Start, size)
    }

    /// Grow the buffer by `size` real bytes after the current end.
    ///
    /// # Errors
    /// Same as [`add_at_start`](Self::add_at_start).
    pub fn add_at_end(&mut self, size: usize) -> Result<Growth> {
        self.grow(Side::End, size)
    }

    /// Drop `size` logical bytes from the front. Removing more than `size()`
    /// releases the storage.
    pub fn remove_at_start(&mut self, size: usize) {
        if size > self.size() {
            self.release();
            return;
        }

        let l = &mut self.layout;
        let new_start = l.start + size;
        if new_start <= l.zero_start {
            l.start = new_start;
        } else if new_start <= l.zero_end {
            // header gone, zero span shortened from the front
            let delta = new_start - l.zero_start;
            l.start = l.zero_start;
            l.zero_end -= delta;
            l.end -= delta;
        } else {
            // header and zero span gone, realign to internal coordinates
            let zero = l.zero_size();
            l.start = new_start - zero;
            l.end -= zero;
            l.zero_start = l.start;
            l.zero_end = l.start;
        }
    }

    /// Drop `size` logical bytes from the back. Removing more than `size()`
    /// releases the storage.
    pub fn remove_at_end(&mut self, size: usize) {
        if size > self.size() {
            self.release();
            return;
        }

        let l = &mut self.layout;
        let new_end = l.end - size;
        if new_end >= l.zero_end {
            l.end = new_end;
        } else if new_end >= l.zero_start {
            l.end = new_end;
            l.zero_end = new_end;
        } else {
            l.end = new_end;
            l.zero_end = new_end;
            l.zero_start = new_end;
        }
    }

    /// View of `size` bytes starting at `start`, sharing this buffer's storage.
    ///
    /// # Errors
    /// Returns `BufferError::OutOfRange` if `start + size > self.size()`.
    pub fn make_fragment(&self, start: usize, size: usize) -> Result<ZcBuffer> {
        let total = self.size();
        let end = start.checked_add(size).filter(|&end| end <= total).ok_or(
            BufferError::OutOfRange {
                offset: start,
                len: size,
                size: total,
            },
        )?;

        let mut fragment = self.clone();
        fragment.remove_at_start(start);
        fragment.remove_at_end(total - end);
        debug_assert_eq!(fragment.size(), size);
        Ok(fragment)
    }

    /// Fully real copy of this buffer, with the zero span written out as
    /// explicit zero bytes. Shares storage when there is no zero span.
    pub fn make_real_buffer(&self) -> Result<ZcBuffer> {
        if !self.is_zero_compressed() {
            return Ok(self.clone());
        }

        let size = self.size();
        let storage = BufferStorage::allocate(size)?;
        self.layout
            .gather(self.storage(), self.layout.start, &mut storage.bytes_mut()[..]);
        storage.set_dirty(0, size);

        tracing::trace!(size, zero = self.zero_size(), "realized zero-compressed buffer");

        Ok(ZcBuffer {
            storage: Some(storage),
            layout: Layout::placed(0, size, 0, 0),
            claim: Cell::default(),
        })
    }

    /// Replace this buffer with its fully real form.
    pub fn realize(&mut self) -> Result<()> {
        if self.is_zero_compressed() {
            *self = self.make_real_buffer()?;
        }
        Ok(())
    }

    /// Copy up to `dst.len()` logical bytes into `dst`; returns the count copied.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.size());
        self.layout
            .gather(self.storage(), self.layout.start, &mut dst[..n]);
        n
    }

    /// All logical bytes, zero span included.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.size()];
        self.copy_to(&mut out);
        out
    }

    /// Append the logical bytes of `other` after this buffer's end.
    ///
    /// An all-zero `other` extends the zero span when this buffer has no
    /// trailer, without touching storage.
    pub fn append(&mut self, other: &ZcBuffer) -> Result<Growth> {
        let n = other.size();
        if n == 0 {
            return Ok(Growth::InPlace);
        }

        if other.internal_size() == 0 && self.layout.trailer_len() == 0 {
            check_logical(self.layout.end, n)?;
            self.layout.zero_end += n;
            self.layout.end += n;
            return Ok(Growth::InPlace);
        }

        let bytes = other.to_vec();
        let at = self.size();
        let growth = self.add_at_end(n)?;
        self.layout
            .scatter(self.storage(), Access::All, self.layout.start + at, &bytes)?;
        Ok(growth)
    }

    /// Prepend the logical bytes of `other` before this buffer's start.
    ///
    /// An all-zero `other` extends the zero span when this buffer has no
    /// header, without touching storage.
    pub fn prepend(&mut self, other: &ZcBuffer) -> Result<Growth> {
        let n = other.size();
        if n == 0 {
            return Ok(Growth::InPlace);
        }

        if other.internal_size() == 0 && self.layout.header_len() == 0 {
            check_logical(self.layout.end, n)?;
            self.layout.zero_end += n;
            self.layout.end += n;
            return Ok(Growth::InPlace);
        }

        let bytes = other.to_vec();
        let growth = self.add_at_start(n)?;
        self.layout
            .scatter(self.storage(), Access::All, self.layout.start, &bytes)?;
        Ok(growth)
    }

    fn release(&mut self) {
        self.storage = None;
        self.layout = Layout::default();
        self.claim.set(Claim::default());
    }

    /// Decide the cheapest safe growth tier for `size` bytes on `side`.
    fn plan(&self, side: Side, size: usize) -> Growth {
        let Some(storage) = &self.storage else {
            return Growth::Reallocated;
        };

        let layout = &self.layout;
        let (room, unclaimed) = match side {
            Side::Start => (layout.start, storage.front_is_free(layout.start)),
            Side::End => {
                let internal_end = layout.internal_end();
                (
                    storage.capacity() - internal_end,
                    storage.back_is_free(internal_end),
                )
            }
        };

        if BufferStorage::is_unique(storage) {
            if room >= size {
                Growth::InPlace
            } else if storage.capacity() - layout.internal_size() >= size {
                Growth::Moved
            } else {
                Growth::Reallocated
            }
        } else if room >= size && unclaimed {
            Growth::InPlace
        } else {
            Growth::Reallocated
        }
    }

    fn grow(&mut self, side: Side, size: usize) -> Result<Growth> {
        if size == 0 {
            return Ok(Growth::InPlace);
        }
        check_logical(self.layout.end, size)?;

        let growth = self.plan(side, size);
        let old = self.layout;
        let internal = old.internal_size();

        match (growth, &self.storage) {
            (Growth::InPlace, Some(storage)) => {
                match side {
                    Side::Start => self.layout.start -= size,
                    Side::End => self.layout.end += size,
                }
                let l = &self.layout;
                if BufferStorage::is_unique(storage) {
                    storage.set_dirty(l.start, l.internal_end());
                } else {
                    storage.claim_front(l.start);
                    storage.claim_back(l.internal_end());

                    // the new bytes belong to this view alone
                    let mut claim = self.claim.get();
                    match side {
                        Side::Start => claim.front_end = claim.front_end.max(old.start),
                        Side::End => claim.back_start = claim.back_start.min(old.internal_end()),
                    }
                    self.claim.set(claim);
                }
                Ok(Growth::InPlace)
            }
            (Growth::Moved, Some(storage)) => {
                let capacity = storage.capacity();
                let base = match side {
                    Side::Start => capacity - internal,
                    Side::End => 0,
                };
                storage
                    .bytes_mut()
                    .copy_within(old.start..old.internal_end(), base);
                self.layout = Self::grown_layout(side, base, &old, size);
                self.claim.set(Claim::default());
                let l = &self.layout;
                storage.set_dirty(l.start, l.internal_end());

                tracing::debug!(?side, size, internal, capacity, "moved buffer bytes in place");
                Ok(Growth::Moved)
            }
            (_, previous) => {
                let needed = internal + size;
                let capacity = match previous {
                    None => needed,
                    Some(_) => needed.saturating_mul(2).min(MAX_CAPACITY).max(needed),
                };
                let storage = BufferStorage::allocate(capacity)?;
                let base = match side {
                    Side::Start => capacity - internal,
                    Side::End => 0,
                };
                if let Some(previous) = previous {
                    storage.bytes_mut()[base..base + internal]
                        .copy_from_slice(&previous.bytes()[old.start..old.internal_end()]);
                }

                tracing::debug!(
                    ?side,
                    size,
                    internal,
                    capacity,
                    shared = previous
                        .as_ref()
                        .is_some_and(|p| !BufferStorage::is_unique(p)),
                    "reallocated buffer storage"
                );

                let layout = Self::grown_layout(side, base, &old, size);
                storage.set_dirty(layout.start, layout.internal_end());
                self.layout = layout;
                self.storage = Some(storage);
                self.claim.set(Claim::default());
                Ok(Growth::Reallocated)
            }
        }
    }

    /// Layout after growing `old` by `size` on `side`, with the existing real
    /// bytes starting at internal offset `base`.
    fn grown_layout(side: Side, base: usize, old: &Layout, size: usize) -> Layout {
        match side {
            Side::Start => Layout::placed(
                base - size,
                old.header_len() + size,
                old.zero_size(),
                old.trailer_len(),
            ),
            Side::End => Layout::placed(
                base,
                old.header_len(),
                old.zero_size(),
                old.trailer_len() + size,
            ),
        }
    }
}

/// Reject logical sizes whose coordinates would overflow.
fn check_logical(base: usize, extra: usize) -> Result<()> {
    match base.checked_add(extra) {
        Some(_) => Ok(()),
        None => Err(BufferError::BadSize {
            requested: extra,
            max: usize::MAX - base,
        }
        .into()),
    }
}

impl fmt::Debug for ZcBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZcBuffer")
            .field("size", &self.size())
            .field("header", &self.layout.header_len())
            .field("zero", &self.layout.zero_size())
            .field("trailer", &self.layout.trailer_len())
            .field("capacity", &self.capacity())
            .field("refs", &self.storage_ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn write_all(buffer: &mut ZcBuffer, data: &[u8]) {
        buffer.begin_mut().write_bytes(data).unwrap();
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = ZcBuffer::new();
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(buffer.storage_ref_count(), 0);
        assert!(buffer.begin() == buffer.end());
    }

    #[test]
    fn test_capacity_constructor_parks_at_end() {
        let buffer = ZcBuffer::with_capacity(128).unwrap();
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.capacity(), 128);
        assert_eq!(buffer.layout().start, 128);
    }

    #[test]
    fn test_zero_area_constructors() {
        let buffer = ZcBuffer::with_zero_area(16, 100).unwrap();
        assert_eq!(buffer.size(), 100);
        assert_eq!(buffer.internal_size(), 0);
        assert!(buffer.to_vec().iter().all(|&b| b == 0));

        let buffer = ZcBuffer::with_zero_area_at(1000, 700, 300).unwrap();
        assert_eq!(buffer.size(), 300);
        assert_eq!(buffer.zero_size(), 300);

        assert!(ZcBuffer::with_zero_area_at(10, 11, 1).is_err());
    }

    #[test]
    fn test_literal_scenario_size_500() {
        let mut buffer = ZcBuffer::with_zero_area_at(1000, 700, 300).unwrap();
        assert_eq!(buffer.add_at_start(100).unwrap(), Growth::InPlace);
        assert_eq!(buffer.add_at_end(100).unwrap(), Growth::InPlace);
        assert_eq!(buffer.size(), 500);
        assert_eq!(buffer.internal_size(), 200);
        assert_eq!(buffer.capacity(), 1000);
    }

    #[test]
    fn test_first_growth_allocates_exactly() {
        let mut buffer = ZcBuffer::new();
        assert_eq!(buffer.add_at_start(12).unwrap(), Growth::Reallocated);
        assert_eq!(buffer.capacity(), 12);
        assert_eq!(buffer.size(), 12);
    }

    #[test]
    fn test_sole_owner_tiers() {
        let mut buffer = ZcBuffer::with_capacity(10).unwrap();
        assert_eq!(buffer.add_at_start(4).unwrap(), Growth::InPlace);
        write_all(&mut buffer, &[1, 2, 3, 4]);

        // no tail room, but 6 free bytes in front: move
        assert_eq!(buffer.add_at_end(2).unwrap(), Growth::Moved);
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(&buffer.to_vec()[..4], &[1, 2, 3, 4]);

        // capacity exhausted: reallocate
        assert_eq!(buffer.add_at_end(10).unwrap(), Growth::Reallocated);
        assert!(buffer.capacity() >= 16);
        assert_eq!(&buffer.to_vec()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_repeated_headers_amortized() {
        let mut buffer = ZcBuffer::new();
        let mut reallocations = 0;
        for _ in 0..256 {
            if buffer.add_at_start(4).unwrap() == Growth::Reallocated {
                reallocations += 1;
            }
        }
        assert_eq!(buffer.size(), 1024);
        assert!(reallocations <= 10, "reallocated {reallocations} times");
    }

    #[test]
    fn test_shared_growth_respects_watermark() {
        let mut original = ZcBuffer::with_capacity(64).unwrap();
        original.add_at_start(8).unwrap();
        write_all(&mut original, &[7; 8]);

        let mut copy = original.clone();
        assert_eq!(original.storage_ref_count(), 2);

        // first copy to grow claims the free head-room in place
        assert_eq!(copy.add_at_start(4).unwrap(), Growth::InPlace);
        assert!(copy.shares_storage_with(&original));
        write_all(&mut copy, &[1, 1, 1, 1]);

        // the other copy finds that head-room claimed and reallocates
        assert_eq!(original.add_at_start(4).unwrap(), Growth::Reallocated);
        assert!(!copy.shares_storage_with(&original));
        write_all(&mut original, &[2, 2, 2, 2]);

        assert_eq!(copy.to_vec(), [&[1u8; 4][..], &[7u8; 8][..]].concat());
        assert_eq!(original.to_vec(), [&[2u8; 4][..], &[7u8; 8][..]].concat());
    }

    #[test]
    fn test_shared_growth_after_shrink_reallocates() {
        let mut original = ZcBuffer::from_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        let mut fragment = original.make_fragment(2, 2).unwrap();

        // bytes in front of the fragment still belong to `original`
        assert_eq!(fragment.add_at_start(2).unwrap(), Growth::Reallocated);
        write_all(&mut fragment, &[9, 9]);

        assert_eq!(fragment.to_vec(), vec![9, 9, 3, 4]);
        assert_eq!(original.to_vec(), vec![1, 2, 3, 4, 5, 6]);

        // sole owner again: in-place growth is back
        drop(fragment);
        original.remove_at_start(2);
        assert_eq!(original.add_at_start(2).unwrap(), Growth::InPlace);
    }

    #[test]
    fn test_write_through_copy_leaves_original_intact() {
        let original = ZcBuffer::from_slice(&[1, 2, 3, 4]).unwrap();
        let mut copy = original.clone();
        assert!(!copy.is_writable());

        let result = copy.begin_mut().write_u8(9);
        assert!(matches!(
            result,
            Err(Error::Buffer(BufferError::SharedWrite { offset: 0, len: 1 }))
        ));
        assert_eq!(original.to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(copy.to_vec(), vec![1, 2, 3, 4]);

        copy.make_writable().unwrap();
        assert!(copy.is_writable());
        assert!(!copy.shares_storage_with(&original));
        copy.begin_mut().write_u8(9).unwrap();

        assert_eq!(copy.to_vec(), vec![9, 2, 3, 4]);
        assert_eq!(original.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_original_locked_while_fragment_alive() {
        let mut original = ZcBuffer::from_parts(&[1, 2], 3, &[8, 9]).unwrap();
        let fragment = original.make_fragment(1, 5).unwrap();

        let mut it = original.end_mut();
        it.move_backward(1).unwrap();
        assert!(matches!(
            it.write_u8(0),
            Err(Error::Buffer(BufferError::SharedWrite { offset: 6, len: 1 }))
        ));
        assert_eq!(fragment.to_vec(), vec![2, 0, 0, 0, 8]);

        drop(fragment);
        write_all(&mut original, &[5, 6]);
        assert_eq!(original.to_vec(), vec![5, 6, 0, 0, 0, 8, 9]);
    }

    #[test]
    fn test_claimed_growth_is_writable_over_shared_storage() {
        let mut original = ZcBuffer::with_capacity(64).unwrap();
        original.add_at_start(8).unwrap();
        write_all(&mut original, &[7; 8]);

        let mut copy = original.clone();
        assert_eq!(copy.add_at_start(4).unwrap(), Growth::InPlace);

        // the four new bytes are the copy's alone, the old eight are not
        let mut it = copy.begin_mut();
        it.write_bytes(&[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            it.write_u8(0),
            Err(Error::Buffer(BufferError::SharedWrite { offset: 4, len: 1 }))
        ));
        let mut it = copy.begin_mut();
        assert!(it.write_bytes(&[0; 5]).is_err());

        assert_eq!(original.to_vec(), vec![7; 8]);
        assert_eq!(copy.to_vec(), [&[1u8, 2, 3, 4][..], &[7u8; 8][..]].concat());

        // cloning again hands the claimed bytes to both views
        let third = copy.clone();
        assert!(copy.begin_mut().write_u8(0).is_err());
        assert_eq!(third.to_vec(), copy.to_vec());
    }

    #[test]
    fn test_remove_eats_into_zero_span() {
        let mut buffer = ZcBuffer::from_parts(&[1, 2], 4, &[3, 4]).unwrap();

        buffer.remove_at_start(3);
        assert_eq!(buffer.to_vec(), vec![0, 0, 0, 3, 4]);
        assert_eq!(buffer.zero_size(), 3);

        buffer.remove_at_end(1);
        assert_eq!(buffer.to_vec(), vec![0, 0, 0, 3]);

        buffer.remove_at_start(3);
        assert_eq!(buffer.to_vec(), vec![3]);
        assert_eq!(buffer.zero_size(), 0);

        // trailer still writable after realignment
        buffer.begin_mut().write_u8(8).unwrap();
        assert_eq!(buffer.to_vec(), vec![8]);
    }

    #[test]
    fn test_remove_at_end_through_zero_span() {
        let mut buffer = ZcBuffer::from_parts(&[1, 2], 4, &[3, 4]).unwrap();
        buffer.remove_at_end(4);
        assert_eq!(buffer.to_vec(), vec![1, 2, 0, 0]);
        buffer.remove_at_end(3);
        assert_eq!(buffer.to_vec(), vec![1]);
        assert_eq!(buffer.zero_size(), 0);
    }

    #[test]
    fn test_remove_everything() {
        let mut buffer = ZcBuffer::from_slice(&[1, 2, 3]).unwrap();
        buffer.remove_at_start(3);
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.storage_ref_count(), 1);

        let mut buffer = ZcBuffer::from_slice(&[1, 2, 3]).unwrap();
        buffer.remove_at_end(4);
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.storage_ref_count(), 0);
    }

    #[test]
    fn test_make_fragment() {
        let buffer = ZcBuffer::from_parts(&[1, 2, 3], 3, &[4, 5, 6]).unwrap();

        let fragment = buffer.make_fragment(2, 3).unwrap();
        assert_eq!(fragment.to_vec(), vec![3, 0, 0]);
        assert!(fragment.shares_storage_with(&buffer));
        assert_eq!(buffer.storage_ref_count(), 2);

        let tail = buffer.make_fragment(5, 4).unwrap();
        assert_eq!(tail.to_vec(), vec![0, 4, 5, 6]);

        assert!(buffer.make_fragment(5, 5).is_err());
        assert!(buffer.make_fragment(usize::MAX, 2).is_err());
        assert_eq!(buffer.make_fragment(9, 0).unwrap().size(), 0);
    }

    #[test]
    fn test_realize() {
        let mut buffer = ZcBuffer::from_parts(&[1], 3, &[2]).unwrap();
        let before = buffer.to_vec();

        buffer.realize().unwrap();
        assert_eq!(buffer.zero_size(), 0);
        assert_eq!(buffer.internal_size(), 5);
        assert_eq!(buffer.to_vec(), before);

        // realized bytes are writable
        let mut it = buffer.begin_mut();
        it.move_forward(2).unwrap();
        it.write_u8(5).unwrap();
        assert_eq!(buffer.to_vec(), vec![1, 0, 5, 0, 2]);
    }

    #[test]
    fn test_make_real_buffer_shares_when_uncompressed() {
        let buffer = ZcBuffer::from_slice(&[1, 2]).unwrap();
        let real = buffer.make_real_buffer().unwrap();
        assert!(real.shares_storage_with(&buffer));
    }

    #[test]
    fn test_copy_to_clamps() {
        let buffer = ZcBuffer::from_parts(&[1], 2, &[3]).unwrap();

        let mut small = [9u8; 2];
        assert_eq!(buffer.copy_to(&mut small), 2);
        assert_eq!(small, [1, 0]);

        let mut large = [9u8; 6];
        assert_eq!(buffer.copy_to(&mut large), 4);
        assert_eq!(large, [1, 0, 0, 3, 9, 9]);
    }

    #[test]
    fn test_append_and_prepend() {
        let mut buffer = ZcBuffer::from_slice(&[3, 4]).unwrap();
        buffer.append(&ZcBuffer::from_parts(&[5], 1, &[6]).unwrap()).unwrap();
        buffer.prepend(&ZcBuffer::from_slice(&[1, 2]).unwrap()).unwrap();
        assert_eq!(buffer.to_vec(), vec![1, 2, 3, 4, 5, 0, 6]);
    }

    #[test]
    fn test_append_zero_keeps_compression() {
        let mut buffer = ZcBuffer::from_slice(&[1, 2]).unwrap();
        let zeros = ZcBuffer::with_zero_area(0, 1000).unwrap();

        assert_eq!(buffer.append(&zeros).unwrap(), Growth::InPlace);
        assert_eq!(buffer.size(), 1002);
        assert_eq!(buffer.internal_size(), 2);

        let mut empty = ZcBuffer::new();
        empty.prepend(&zeros).unwrap();
        empty.prepend(&zeros).unwrap();
        assert_eq!(empty.size(), 2000);
        assert_eq!(empty.internal_size(), 0);

        // growing a storage-less zero buffer allocates only the real bytes
        assert_eq!(empty.add_at_start(4).unwrap(), Growth::Reallocated);
        assert_eq!(empty.capacity(), 4);
        assert_eq!(empty.size(), 2004);
    }

    #[test]
    fn test_append_self_copy() {
        let mut buffer = ZcBuffer::from_slice(&[1, 2, 3]).unwrap();
        let copy = buffer.clone();
        buffer.append(&copy).unwrap();
        assert_eq!(buffer.to_vec(), vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(copy.to_vec(), vec![1, 2, 3]);
    }
}
