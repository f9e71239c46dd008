//! Bounds-checked cursors over a [`ZcBuffer`](super::ZcBuffer).
//!
//! Both cursor types address the buffer's logical bytes: reads inside the
//! zero-compressed span yield zeros, writes into it are rejected. Positions
//! live in `[start, end]` of the view the cursor was created from; moving
//! past either edge is an error rather than undefined behavior.
//!
//! # Example
//! ```
//! use packet_sim_core::buffer::{Endian, ZcBuffer};
//!
//! let mut buffer = ZcBuffer::new();
//! buffer.add_at_start(6).unwrap();
//!
//! let mut it = buffer.begin_mut();
//! it.write(0xBEEF_u16, Endian::Big).unwrap();
//! it.write(7_u32, Endian::Little).unwrap();
//!
//! let mut it = buffer.begin();
//! assert_eq!(it.read::<u16>(Endian::Big).unwrap(), 0xBEEF);
//! assert_eq!(it.read::<u32>(Endian::Little).unwrap(), 7);
//! assert!(it.is_end());
//! ```

use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use super::storage::BufferStorage;
use super::zc_buffer::{Access, Layout, ZcBuffer};
use crate::error::{BufferError, Result};

/// Byte order for typed reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Host byte order
    #[default]
    Native,
    /// Least significant byte first
    Little,
    /// Most significant byte first (network order)
    Big,
}

impl Endian {
    const HOST_IS_LITTLE: bool = cfg!(target_endian = "little");

    /// Whether values in this order must be byte-swapped on this host.
    fn needs_swap(self) -> bool {
        match self {
            Endian::Native => false,
            Endian::Little => !Self::HOST_IS_LITTLE,
            Endian::Big => Self::HOST_IS_LITTLE,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-size integral or floating value that can be read from or written to
/// a buffer.
pub trait Scalar: Copy + sealed::Sealed {
    /// Encoded width in bytes.
    const SIZE: usize;

    #[doc(hidden)]
    fn store_ne(self, out: &mut [u8]);

    #[doc(hidden)]
    fn load_ne(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn store_ne(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                fn load_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

/// Widest supported scalar (u128/i128).
const MAX_SCALAR: usize = 16;

/// Reorder an encoded scalar between host and foreign byte order.
fn swap_order(bytes: &mut [u8]) {
    match bytes.len() {
        0 | 1 => {}
        2 => bytes.swap(0, 1),
        4 => {
            bytes.swap(0, 3);
            bytes.swap(1, 2);
        }
        _ => bytes.reverse(),
    }
}

/// Read-only cursor over a buffer view.
#[derive(Debug, Clone)]
pub struct ConstBufferIterator<'a> {
    storage: Option<&'a BufferStorage>,
    layout: Layout,
    /// Absolute position in the view's coordinates, `start <= current <= end`
    current: usize,
}

impl<'a> ConstBufferIterator<'a> {
    pub(crate) fn new(buffer: &'a ZcBuffer, at_end: bool) -> Self {
        let layout = buffer.layout();
        Self {
            storage: buffer.storage(),
            layout,
            current: if at_end { layout.end } else { layout.start },
        }
    }

    /// Distance from the start of the view.
    pub fn offset(&self) -> usize {
        self.current - self.layout.start
    }

    /// Logical size of the underlying view.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Bytes left between the cursor and the end of the view.
    pub fn remaining(&self) -> usize {
        self.layout.end - self.current
    }

    /// Whether the cursor sits on the first byte.
    pub fn is_start(&self) -> bool {
        self.current == self.layout.start
    }

    /// Whether the cursor sits one past the last byte.
    pub fn is_end(&self) -> bool {
        self.current == self.layout.end
    }

    /// Advance the cursor by `delta` bytes.
    ///
    /// # Errors
    /// Returns `BufferError::CursorOutOfRange` if the cursor would pass the end.
    pub fn move_forward(&mut self, delta: usize) -> Result<()> {
        self.check_remaining(delta)?;
        self.current += delta;
        Ok(())
    }

    /// Move the cursor back by `delta` bytes.
    ///
    /// # Errors
    /// Returns `BufferError::CursorOutOfRange` if the cursor would pass the start.
    pub fn move_backward(&mut self, delta: usize) -> Result<()> {
        let offset = self.offset();
        if delta > offset {
            return Err(BufferError::CursorOutOfRange {
                offset,
                requested: delta,
                available: offset,
            }
            .into());
        }
        self.current -= delta;
        Ok(())
    }

    /// Signed byte distance `self - other`.
    ///
    /// # Errors
    /// - `BufferError::StorageMismatch` if the iterators do not share storage
    /// - `BufferError::DistanceOverflow` if the gap does not fit an `isize`
    pub fn distance(&self, other: &Self) -> Result<isize> {
        if !self.same_storage(other) {
            return Err(BufferError::StorageMismatch.into());
        }
        let (magnitude, negative) = if self.current >= other.current {
            (self.current - other.current, false)
        } else {
            (other.current - self.current, true)
        };
        let magnitude = isize::try_from(magnitude).map_err(|_| BufferError::DistanceOverflow {
            distance: magnitude,
        })?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read(Endian::Native)
    }

    /// Read a typed value stored in `endian` order.
    ///
    /// # Errors
    /// Returns `BufferError::CursorOutOfRange` if fewer than `T::SIZE` bytes remain.
    pub fn read<T: Scalar>(&mut self, endian: Endian) -> Result<T> {
        let mut raw = [0u8; MAX_SCALAR];
        let raw = &mut raw[..T::SIZE];
        self.read_bytes(raw)?;
        if endian.needs_swap() {
            swap_order(raw);
        }
        Ok(T::load_ne(raw))
    }

    /// Read a big-endian (network order) value.
    pub fn read_be<T: Scalar>(&mut self) -> Result<T> {
        self.read(Endian::Big)
    }

    /// Read a little-endian value.
    pub fn read_le<T: Scalar>(&mut self) -> Result<T> {
        self.read(Endian::Little)
    }

    /// Fill `dst` with the next `dst.len()` logical bytes.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_remaining(dst.len())?;
        self.layout.gather(self.storage, self.current, dst);
        self.current += dst.len();
        Ok(())
    }

    fn check_remaining(&self, requested: usize) -> Result<()> {
        let available = self.remaining();
        if requested > available {
            return Err(BufferError::CursorOutOfRange {
                offset: self.offset(),
                requested,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn same_storage(&self, other: &Self) -> bool {
        match (self.storage, other.storage) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for ConstBufferIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.same_storage(other) && self.current == other.current
    }
}

impl PartialOrd for ConstBufferIterator<'_> {
    /// Iterators over different storages are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.same_storage(other) {
            Some(self.current.cmp(&other.current))
        } else {
            None
        }
    }
}

/// Read-write cursor over a buffer view.
///
/// Dereferences to [`ConstBufferIterator`] for moves and reads. Writes are
/// only accepted in the real header and trailer bytes of the view, and, while
/// the storage is shared, only in bytes this view claimed by growing.
#[derive(Debug)]
pub struct BufferIterator<'a> {
    inner: ConstBufferIterator<'a>,
    access: Access,
}

impl<'a> BufferIterator<'a> {
    pub(crate) fn new(buffer: &'a mut ZcBuffer, at_end: bool) -> Self {
        let buffer: &'a ZcBuffer = buffer;
        Self {
            inner: ConstBufferIterator::new(buffer, at_end),
            access: buffer.access(),
        }
    }

    /// Write one byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(value, Endian::Native)
    }

    /// Write a typed value in `endian` order.
    ///
    /// # Errors
    /// - `BufferError::CursorOutOfRange` if fewer than `T::SIZE` bytes remain
    /// - `BufferError::ZeroAreaWrite` if the bytes overlap the zero span
    pub fn write<T: Scalar>(&mut self, value: T, endian: Endian) -> Result<()> {
        let mut raw = [0u8; MAX_SCALAR];
        let raw = &mut raw[..T::SIZE];
        value.store_ne(raw);
        if endian.needs_swap() {
            swap_order(raw);
        }
        self.write_bytes(raw)
    }

    /// Write a big-endian (network order) value.
    pub fn write_be<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.write(value, Endian::Big)
    }

    /// Write a little-endian value.
    pub fn write_le<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.write(value, Endian::Little)
    }

    /// Copy `src` into the buffer at the cursor.
    ///
    /// # Errors
    /// - `BufferError::CursorOutOfRange` if fewer than `src.len()` bytes remain
    /// - `BufferError::ZeroAreaWrite` if the bytes overlap the zero span
    /// - `BufferError::SharedWrite` if another view of the storage sees them
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        let it = &mut self.inner;
        it.check_remaining(src.len())?;
        it.layout.scatter(it.storage, self.access, it.current, src)?;
        it.current += src.len();
        Ok(())
    }

    /// Write `len` copies of `value`.
    pub fn fill(&mut self, value: u8, len: usize) -> Result<()> {
        let it = &mut self.inner;
        it.check_remaining(len)?;
        it.layout.fill(it.storage, self.access, it.current, len, value)?;
        it.current += len;
        Ok(())
    }

}

impl<'a> Deref for BufferIterator<'a> {
    type Target = ConstBufferIterator<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for BufferIterator<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl PartialEq for BufferIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}
