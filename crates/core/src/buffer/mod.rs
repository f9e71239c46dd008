//! Zero-compressed, copy-on-write byte buffers.
//!
//! - [`BufferStorage`]: reference-counted byte arena with a dirty watermark
//! - [`ZcBuffer`]: a view over a storage with a logical zero span
//! - [`ConstBufferIterator`] / [`BufferIterator`]: bounds-checked cursors

mod iterator;
mod storage;
mod zc_buffer;

pub use iterator::{BufferIterator, ConstBufferIterator, Endian, Scalar};
pub use storage::{BufferStorage, MAX_CAPACITY};
pub use zc_buffer::{Growth, ZcBuffer};
