//! Packets: a zero-compressed byte buffer plus the tags attached to it.
//!
//! A [`Packet`] pairs one [`ZcBuffer`] with one [`TagList`] and keeps their
//! windows in step: every operation that grows, shrinks, splits or joins the
//! bytes performs the matching tag-list operation with the same size.
//!
//! Two kinds of tags ride on a packet:
//! - **byte tags** cover a byte range and follow those bytes through
//!   fragmentation and reassembly
//! - **packet tags** describe the packet as a whole, at most one per id
//!
//! # Protocol headers
//!
//! Types implementing [`Header`] or [`Trailer`] serialize themselves through
//! buffer iterators; [`Packet::push_header`] and friends reserve the room and
//! hand out the iterator.
//!
//! ```text
//! push_header  ->  [ header | payload ]  <-  push_trailer
//!                  ^ begin          end ^
//! ```
//!
//! # Identity
//!
//! Every freshly built packet gets a process-wide unique `uid`. Copies and
//! fragments keep the uid of the packet they came from.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::{BufferIterator, ConstBufferIterator, Growth, ZcBuffer};
use crate::error::{PacketError, Result};
use crate::tag::{ByteTagSpan, Tag, TagId, TagList};

/// Real bytes reserved in front of a zero payload for headers.
pub const DEFAULT_HEADROOM: usize = 64;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

/// A protocol header written at the front of a packet.
pub trait Header: Sized {
    /// Number of bytes [`Header::serialize`] writes.
    fn serialized_size(&self) -> usize;

    /// Write the header starting at `it`.
    fn serialize(&self, it: &mut BufferIterator<'_>) -> Result<()>;

    /// Read a header starting at `it`.
    fn deserialize(it: &mut ConstBufferIterator<'_>) -> Result<Self>;
}

/// A protocol trailer written at the back of a packet.
pub trait Trailer: Sized {
    /// Number of bytes [`Trailer::serialize`] writes.
    fn serialized_size(&self) -> usize;

    /// Write the trailer starting at `it`, which points `serialized_size()`
    /// bytes before the end.
    fn serialize(&self, it: &mut BufferIterator<'_>) -> Result<()>;

    /// Read a trailer given an iterator at the end of the packet.
    fn deserialize(end: ConstBufferIterator<'_>) -> Result<Self>;
}

/// Bytes plus byte tags plus packet tags.
#[derive(Clone)]
pub struct Packet {
    buffer: ZcBuffer,
    byte_tags: TagList,
    packet_tags: Vec<Tag>,
    uid: u64,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    /// Empty packet.
    pub fn new() -> Self {
        Self {
            buffer: ZcBuffer::new(),
            byte_tags: TagList::new(),
            packet_tags: Vec::new(),
            uid: next_uid(),
        }
    }

    /// Packet over an existing buffer, without tags.
    ///
    /// # Errors
    /// Returns `TagError::CoordinateOverflow` if the buffer is larger than the
    /// byte-tag coordinate space.
    pub fn from_buffer(buffer: ZcBuffer) -> Result<Self> {
        Ok(Self {
            byte_tags: TagList::with_buffer_size(buffer.size())?,
            buffer,
            packet_tags: Vec::new(),
            uid: next_uid(),
        })
    }

    /// Packet holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Self::from_buffer(ZcBuffer::from_slice(data)?)
    }

    /// Packet of `size` zero bytes that occupy no storage, with
    /// [`DEFAULT_HEADROOM`] real bytes reserved for headers.
    pub fn with_zero_payload(size: usize) -> Result<Self> {
        Self::from_buffer(ZcBuffer::with_zero_area(DEFAULT_HEADROOM, size)?)
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Logical size in bytes.
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &ZcBuffer {
        &self.buffer
    }

    pub fn byte_tag_list(&self) -> &TagList {
        &self.byte_tags
    }

    pub fn begin(&self) -> ConstBufferIterator<'_> {
        self.buffer.begin()
    }

    pub fn end(&self) -> ConstBufferIterator<'_> {
        self.buffer.end()
    }

    /// Grow the front by `size` bytes.
    ///
    /// # Errors
    /// Buffer allocation errors, or `TagError::CoordinateOverflow`. The
    /// packet is unchanged on error.
    pub fn add_header(&mut self, size: usize) -> Result<Growth> {
        let growth = self.buffer.add_at_start(size)?;
        if let Err(e) = self.byte_tags.add_at_start(size) {
            self.buffer.remove_at_start(size);
            return Err(e);
        }
        Ok(growth)
    }

    /// Grow the back by `size` bytes.
    ///
    /// # Errors
    /// Same as [`Packet::add_header`].
    pub fn add_trailer(&mut self, size: usize) -> Result<Growth> {
        let growth = self.buffer.add_at_end(size)?;
        if let Err(e) = self.byte_tags.add_at_end(size) {
            self.buffer.remove_at_end(size);
            return Err(e);
        }
        Ok(growth)
    }

    /// Drop `size` bytes from the front.
    ///
    /// # Errors
    /// Returns `PacketError::TooShort` if the packet has fewer bytes.
    pub fn remove_header(&mut self, size: usize) -> Result<()> {
        self.check_len(size)?;
        self.buffer.remove_at_start(size);
        self.byte_tags.remove_at_start(size);
        Ok(())
    }

    /// Drop `size` bytes from the back.
    ///
    /// # Errors
    /// Returns `PacketError::TooShort` if the packet has fewer bytes.
    pub fn remove_trailer(&mut self, size: usize) -> Result<()> {
        self.check_len(size)?;
        self.buffer.remove_at_end(size);
        self.byte_tags.remove_at_end(size);
        Ok(())
    }

    /// Serialize `header` into freshly added front bytes.
    pub fn push_header<H: Header>(&mut self, header: &H) -> Result<Growth> {
        let size = header.serialized_size();
        let growth = self.add_header(size)?;
        if let Err(e) = header.serialize(&mut self.buffer.begin_mut()) {
            self.buffer.remove_at_start(size);
            self.byte_tags.remove_at_start(size);
            return Err(e);
        }
        Ok(growth)
    }

    /// Deserialize a header from the front without removing it.
    pub fn peek_header<H: Header>(&self) -> Result<H> {
        H::deserialize(&mut self.buffer.begin())
    }

    /// Deserialize a header from the front and remove its bytes.
    pub fn pop_header<H: Header>(&mut self) -> Result<H> {
        let header: H = self.peek_header()?;
        self.remove_header(header.serialized_size())?;
        Ok(header)
    }

    /// Serialize `trailer` into freshly added back bytes.
    pub fn push_trailer<T: Trailer>(&mut self, trailer: &T) -> Result<Growth> {
        let size = trailer.serialized_size();
        let growth = self.add_trailer(size)?;

        let written = {
            let mut it = self.buffer.end_mut();
            it.move_backward(size)
                .and_then(|()| trailer.serialize(&mut it))
        };
        if let Err(e) = written {
            self.buffer.remove_at_end(size);
            self.byte_tags.remove_at_end(size);
            return Err(e);
        }
        Ok(growth)
    }

    /// Deserialize a trailer from the back without removing it.
    pub fn peek_trailer<T: Trailer>(&self) -> Result<T> {
        T::deserialize(self.buffer.end())
    }

    /// Deserialize a trailer from the back and remove its bytes.
    pub fn pop_trailer<T: Trailer>(&mut self) -> Result<T> {
        let trailer: T = self.peek_trailer()?;
        self.remove_trailer(trailer.serialized_size())?;
        Ok(trailer)
    }

    /// Packet over the bytes `[start, start + size)`, sharing storage and
    /// tag array with this one. Packet tags are copied.
    ///
    /// # Errors
    /// Returns `BufferError::OutOfRange` if the range leaves the packet.
    pub fn make_fragment(&self, start: usize, size: usize) -> Result<Packet> {
        let buffer = self.buffer.make_fragment(start, size)?;
        let byte_tags = self.byte_tags.make_fragment(start, size)?;
        Ok(Packet {
            buffer,
            byte_tags,
            packet_tags: self.packet_tags.clone(),
            uid: self.uid,
        })
    }

    /// Put `other`'s bytes and byte tags in front of this packet.
    ///
    /// # Errors
    /// Buffer allocation errors or `TagError::CoordinateOverflow`; the packet
    /// keeps its bytes and tags on error.
    pub fn prepend(&mut self, other: &Packet) -> Result<Growth> {
        let size = other.size();
        let growth = self.buffer.prepend(&other.buffer)?;
        if let Err(e) = self.byte_tags.prepend(&other.byte_tags) {
            self.buffer.remove_at_start(size);
            return Err(e);
        }
        tracing::trace!(uid = self.uid, added = size, size = self.size(), "prepended packet");
        Ok(growth)
    }

    /// Put `other`'s bytes and byte tags after this packet.
    ///
    /// # Errors
    /// Same as [`Packet::prepend`].
    pub fn append(&mut self, other: &Packet) -> Result<Growth> {
        let size = other.size();
        let growth = self.buffer.append(&other.buffer)?;
        if let Err(e) = self.byte_tags.append(&other.byte_tags) {
            self.buffer.remove_at_end(size);
            return Err(e);
        }
        tracing::trace!(uid = self.uid, added = size, size = self.size(), "appended packet");
        Ok(growth)
    }

    /// Attach `tag` to the bytes `[start, start + len)`.
    ///
    /// # Errors
    /// `TagError::OutOfRange` or `TagError::EmptyRange` for a bad range.
    pub fn add_byte_tag(&mut self, tag: Tag, start: usize, len: usize) -> Result<()> {
        self.byte_tags.insert(tag, start, len)
    }

    /// Attach `tag` to every byte of the packet.
    ///
    /// # Errors
    /// `TagError::EmptyRange` on an empty packet.
    pub fn add_byte_tag_all(&mut self, tag: Tag) -> Result<()> {
        self.byte_tags.insert(tag, 0, self.size())
    }

    pub fn has_byte_tag(&self, id: TagId, offset: usize) -> bool {
        self.byte_tags.exists(id, offset)
    }

    pub fn get_byte_tag(&self, id: TagId, offset: usize) -> Option<Tag> {
        self.byte_tags.get(id, offset)
    }

    /// Visible byte tags, in packet offsets.
    pub fn byte_tags(&self) -> Vec<ByteTagSpan> {
        self.byte_tags.iter().collect()
    }

    pub fn remove_all_byte_tags(&mut self) {
        self.byte_tags.remove_all();
    }

    /// Attach a packet tag, returning the one it replaces.
    pub fn add_packet_tag(&mut self, tag: Tag) -> Option<Tag> {
        match self.packet_tags.iter_mut().find(|t| t.id() == tag.id()) {
            Some(slot) => Some(std::mem::replace(slot, tag)),
            None => {
                self.packet_tags.push(tag);
                None
            }
        }
    }

    pub fn has_packet_tag(&self, id: TagId) -> bool {
        self.get_packet_tag(id).is_some()
    }

    pub fn get_packet_tag(&self, id: TagId) -> Option<&Tag> {
        self.packet_tags.iter().find(|t| t.id() == id)
    }

    pub fn remove_packet_tag(&mut self, id: TagId) -> Option<Tag> {
        let index = self.packet_tags.iter().position(|t| t.id() == id)?;
        Some(self.packet_tags.remove(index))
    }

    pub fn packet_tags(&self) -> &[Tag] {
        &self.packet_tags
    }

    /// Replace this packet's byte and packet tags with `other`'s.
    ///
    /// # Errors
    /// Returns `PacketError::SizeMismatch` unless both packets have the same size.
    pub fn copy_tags_from(&mut self, other: &Packet) -> Result<()> {
        if other.size() != self.size() {
            return Err(PacketError::SizeMismatch {
                expected: self.size(),
                actual: other.size(),
            }
            .into());
        }
        self.byte_tags = other.byte_tags.clone();
        self.packet_tags = other.packet_tags.clone();
        Ok(())
    }

    /// Write out the zero span as real bytes.
    pub fn realize(&mut self) -> Result<()> {
        self.buffer.realize()
    }

    /// Copy up to `dst.len()` bytes into `dst`; returns the count copied.
    pub fn copy_data(&self, dst: &mut [u8]) -> usize {
        self.buffer.copy_to(dst)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    fn check_len(&self, size: usize) -> Result<()> {
        if size > self.size() {
            return Err(PacketError::TooShort {
                required: size,
                actual: self.size(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("uid", &self.uid)
            .field("size", &self.size())
            .field("zero_size", &self.buffer.zero_size())
            .field("byte_tags", &self.byte_tags.len())
            .field("packet_tags", &self.packet_tags)
            .finish()
    }
}
