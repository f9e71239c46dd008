//! Byte tags and the per-packet structures that track them.
//!
//! - [`Tag`]: an id plus an opaque, cheaply clonable value
//! - [`TagIndex`] / [`TagIndexArray`]: tags anchored in a virtual coordinate
//!   space, stored in a copy-on-write array shared between packet copies
//! - [`TagList`]: which entries of the shared array are live for one packet

mod index;
mod list;

pub use index::{TagIndex, TagIndexArray};
pub use list::{ArrayOwnership, TagList, DEFAULT_TAG_CAPACITY, REF_POINT};

use std::fmt;
use std::rc::Rc;

use crate::packet::Packet;

/// Identity of a tag kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u32);

impl From<u32> for TagId {
    fn from(id: u32) -> Self {
        TagId(id)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// Opaque tag payload.
///
/// Byte values compare by content; nested packets compare by packet uid.
#[derive(Clone)]
pub enum TagValue {
    /// Serialized value bytes
    Bytes(Rc<[u8]>),
    /// A whole packet carried as metadata
    Packet(Rc<Packet>),
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TagValue::Bytes(a), TagValue::Bytes(b)) => a == b,
            (TagValue::Packet(a), TagValue::Packet(b)) => Rc::ptr_eq(a, b) || a.uid() == b.uid(),
            _ => false,
        }
    }
}

impl Eq for TagValue {}

impl fmt::Debug for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bytes(bytes) => write!(f, "Bytes({bytes:02x?})"),
            TagValue::Packet(packet) => {
                write!(f, "Packet(uid={}, size={})", packet.uid(), packet.size())
            }
        }
    }
}

/// Immutable `(id, value)` pair. Cloning shares the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    id: TagId,
    value: TagValue,
}

impl Tag {
    /// Tag carrying a copy of `value`.
    pub fn new(id: u32, value: &[u8]) -> Self {
        Self {
            id: TagId(id),
            value: TagValue::Bytes(Rc::from(value)),
        }
    }

    /// Tag without a value.
    pub fn empty(id: u32) -> Self {
        Self::new(id, &[])
    }

    /// Tag carrying `value` as 8 little-endian bytes.
    pub fn from_u64(id: u32, value: u64) -> Self {
        Self::new(id, &value.to_le_bytes())
    }

    /// Tag whose value is a nested packet.
    pub fn with_packet(id: u32, packet: Packet) -> Self {
        Self {
            id: TagId(id),
            value: TagValue::Packet(Rc::new(packet)),
        }
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn value(&self) -> &TagValue {
        &self.value
    }

    /// Value bytes, if this tag carries bytes.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            TagValue::Bytes(bytes) => Some(bytes),
            TagValue::Packet(_) => None,
        }
    }

    /// Value decoded as written by [`Tag::from_u64`].
    pub fn value_u64(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.bytes()?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    /// Nested packet, if this tag carries one.
    pub fn packet(&self) -> Option<&Packet> {
        match &self.value {
            TagValue::Packet(packet) => Some(packet),
            TagValue::Bytes(_) => None,
        }
    }
}

/// A tag as seen through one buffer window: `[start, end)` are byte offsets
/// relative to the start of the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteTagSpan {
    pub tag: Tag,
    pub start: usize,
    pub end: usize,
}
