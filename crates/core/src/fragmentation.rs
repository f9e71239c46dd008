//! MTU fragmentation of packets.
//!
//! A datagram larger than the MTU is cut into fragment packets with
//! [`Packet::make_fragment`]; every fragment shares the datagram's storage
//! and tag array and carries a [`FragmentHeader`] in front of its payload.
//!
//! # Header Format
//!
//! ```text
//! +-------------------+
//! | Magic (2 bytes)   |  0x46 0x52 ("FR")
//! +-------------------+
//! | datagram_id (8)   |  u64 LE, which datagram the payload belongs to
//! +-------------------+
//! | offset (4)        |  u32 LE, payload position within the datagram
//! +-------------------+
//! | total_len (4)     |  u32 LE, datagram size in bytes
//! +-------------------+
//! ```
//!
//! # MTU Constraint
//!
//! Fragment size = FRAGMENT_HEADER_SIZE + payload_len <= MTU

use crate::buffer::{BufferIterator, ConstBufferIterator};
use crate::error::{BufferError, PacketError, Result};
use crate::packet::{Header, Packet};

/// Magic number for fragment headers: "FR"
const MAGIC: [u8; 2] = *b"FR";

/// Size of a serialized fragment header in bytes
pub const FRAGMENT_HEADER_SIZE: usize = 18;

/// Position of one fragment's payload within its datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Datagram this fragment belongs to
    pub datagram_id: u64,

    /// Offset of the payload within the datagram
    pub offset: u32,

    /// Size of the whole datagram
    pub total_len: u32,
}

impl FragmentHeader {
    pub fn new(datagram_id: u64, offset: u32, total_len: u32) -> Self {
        Self {
            datagram_id,
            offset,
            total_len,
        }
    }
}

impl Header for FragmentHeader {
    fn serialized_size(&self) -> usize {
        FRAGMENT_HEADER_SIZE
    }

    fn serialize(&self, it: &mut BufferIterator<'_>) -> Result<()> {
        it.write_bytes(&MAGIC)?;
        it.write_le(self.datagram_id)?;
        it.write_le(self.offset)?;
        it.write_le(self.total_len)
    }

    /// # Errors
    /// - `PacketError::TooShort` if fewer than `FRAGMENT_HEADER_SIZE` bytes remain
    /// - `PacketError::InvalidMagic` if the magic doesn't match
    /// - `PacketError::InvalidFragment` if `offset > total_len`
    fn deserialize(it: &mut ConstBufferIterator<'_>) -> Result<Self> {
        if it.remaining() < FRAGMENT_HEADER_SIZE {
            return Err(PacketError::TooShort {
                required: FRAGMENT_HEADER_SIZE,
                actual: it.remaining(),
            }
            .into());
        }

        let mut magic = [0u8; 2];
        it.read_bytes(&mut magic)?;
        if magic != MAGIC {
            return Err(PacketError::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            }
            .into());
        }

        let datagram_id = it.read_le()?;
        let offset: u32 = it.read_le()?;
        let total_len: u32 = it.read_le()?;

        if offset > total_len {
            return Err(PacketError::InvalidFragment {
                offset: offset as usize,
                len: 0,
                total_len: total_len as usize,
            }
            .into());
        }

        Ok(Self {
            datagram_id,
            offset,
            total_len,
        })
    }
}

/// Cut `packet` into fragments of at most `mtu` bytes each, header included.
///
/// Fragments share storage with `packet`; byte tags stay attached to the
/// bytes they cover. An empty datagram still yields one header-only fragment.
///
/// # Errors
/// - `PacketError::MtuTooSmall` if `mtu` cannot fit a header and one byte
/// - `BufferError::BadSize` if the datagram exceeds `u32::MAX` bytes
pub fn fragment(packet: &Packet, datagram_id: u64, mtu: usize) -> Result<Vec<Packet>> {
    if mtu <= FRAGMENT_HEADER_SIZE {
        return Err(PacketError::MtuTooSmall {
            mtu,
            min: FRAGMENT_HEADER_SIZE + 1,
        }
        .into());
    }

    let total = packet.size();
    let total_len = u32::try_from(total).map_err(|_| BufferError::BadSize {
        requested: total,
        max: u32::MAX as usize,
    })?;

    let max_payload = mtu - FRAGMENT_HEADER_SIZE;
    let count = total.div_ceil(max_payload).max(1);
    let mut fragments = Vec::with_capacity(count);

    for index in 0..count {
        let start = index * max_payload;
        let len = max_payload.min(total - start);

        let mut piece = packet.make_fragment(start, len)?;
        // start <= total, which fits in u32
        let header = FragmentHeader::new(datagram_id, start as u32, total_len);
        piece.push_header(&header)?;
        debug_assert!(piece.size() <= mtu);

        fragments.push(piece);
    }

    tracing::debug!(datagram_id, total, fragments = count, mtu, "fragmented datagram");
    Ok(fragments)
}
