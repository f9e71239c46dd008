//! Workload generation for simulation runs.
//!
//! Builds datagrams with interesting buffer shapes and tags them, so the
//! zero-compression, growth and tag-tracking paths all get exercised.
//!
//! # Design
//!
//! Generated datagrams are one of:
//! - Mostly padding: a short real header and trailer around a large zero span
//! - Mixed: real header, zero span and real trailer of comparable sizes
//! - Fully real: random bytes, no zero span
//!
//! Each datagram then receives a handful of byte tags at random ranges and a
//! packet tag recording its sequence number.

use packet_sim_core::buffer::ZcBuffer;
use packet_sim_core::tag::Tag;
use packet_sim_core::{Packet, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Packet tag id carrying the datagram sequence number.
pub const SEQUENCE_TAG: u32 = 0;

/// First byte tag id; byte tags use consecutive ids from here.
pub const FIRST_BYTE_TAG: u32 = 1;

/// Layout of one generated datagram before it becomes a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramShape {
    pub header: Vec<u8>,
    pub zero_len: usize,
    pub trailer: Vec<u8>,

    /// `(start, len)` of each byte tag
    pub tags: Vec<(usize, usize)>,
}

impl DatagramShape {
    /// Logical size of the datagram.
    pub fn size(&self) -> usize {
        self.header.len() + self.zero_len + self.trailer.len()
    }

    /// Build the tagged packet for datagram `sequence`.
    pub fn build(&self, sequence: u64) -> Result<Packet> {
        let buffer = ZcBuffer::from_parts(&self.header, self.zero_len, &self.trailer)?;
        let mut packet = Packet::from_buffer(buffer)?;

        for (i, &(start, len)) in self.tags.iter().enumerate() {
            let id = FIRST_BYTE_TAG + i as u32;
            let value = (sequence << 16) | i as u64;
            packet.add_byte_tag(Tag::from_u64(id, value), start, len)?;
        }
        packet.add_packet_tag(Tag::from_u64(SEQUENCE_TAG, sequence));

        Ok(packet)
    }
}

/// Deterministic generator of datagram shapes.
pub struct Workload {
    rng: ChaCha8Rng,
    max_payload: usize,
    tags_per_datagram: usize,
}

impl Workload {
    pub fn new(seed: u64, max_payload: usize, tags_per_datagram: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_payload: max_payload.max(1),
            tags_per_datagram,
        }
    }

    /// Generate the next datagram shape.
    pub fn next_shape(&mut self) -> DatagramShape {
        let size = self.rng.gen_range(1..=self.max_payload);

        // Choose layout randomly
        let kind: u8 = self.rng.gen_range(0..10);
        let (header_len, trailer_len) = match kind {
            // 40% mostly padding
            0..=3 => {
                let edge = size.min(64);
                let header_len = self.rng.gen_range(0..=edge);
                let trailer_len = self.rng.gen_range(0..=edge - header_len);
                (header_len, trailer_len)
            }

            // 40% mixed
            4..=7 => {
                let header_len = self.rng.gen_range(0..=size / 3);
                let trailer_len = self.rng.gen_range(0..=size / 3);
                (header_len, trailer_len)
            }

            // 20% fully real
            _ => (size, 0),
        };

        let header = self.random_bytes(header_len);
        let trailer = self.random_bytes(trailer_len);
        let zero_len = size - header_len - trailer_len;

        let tags = (0..self.tags_per_datagram)
            .map(|_| {
                let start = self.rng.gen_range(0..size);
                let len = self.rng.gen_range(1..=size - start);
                (start, len)
            })
            .collect();

        DatagramShape {
            header,
            zero_len,
            trailer,
            tags,
        }
    }

    fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.rng.gen()).collect()
    }
}
