//! Error types for the packet buffer and byte-tag engine.
//!
//! Every contract violation is reported as a structured error rather than a
//! panic, and every failing operation leaves its receiver unchanged.

use thiserror::Error;

/// Top-level error type for all operations in the crate.
///
/// Each variant corresponds to a specific failure domain:
/// - Buffer: storage allocation, offsets, iterator cursors
/// - Tag: tag ranges and the virtual coordinate space
/// - Packet: header parsing, fragmentation, tag copying
/// - Reassembly: duplicate/overlapping fragments, timeouts, window limits
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer operation failed (e.g., offset past the end, allocation failure)
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Tag list operation failed (e.g., tag outside the window)
    #[error("tag error: {0}")]
    Tag(#[from] TagError),

    /// Packet level error (e.g., malformed header)
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Reassembly error (e.g., timeout waiting for fragments)
    #[error("reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Buffer, storage and iterator errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A byte range does not fit inside the buffer
    #[error("range {offset}+{len} exceeds buffer size {size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// An iterator access or move would leave `[start, end]`
    #[error("cursor at offset {offset} cannot move {requested} bytes ({available} available)")]
    CursorOutOfRange {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// Attempted to write into the zero-compressed span
    #[error("write into zero-compressed span at offset {offset}")]
    ZeroAreaWrite { offset: usize },

    /// Attempted to write bytes another view of the same storage can see
    #[error("write of {len} bytes at offset {offset} touches shared storage")]
    SharedWrite { offset: usize, len: usize },

    /// Iterators over different storages were compared or subtracted
    #[error("iterators belong to different storages")]
    StorageMismatch,

    /// Iterator distance exceeds `isize::MAX`
    #[error("iterator distance {distance} does not fit a signed offset")]
    DistanceOverflow { distance: usize },

    /// Requested capacity exceeds the supported maximum
    #[error("requested capacity {requested} exceeds maximum {max}")]
    BadSize { requested: usize, max: usize },

    /// The allocator refused the request
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// Byte-tag errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    /// Tag range lies (partly) outside the tracked buffer window
    #[error("tag range {start}+{len} outside buffer of size {size}")]
    OutOfRange {
        start: usize,
        len: usize,
        size: usize,
    },

    /// Tags must cover at least one byte
    #[error("tag range must cover at least one byte")]
    EmptyRange,

    /// Growing the window would leave the reserved virtual coordinate space
    #[error("window growth of {requested} bytes exceeds reserved room of {available}")]
    CoordinateOverflow { requested: usize, available: usize },
}

/// Packet errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Invalid magic number in a header
    #[error("invalid header magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 2], actual: [u8; 2] },

    /// Packet is too short to contain the requested header or trailer
    #[error("packet too short: need at least {required} bytes, got {actual}")]
    TooShort { required: usize, actual: usize },

    /// Packets must have the same size for their byte tags to line up
    #[error("packet size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// MTU cannot fit a fragment header plus one payload byte
    #[error("MTU {mtu} too small, need at least {min}")]
    MtuTooSmall { mtu: usize, min: usize },

    /// Fragment header describes bytes outside its datagram
    #[error("fragment {offset}+{len} outside datagram of {total_len} bytes")]
    InvalidFragment {
        offset: usize,
        len: usize,
        total_len: usize,
    },
}

/// Reassembly errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    /// Timeout waiting for missing fragments
    #[error("datagram {datagram_id} timed out after {timeout} ticks (missing {missing} bytes)")]
    Timeout {
        datagram_id: u64,
        timeout: u64,
        missing: usize,
    },

    /// Reassembly window is full (too many datagrams in flight)
    #[error("reassembly window full: max {max} datagrams in flight")]
    WindowFull { max: usize },

    /// Fragment already received
    #[error("duplicate fragment: datagram {datagram_id}, offset {offset}")]
    DuplicateFragment { datagram_id: u64, offset: usize },

    /// Fragment overlaps bytes already received from another fragment
    #[error("overlapping fragment: datagram {datagram_id}, offset {offset}")]
    OverlappingFragment { datagram_id: u64, offset: usize },

    /// Fragments disagree on the datagram length
    #[error("total length mismatch for datagram {datagram_id}: expected {expected}, got {actual}")]
    TotalLengthMismatch {
        datagram_id: u64,
        expected: usize,
        actual: usize,
    },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
