//! packet-sim-core: zero-compressed packet buffers with byte-tag tracking
//!
//! This library provides the core components of a packet engine that:
//! - Stores payloads copy-on-write, keeping all-zero padding implicit
//! - Tracks byte tags through header growth, fragmentation and reassembly
//! - Fragments datagrams into MTU-sized packets and stitches them back
//! - Simulates unreliable network conditions (latency, jitter, reordering, loss)
//!
//! # Architecture
//!
//! The system is designed around clear module boundaries:
//! - `buffer`: Shared byte storage, cursors and the zero-compressed buffer
//! - `tag`: Byte tags in a virtual coordinate space, copy-on-write tag lists
//! - `packet`: A buffer and a tag list kept in step, plus packet tags
//! - `fragmentation`: MTU fragmentation with a fixed-size header
//! - `reassembly`: Fragment reassembly with bounded memory
//! - `network`: Network simulator with seeded randomness
//! - `metrics`: Observable system behavior
//!
//! # Design Principles
//!
//! - **No panics**: Contract violations are structured, recoverable errors
//! - **Cheap copies**: Packet copies alias storage until one of them writes
//! - **Deterministic**: Seeded randomness and simulated time make runs reproducible
//! - **Single-threaded**: Sharing uses `Rc`, so packets never cross threads

pub mod buffer;
pub mod error;
pub mod fragmentation;
pub mod metrics;
pub mod network;
pub mod packet;
pub mod reassembly;
pub mod tag;

// Re-export commonly used types
pub use buffer::{Growth, ZcBuffer};
pub use error::{Error, Result};
pub use packet::Packet;
pub use tag::{Tag, TagId, TagList};
