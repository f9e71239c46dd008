//! Datagram reassembly with bounded memory.
//!
//! The reassembler collects fragment packets per datagram until their
//! payloads tile the whole datagram, then stitches them back together with
//! [`Packet::append`], which also restores the byte tags that were split
//! across fragments.
//!
//! # Design
//!
//! - **Bounded window**: Track at most `max_inflight` datagrams simultaneously
//! - **Per-datagram state**: Payloads keyed by offset, checked for duplicates
//!   and overlaps on arrival
//! - **In-order delivery**: Completed datagrams are emitted by increasing id
//! - **Timeouts**: Caller-driven, in simulated ticks
//!
//! # Thread Safety
//!
//! This structure is NOT thread-safe; packets are single-threaded values.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{PacketError, ReassemblyError, Result};
use crate::fragmentation::FragmentHeader;
use crate::packet::Packet;

/// State for a single datagram being reassembled.
#[derive(Debug)]
struct DatagramState {
    /// Expected datagram size
    total_len: usize,

    /// Payloads received so far, keyed by offset
    payloads: BTreeMap<usize, Packet>,

    /// Payload bytes received so far
    received: usize,

    /// Tick of the first fragment
    first_seen: u64,
}

impl DatagramState {
    fn new(total_len: usize, now: u64) -> Self {
        Self {
            total_len,
            payloads: BTreeMap::new(),
            received: 0,
            first_seen: now,
        }
    }

    /// Insert a payload and return true if the datagram is now complete.
    fn insert_payload(&mut self, header: &FragmentHeader, payload: Packet) -> Result<bool> {
        let datagram_id = header.datagram_id;
        let offset = header.offset as usize;
        let len = payload.size();

        if header.total_len as usize != self.total_len {
            return Err(ReassemblyError::TotalLengthMismatch {
                datagram_id,
                expected: self.total_len,
                actual: header.total_len as usize,
            }
            .into());
        }

        let end = offset + len;
        if end > self.total_len {
            return Err(PacketError::InvalidFragment {
                offset,
                len,
                total_len: self.total_len,
            }
            .into());
        }

        if self.payloads.contains_key(&offset) {
            return Err(ReassemblyError::DuplicateFragment {
                datagram_id,
                offset,
            }
            .into());
        }

        let overlaps_previous = self
            .payloads
            .range(..offset)
            .next_back()
            .is_some_and(|(&start, p)| start + p.size() > offset);
        let overlaps_next = self
            .payloads
            .range(offset..)
            .next()
            .is_some_and(|(&start, _)| start < end);
        if overlaps_previous || overlaps_next {
            return Err(ReassemblyError::OverlappingFragment {
                datagram_id,
                offset,
            }
            .into());
        }

        self.payloads.insert(offset, payload);
        self.received += len;

        Ok(self.received == self.total_len)
    }

    /// Join all payloads in offset order (consumes the state).
    fn stitch(self) -> Result<Packet> {
        let mut payloads = self.payloads.into_values();
        let mut datagram = payloads.next().unwrap_or_default();
        for payload in payloads {
            datagram.append(&payload)?;
        }
        Ok(datagram)
    }

    fn is_timed_out(&self, now: u64, timeout: u64) -> bool {
        now.saturating_sub(self.first_seen) >= timeout
    }

    fn missing_bytes(&self) -> usize {
        self.total_len - self.received
    }
}

/// Reassembler for collecting fragment packets back into datagrams.
///
/// Maintains bounded state for multiple in-flight datagrams.
pub struct Reassembler {
    /// Maximum datagrams we can track simultaneously
    max_inflight: usize,

    /// Ticks to wait for missing fragments
    timeout: u64,

    /// In-flight datagrams indexed by id
    datagrams: HashMap<u64, DatagramState>,

    /// Next datagram id we expect to emit (for in-order delivery)
    next_expected: u64,

    /// Completed datagrams waiting to be emitted in order
    completed: BTreeMap<u64, Packet>,

    /// Datagrams given up on after a timeout
    abandoned: BTreeSet<u64>,
}

impl Reassembler {
    /// Create a new reassembler.
    ///
    /// # Arguments
    /// - `max_inflight`: maximum number of datagrams to track simultaneously
    /// - `timeout`: ticks to wait for missing fragments before giving up
    pub fn new(max_inflight: usize, timeout: u64) -> Self {
        Self {
            max_inflight,
            timeout,
            datagrams: HashMap::new(),
            next_expected: 0,
            completed: BTreeMap::new(),
            abandoned: BTreeSet::new(),
        }
    }

    /// Insert a fragment packet received at tick `now`.
    ///
    /// The fragment header is removed and the payload buffered.
    ///
    /// # Returns
    /// - `Ok(Some((datagram_id, datagram)))` if a datagram was completed and is next in sequence
    /// - `Ok(None)` if the fragment was buffered, or ignored because its
    ///   datagram was already delivered or abandoned
    ///
    /// # Errors
    /// - Header parse errors from [`FragmentHeader`]
    /// - `ReassemblyError::WindowFull` if too many datagrams in flight
    /// - `ReassemblyError::DuplicateFragment` / `OverlappingFragment`
    /// - `ReassemblyError::TotalLengthMismatch` if fragments disagree on size
    pub fn insert(&mut self, mut fragment: Packet, now: u64) -> Result<Option<(u64, Packet)>> {
        let header: FragmentHeader = fragment.pop_header()?;
        let datagram_id = header.datagram_id;

        // Late arrival for a datagram that was already handled
        if datagram_id < self.next_expected
            || self.completed.contains_key(&datagram_id)
            || self.abandoned.contains(&datagram_id)
        {
            tracing::trace!(datagram_id, offset = header.offset, "ignoring late fragment");
            return Ok(None);
        }

        if !self.datagrams.contains_key(&datagram_id) {
            if self.datagrams.len() >= self.max_inflight {
                return Err(ReassemblyError::WindowFull {
                    max: self.max_inflight,
                }
                .into());
            }
            self.datagrams
                .insert(datagram_id, DatagramState::new(header.total_len as usize, now));
        }

        let inserted = match self.datagrams.get_mut(&datagram_id) {
            Some(state) => state.insert_payload(&header, fragment),
            None => Ok(false),
        };
        let is_complete = match inserted {
            Ok(is_complete) => is_complete,
            Err(e) => {
                // A rejected first fragment must not hold a window slot
                if self
                    .datagrams
                    .get(&datagram_id)
                    .is_some_and(|state| state.payloads.is_empty())
                {
                    self.datagrams.remove(&datagram_id);
                }
                return Err(e);
            }
        };

        if is_complete {
            if let Some(state) = self.datagrams.remove(&datagram_id) {
                let datagram = state.stitch()?;
                tracing::debug!(datagram_id, size = datagram.size(), "reassembled datagram");
                self.completed.insert(datagram_id, datagram);
            }
            return Ok(self.try_emit_next());
        }

        Ok(None)
    }

    /// Emit the next in-order datagram if available, skipping abandoned ids.
    fn try_emit_next(&mut self) -> Option<(u64, Packet)> {
        while self.abandoned.remove(&self.next_expected) {
            self.next_expected += 1;
        }

        let datagram = self.completed.remove(&self.next_expected)?;
        let datagram_id = self.next_expected;
        self.next_expected += 1;
        Some((datagram_id, datagram))
    }

    /// Expire datagrams whose first fragment arrived `timeout` or more ticks
    /// before `now`.
    ///
    /// # Returns
    /// One `ReassemblyError::Timeout` per expired datagram.
    ///
    /// # Side Effects
    /// Expired datagrams are removed and no longer block in-order delivery.
    pub fn check_timeouts(&mut self, now: u64) -> Vec<ReassemblyError> {
        let mut timed_out: Vec<u64> = self
            .datagrams
            .iter()
            .filter(|(_, state)| state.is_timed_out(now, self.timeout))
            .map(|(&datagram_id, _)| datagram_id)
            .collect();
        timed_out.sort_unstable();

        let mut errors = Vec::with_capacity(timed_out.len());
        for datagram_id in timed_out {
            if let Some(state) = self.datagrams.remove(&datagram_id) {
                tracing::debug!(datagram_id, missing = state.missing_bytes(), "datagram timed out");
                self.abandoned.insert(datagram_id);
                errors.push(ReassemblyError::Timeout {
                    datagram_id,
                    timeout: self.timeout,
                    missing: state.missing_bytes(),
                });
            }
        }

        errors
    }

    /// Emit completed datagrams that are now in order.
    pub fn drain_completed(&mut self) -> Vec<(u64, Packet)> {
        let mut result = Vec::new();
        while let Some(datagram) = self.try_emit_next() {
            result.push(datagram);
        }
        result
    }

    /// Emit every completed datagram in id order, skipping over ids that
    /// never completed. Used at the end of a run.
    pub fn flush(&mut self) -> Vec<(u64, Packet)> {
        let completed = std::mem::take(&mut self.completed);
        if let Some((&last, _)) = completed.iter().next_back() {
            self.next_expected = self.next_expected.max(last + 1);
        }
        self.abandoned.clear();
        completed.into_iter().collect()
    }

    /// Get statistics about current reassembly state.
    pub fn stats(&self) -> ReassemblerStats {
        ReassemblerStats {
            inflight: self.datagrams.len(),
            completed_waiting: self.completed.len(),
            next_expected: self.next_expected,
        }
    }

    /// Check if reassembler is idle (no datagrams in flight or waiting).
    pub fn is_idle(&self) -> bool {
        self.datagrams.is_empty() && self.completed.is_empty()
    }
}

/// Statistics about reassembler state.
#[derive(Debug, Clone, Copy)]
pub struct ReassemblerStats {
    /// Number of datagrams currently being reassembled
    pub inflight: usize,

    /// Number of completed datagrams waiting for in-order emission
    pub completed_waiting: usize,

    /// Next datagram id expected to be emitted
    pub next_expected: u64,
}
