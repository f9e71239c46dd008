//! Metrics collection and reporting for a simulation run.
//!
//! This module provides observable insights into engine behavior:
//! - Which growth tier each header/trailer/reassembly took
//! - How much payload stayed zero-compressed
//! - Fragment-level statistics (sent, dropped, reordered)
//! - Byte-tag verification results
//!
//! # Design
//!
//! Counters live in a plain struct updated explicitly at each pipeline stage.
//! Wall-clock duration is kept alongside the simulated tick count.
//!
//! # Thread Safety
//!
//! The `Metrics` struct is NOT thread-safe. Use one per run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::buffer::Growth;
use crate::network::NetworkStats;

/// Counters for one simulation run.
#[derive(Debug, Clone)]
pub struct Metrics {
    // === Timing ===
    /// When the run started
    pub start_time: Instant,

    /// When the run ended (set on completion)
    pub end_time: Option<Instant>,

    /// Simulated ticks elapsed
    pub ticks: u64,

    // === Datagrams ===
    /// Datagrams built
    pub datagrams_created: u64,

    /// Total logical bytes across all datagrams
    pub datagram_bytes: u64,

    /// Bytes held implicitly in zero-compressed spans
    pub zero_bytes: u64,

    /// Byte tags attached before fragmentation
    pub tags_attached: u64,

    // === Growth tiers ===
    /// Growths absorbed by the existing window
    pub growth_in_place: u64,

    /// Growths that shifted bytes within the same storage
    pub growth_moved: u64,

    /// Growths that needed fresh storage
    pub growth_reallocated: u64,

    // === Fragmentation / Network ===
    /// Fragments generated
    pub fragments_created: u64,

    /// Fragments sent into network simulator
    pub fragments_sent: u64,

    /// Fragments dropped by simulator (loss)
    pub fragments_dropped: u64,

    /// Fragments received by reassembler
    pub fragments_received: u64,

    /// Fragments rejected by the reassembler (duplicate, overlap, bad header)
    pub fragments_invalid: u64,

    /// Fragments that arrived out of order
    pub fragments_reordered: u64,

    // === Reassembly ===
    /// Datagrams successfully reassembled
    pub datagrams_reassembled: u64,

    /// Datagrams that timed out
    pub datagrams_timed_out: u64,

    /// Reassembled datagrams whose bytes matched the original
    pub bytes_verified: u64,

    /// Reassembled datagrams whose bytes differed from the original
    pub bytes_mismatched: u64,

    /// Byte-tag lookups that answered as expected
    pub tag_checks_passed: u64,

    /// Byte-tag lookups that did not
    pub tag_checks_failed: u64,
}

impl Metrics {
    /// Create new metrics with start time set to now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            ticks: 0,
            datagrams_created: 0,
            datagram_bytes: 0,
            zero_bytes: 0,
            tags_attached: 0,
            growth_in_place: 0,
            growth_moved: 0,
            growth_reallocated: 0,
            fragments_created: 0,
            fragments_sent: 0,
            fragments_dropped: 0,
            fragments_received: 0,
            fragments_invalid: 0,
            fragments_reordered: 0,
            datagrams_reassembled: 0,
            datagrams_timed_out: 0,
            bytes_verified: 0,
            bytes_mismatched: 0,
            tag_checks_passed: 0,
            tag_checks_failed: 0,
        }
    }

    /// Mark the run as complete.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Get total duration (or current elapsed if not complete).
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// Count one growth outcome.
    pub fn record_growth(&mut self, growth: Growth) {
        match growth {
            Growth::InPlace => self.growth_in_place += 1,
            Growth::Moved => self.growth_moved += 1,
            Growth::Reallocated => self.growth_reallocated += 1,
        }
    }

    /// Count the outcome of one byte-tag lookup.
    pub fn record_tag_check(&mut self, passed: bool) {
        if passed {
            self.tag_checks_passed += 1;
        } else {
            self.tag_checks_failed += 1;
        }
    }

    /// Copy the simulator's counters into this run.
    pub fn record_network(&mut self, stats: &NetworkStats) {
        self.fragments_sent = stats.packets_sent;
        self.fragments_dropped = stats.packets_dropped;
    }

    /// Total growth operations recorded.
    pub fn growths(&self) -> u64 {
        self.growth_in_place + self.growth_moved + self.growth_reallocated
    }

    /// Share of growths that avoided a new allocation.
    pub fn allocation_free_ratio(&self) -> f64 {
        let total = self.growths();
        if total == 0 {
            0.0
        } else {
            (self.growth_in_place + self.growth_moved) as f64 / total as f64
        }
    }

    /// Share of datagram bytes that were never materialized.
    pub fn zero_ratio(&self) -> f64 {
        if self.datagram_bytes == 0 {
            0.0
        } else {
            self.zero_bytes as f64 / self.datagram_bytes as f64
        }
    }

    /// Compute fragment loss rate (dropped / sent).
    pub fn loss_rate(&self) -> f64 {
        if self.fragments_sent == 0 {
            0.0
        } else {
            self.fragments_dropped as f64 / self.fragments_sent as f64
        }
    }

    /// Compute fragment reorder rate (reordered / received).
    pub fn reorder_rate(&self) -> f64 {
        if self.fragments_received == 0 {
            0.0
        } else {
            self.fragments_reordered as f64 / self.fragments_received as f64
        }
    }

    /// Whether every delivered datagram matched its original bytes and tags.
    pub fn is_clean(&self) -> bool {
        self.bytes_mismatched == 0 && self.tag_checks_failed == 0
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Run Summary ===");
        println!("Duration: {} ms ({} ticks)", self.duration().as_millis(), self.ticks);
        println!();

        println!("=== Datagrams ===");
        println!("Created: {}", self.datagrams_created);
        println!("Logical bytes: {}", self.datagram_bytes);
        println!("Zero-compressed: {} ({:.1}%)", self.zero_bytes, self.zero_ratio() * 100.0);
        println!("Byte tags attached: {}", self.tags_attached);
        println!();

        println!("=== Growth ===");
        println!("In place: {}", self.growth_in_place);
        println!("Moved: {}", self.growth_moved);
        println!("Reallocated: {}", self.growth_reallocated);
        println!("Allocation-free: {:.1}%", self.allocation_free_ratio() * 100.0);
        println!();

        println!("=== Network ===");
        println!("Fragments created: {}", self.fragments_created);
        println!("Fragments sent: {}", self.fragments_sent);
        println!("Fragments dropped: {} ({:.2}%)", self.fragments_dropped, self.loss_rate() * 100.0);
        println!("Fragments received: {}", self.fragments_received);
        println!("Fragments reordered: {} ({:.2}%)", self.fragments_reordered, self.reorder_rate() * 100.0);
        println!("Fragments invalid: {}", self.fragments_invalid);
        println!();

        println!("=== Reassembly ===");
        println!("Datagrams reassembled: {}", self.datagrams_reassembled);
        println!("Timeouts: {}", self.datagrams_timed_out);
        println!("Byte checks: {} ok, {} mismatched", self.bytes_verified, self.bytes_mismatched);
        println!("Tag checks: {} ok, {} failed", self.tag_checks_passed, self.tag_checks_failed);
        println!();
    }

    /// Print just the final result (pass/fail).
    pub fn print_result(&self) {
        if !self.is_clean() {
            println!(
                "✗ Verification failed: {} byte mismatches, {} tag check failures",
                self.bytes_mismatched, self.tag_checks_failed
            );
        } else {
            println!(
                "✓ {} of {} datagrams reassembled intact ({} timed out)",
                self.datagrams_reassembled, self.datagrams_created, self.datagrams_timed_out
            );
        }
    }

    /// Export metrics as a simple text format (for parsing/testing).
    pub fn export_text(&self) -> String {
        format!(
            "ticks={}\n\
             datagrams_created={}\n\
             datagram_bytes={}\n\
             zero_bytes={}\n\
             growth_in_place={}\n\
             growth_moved={}\n\
             growth_reallocated={}\n\
             fragments_sent={}\n\
             fragments_dropped={}\n\
             loss_rate={:.4}\n\
             fragments_reordered={}\n\
             datagrams_reassembled={}\n\
             datagrams_timed_out={}\n\
             tag_checks_failed={}\n",
            self.ticks,
            self.datagrams_created,
            self.datagram_bytes,
            self.zero_bytes,
            self.growth_in_place,
            self.growth_moved,
            self.growth_reallocated,
            self.fragments_sent,
            self.fragments_dropped,
            self.loss_rate(),
            self.fragments_reordered,
            self.datagrams_reassembled,
            self.datagrams_timed_out,
            self.tag_checks_failed,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for tracking reordering.
///
/// Tracks the highest fragment offset seen for each datagram to detect
/// out-of-order arrival.
pub struct ReorderTracker {
    last_offsets: HashMap<u64, u32>,
}

impl ReorderTracker {
    pub fn new() -> Self {
        Self {
            last_offsets: HashMap::new(),
        }
    }

    /// Record a fragment and return true if it arrived out of order.
    ///
    /// A fragment is considered reordered if its offset is less than the
    /// highest offset already seen for this datagram.
    pub fn track(&mut self, datagram_id: u64, offset: u32) -> bool {
        let last = self.last_offsets.entry(datagram_id).or_insert(0);

        let is_reordered = offset < *last;

        if offset > *last {
            *last = offset;
        }

        is_reordered
    }

    /// Forget a datagram (when it completes or times out).
    pub fn clear_datagram(&mut self, datagram_id: u64) {
        self.last_offsets.remove(&datagram_id);
    }
}

impl Default for ReorderTracker {
    fn default() -> Self {
        Self::new()
    }
}
