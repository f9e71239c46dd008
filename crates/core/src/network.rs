//! Network simulator with latency, jitter, reordering, and packet loss.
//!
//! This module simulates an unreliable link in discrete time. The caller owns
//! the clock: `send` and `recv` take the current tick, so a run never depends
//! on wall-clock time.
//!
//! # Simulated Effects
//!
//! - **Latency**: Base delay for all packets
//! - **Jitter**: Random variation in latency (uniform distribution)
//! - **Reordering**: Extra random hold-back of up to `reorder_window` ticks
//! - **Loss**: Random packet drops (Bernoulli distribution)
//!
//! # Implementation
//!
//! Uses a priority queue (min-heap) keyed by delivery tick. Packets due on
//! the same tick leave in the order they were sent.
//!
//! # Determinism
//!
//! All randomness comes from a seeded ChaCha8 RNG. Given the same seed
//! and inputs, outputs are bit-identical.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::packet::Packet;

/// Configuration for network simulation. Times are in ticks.
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    /// Base latency
    pub base_latency: u64,

    /// Jitter range (uniform ±jitter)
    pub jitter: u64,

    /// Maximum extra hold-back applied to a packet.
    /// Larger values allow more reordering
    pub reorder_window: u64,

    /// Packet loss probability [0.0, 1.0]
    pub loss_rate: f64,

    /// Random seed for determinism
    pub seed: u64,
}

impl NetworkConfig {
    /// Create a configuration with no impairments (perfect network).
    pub fn perfect(seed: u64) -> Self {
        Self {
            base_latency: 0,
            jitter: 0,
            reorder_window: 0,
            loss_rate: 0.0,
            seed,
        }
    }

    /// Create a default configuration with moderate impairments.
    pub fn default_with_seed(seed: u64) -> Self {
        Self {
            base_latency: 50,
            jitter: 20,
            reorder_window: 16,
            loss_rate: 0.01, // 1% loss
            seed,
        }
    }
}

/// A packet with scheduled delivery tick.
#[derive(Debug)]
struct ScheduledPacket {
    packet: Packet,
    delivery_tick: u64,
    sequence: u64,
}

impl ScheduledPacket {
    fn key(&self) -> (u64, u64) {
        (self.delivery_tick, self.sequence)
    }
}

impl PartialEq for ScheduledPacket {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledPacket {}

impl PartialOrd for ScheduledPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earlier tick = higher priority)
        other.key().cmp(&self.key())
    }
}

/// Network simulator implementing latency, jitter, reordering, and loss.
///
/// # Thread Safety
/// Not thread-safe; packets share storage through `Rc`.
pub struct NetworkSimulator {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    queue: BinaryHeap<ScheduledPacket>,
    next_sequence: u64,

    // Statistics
    packets_sent: u64,
    packets_dropped: u64,
    packets_delivered: u64,
}

impl NetworkSimulator {
    /// Create a new network simulator with the given configuration.
    pub fn new(config: NetworkConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Self {
            config,
            rng,
            queue: BinaryHeap::new(),
            next_sequence: 0,
            packets_sent: 0,
            packets_dropped: 0,
            packets_delivered: 0,
        }
    }

    /// Send a packet through the simulated network at tick `now`.
    ///
    /// The packet may be:
    /// - Dropped (if loss_rate > 0)
    /// - Delayed by latency + jitter
    /// - Held back up to `reorder_window` extra ticks
    ///
    /// # Returns
    /// `false` if the packet was dropped.
    pub fn send(&mut self, packet: Packet, now: u64) -> bool {
        self.packets_sent += 1;

        if self.config.loss_rate > 0.0 {
            let roll: f64 = self.rng.gen();
            if roll < self.config.loss_rate {
                self.packets_dropped += 1;
                tracing::trace!(uid = packet.uid(), now, "packet dropped");
                return false;
            }
        }

        let delivery_tick = now.saturating_add(self.compute_delay());
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.queue.push(ScheduledPacket {
            packet,
            delivery_tick,
            sequence,
        });
        true
    }

    /// Receive the next packet due at or before tick `now`.
    ///
    /// # Returns
    /// - `Some(packet)` if a packet's delivery tick has arrived
    /// - `None` if no packets are ready yet
    pub fn recv(&mut self, now: u64) -> Option<Packet> {
        if self.queue.peek()?.delivery_tick > now {
            return None;
        }

        let scheduled = self.queue.pop()?;
        self.packets_delivered += 1;
        Some(scheduled.packet)
    }

    /// Tick at which the next queued packet becomes deliverable.
    pub fn next_delivery(&self) -> Option<u64> {
        self.queue.peek().map(|scheduled| scheduled.delivery_tick)
    }

    /// Check if any packets are currently in flight (queued).
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Get count of packets currently in flight.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Drain all remaining packets in delivery order, ignoring delivery ticks.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(self.queue.len());
        while let Some(scheduled) = self.queue.pop() {
            packets.push(scheduled.packet);
            self.packets_delivered += 1;
        }
        packets
    }

    /// Get statistics about network behavior.
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            packets_sent: self.packets_sent,
            packets_dropped: self.packets_dropped,
            packets_delivered: self.packets_delivered,
            packets_in_flight: self.queue.len(),
        }
    }

    /// Delay = base_latency ± jitter + hold-back
    fn compute_delay(&mut self) -> u64 {
        let mut delay = self.config.base_latency;

        if self.config.jitter > 0 {
            let jitter_range = self.config.jitter.saturating_mul(2);
            let jitter = self.rng.gen_range(0..=jitter_range);
            delay = delay.saturating_add(jitter).saturating_sub(self.config.jitter);
        }

        if self.config.reorder_window > 0 {
            delay = delay.saturating_add(self.rng.gen_range(0..=self.config.reorder_window));
        }

        delay
    }
}

/// Statistics about network simulator behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStats {
    /// Total packets sent into the simulator
    pub packets_sent: u64,

    /// Packets dropped due to loss
    pub packets_dropped: u64,

    /// Packets successfully delivered
    pub packets_delivered: u64,

    /// Packets currently in flight
    pub packets_in_flight: usize,
}

impl NetworkStats {
    /// Compute packet loss rate.
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_dropped as f64 / self.packets_sent as f64
        }
    }

    /// Compute delivery rate (delivered / sent).
    pub fn delivery_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_delivered as f64 / self.packets_sent as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_packet(id: u8) -> Packet {
        Packet::from_slice(&[id]).unwrap()
    }

    fn first_byte(packet: &Packet) -> u8 {
        packet.to_vec()[0]
    }

    fn config(base_latency: u64, jitter: u64, loss_rate: f64, seed: u64) -> NetworkConfig {
        NetworkConfig {
            base_latency,
            jitter,
            reorder_window: 0,
            loss_rate,
            seed,
        }
    }

    #[test]
    fn test_perfect_network() {
        let mut sim = NetworkSimulator::new(NetworkConfig::perfect(42));

        assert!(sim.send(make_test_packet(7), 0));

        // Available on the same tick
        let received = sim.recv(0).unwrap();
        assert_eq!(first_byte(&received), 7);

        let stats = sim.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.packets_dropped, 0);
        assert_eq!(stats.packets_delivered, 1);
    }

    #[test]
    fn test_latency() {
        let mut sim = NetworkSimulator::new(config(50, 0, 0.0, 42));

        sim.send(make_test_packet(0), 10);
        assert_eq!(sim.next_delivery(), Some(60));

        assert!(sim.recv(59).is_none());
        assert!(sim.recv(60).is_some());
        assert!(!sim.has_pending());
    }

    #[test]
    fn test_same_tick_keeps_send_order() {
        let mut sim = NetworkSimulator::new(config(5, 0, 0.0, 1));
        for i in 0..5 {
            sim.send(make_test_packet(i), 0);
        }

        let received: Vec<u8> = std::iter::from_fn(|| sim.recv(5))
            .map(|p| first_byte(&p))
            .collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_packet_loss() {
        let mut sim = NetworkSimulator::new(config(0, 0, 0.5, 42));

        for i in 0..100 {
            sim.send(make_test_packet(i), 0);
        }

        let stats = sim.stats();
        assert_eq!(stats.packets_sent, 100);

        // Allow 30-70% range due to randomness
        assert!(stats.packets_dropped >= 30 && stats.packets_dropped <= 70);
        assert_eq!(stats.packets_in_flight as u64, 100 - stats.packets_dropped);
    }

    #[test]
    fn test_determinism() {
        let config = NetworkConfig::default_with_seed(12345);

        let mut sim1 = NetworkSimulator::new(config);
        let mut sim2 = NetworkSimulator::new(config);

        for i in 0..20 {
            sim1.send(make_test_packet(i), u64::from(i));
            sim2.send(make_test_packet(i), u64::from(i));
        }

        let order1: Vec<u8> = sim1.drain().iter().map(first_byte).collect();
        let order2: Vec<u8> = sim2.drain().iter().map(first_byte).collect();
        assert_eq!(order1, order2);
        assert_eq!(sim1.stats().packets_dropped, sim2.stats().packets_dropped);
    }

    #[test]
    fn test_drain() {
        let mut sim = NetworkSimulator::new(config(1000, 0, 0.0, 42));

        sim.send(make_test_packet(0), 0);
        sim.send(make_test_packet(1), 0);
        assert_eq!(sim.pending_count(), 2);
        assert!(sim.recv(999).is_none());

        let packets = sim.drain();
        assert_eq!(packets.len(), 2);
        assert_eq!(sim.pending_count(), 0);
        assert_eq!(sim.stats().packets_delivered, 2);
    }

    #[test]
    fn test_reordering() {
        let mut sim = NetworkSimulator::new(NetworkConfig {
            base_latency: 20,
            jitter: 15,
            reorder_window: 10,
            loss_rate: 0.0,
            seed: 99,
        });

        for i in 0..50 {
            sim.send(make_test_packet(i), u64::from(i));
        }

        let mut received = Vec::new();
        for now in 0..=200 {
            while let Some(packet) = sim.recv(now) {
                received.push(first_byte(&packet));
            }
        }

        assert_eq!(received.len(), 50);
        let is_reordered = received.windows(2).any(|w| w[1] < w[0]);
        assert!(is_reordered, "expected some reordering with large jitter");
    }

    #[test]
    fn test_delay_never_underflows() {
        // jitter larger than the base latency clamps at zero
        let mut sim = NetworkSimulator::new(config(2, 10, 0.0, 7));
        for i in 0..20 {
            sim.send(make_test_packet(i), 0);
        }
        assert!(sim.next_delivery().unwrap() <= 12);
        assert_eq!(sim.drain().len(), 20);
    }

    #[test]
    fn test_stats() {
        let mut sim = NetworkSimulator::new(config(0, 0, 0.25, 42));

        for i in 0..100 {
            sim.send(make_test_packet(i), 0);
        }

        let loss_rate = sim.stats().loss_rate();
        assert!(loss_rate > 0.15 && loss_rate < 0.35);
    }
}
