//! packet-sim: drive tagged datagrams through fragmentation, a lossy
//! simulated link and reassembly, then verify bytes and tags.
//!
//! # Pipeline
//!
//! ```text
//! Workload -> push SequenceHeader -> fragment -> NetworkSimulator
//!          -> Reassembler -> pop SequenceHeader -> verify against original
//! ```
//!
//! One datagram is injected per tick; the run ends once the link is empty
//! and no datagram is still waiting for fragments.

mod config;
mod input_gen;

use std::process::ExitCode;

use clap::Parser;
use packet_sim_core::buffer::{BufferIterator, ConstBufferIterator};
use packet_sim_core::fragmentation::{fragment, FragmentHeader};
use packet_sim_core::metrics::{Metrics, ReorderTracker};
use packet_sim_core::network::NetworkSimulator;
use packet_sim_core::packet::Header;
use packet_sim_core::reassembly::Reassembler;
use packet_sim_core::tag::TagId;
use packet_sim_core::{Packet, Result};
use tracing_subscriber::EnvFilter;

use config::{Cli, Config};
use input_gen::{Workload, SEQUENCE_TAG};

/// End-to-end sequence number prepended to every datagram before it is
/// fragmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SequenceHeader {
    sequence: u64,
}

impl Header for SequenceHeader {
    fn serialized_size(&self) -> usize {
        8
    }

    fn serialize(&self, it: &mut BufferIterator<'_>) -> Result<()> {
        it.write_be(self.sequence)
    }

    fn deserialize(it: &mut ConstBufferIterator<'_>) -> Result<Self> {
        Ok(Self {
            sequence: it.read_be()?,
        })
    }
}

fn main() -> ExitCode {
    let config = match Config::resolve(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    if config.print_config {
        config.print();
    }

    match run(&config) {
        Ok(metrics) => {
            if config.print_metrics {
                metrics.print_summary();
            }
            metrics.print_result();
            if metrics.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "simulation aborted");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `-v` wins over `RUST_LOG`; with neither, only warnings are shown.
fn init_tracing(config: &Config) {
    let filter = if config.verbose > 0 {
        EnvFilter::new(config.log_level())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(config: &Config) -> Result<Metrics> {
    let mut metrics = Metrics::new();
    let mut workload = Workload::new(config.seed, config.max_payload, config.tags_per_datagram);
    let mut network = NetworkSimulator::new(config.network);
    let mut reassembler = Reassembler::new(config.max_inflight, config.reassembly_timeout);
    let mut reorder = ReorderTracker::new();

    let mut originals: Vec<Packet> = Vec::with_capacity(config.datagrams);
    let mut now: u64 = 0;

    tracing::info!(seed = config.seed, datagrams = config.datagrams, "starting run");

    loop {
        // Inject one datagram per tick
        if originals.len() < config.datagrams {
            let sequence = originals.len() as u64;
            let original = workload.next_shape().build(sequence)?;

            metrics.datagrams_created += 1;
            metrics.datagram_bytes += original.size() as u64;
            metrics.zero_bytes += original.buffer().zero_size() as u64;
            metrics.tags_attached += original.byte_tags().len() as u64;

            let mut wire = original.clone();
            metrics.record_growth(wire.push_header(&SequenceHeader { sequence })?);

            let pieces = fragment(&wire, sequence, config.mtu)?;
            metrics.fragments_created += pieces.len() as u64;
            for piece in pieces {
                network.send(piece, now);
            }
            originals.push(original);
        }

        while let Some(piece) = network.recv(now) {
            metrics.fragments_received += 1;
            if let Ok(header) = piece.peek_header::<FragmentHeader>() {
                if reorder.track(header.datagram_id, header.offset) {
                    metrics.fragments_reordered += 1;
                }
            }

            match reassembler.insert(piece, now) {
                Ok(Some((datagram_id, datagram))) => {
                    deliver(datagram_id, datagram, &originals, &mut metrics, &mut reorder)?;
                    for (datagram_id, datagram) in reassembler.drain_completed() {
                        deliver(datagram_id, datagram, &originals, &mut metrics, &mut reorder)?;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    metrics.fragments_invalid += 1;
                    tracing::warn!(error = %e, now, "fragment rejected");
                }
            }
        }

        for timeout in reassembler.check_timeouts(now) {
            metrics.datagrams_timed_out += 1;
            tracing::warn!(error = %timeout, "datagram abandoned");
        }
        for (datagram_id, datagram) in reassembler.drain_completed() {
            deliver(datagram_id, datagram, &originals, &mut metrics, &mut reorder)?;
        }

        let done = originals.len() == config.datagrams
            && !network.has_pending()
            && reassembler.stats().inflight == 0;
        if done {
            break;
        }
        now += 1;
    }

    // Datagrams that completed behind one that was lost entirely
    for (datagram_id, datagram) in reassembler.flush() {
        deliver(datagram_id, datagram, &originals, &mut metrics, &mut reorder)?;
    }

    metrics.ticks = now;
    metrics.record_network(&network.stats());
    metrics.complete();

    tracing::info!(ticks = now, reassembled = metrics.datagrams_reassembled, "run finished");
    Ok(metrics)
}

/// Strip the sequence header and compare bytes and tags with the original.
fn deliver(
    datagram_id: u64,
    mut datagram: Packet,
    originals: &[Packet],
    metrics: &mut Metrics,
    reorder: &mut ReorderTracker,
) -> Result<()> {
    reorder.clear_datagram(datagram_id);
    metrics.datagrams_reassembled += 1;

    let header: SequenceHeader = datagram.pop_header()?;
    let Some(original) = originals.get(datagram_id as usize) else {
        tracing::warn!(datagram_id, "reassembled unknown datagram");
        metrics.bytes_mismatched += 1;
        return Ok(());
    };

    if header.sequence == datagram_id && datagram.to_vec() == original.to_vec() {
        metrics.bytes_verified += 1;
    } else {
        tracing::warn!(datagram_id, sequence = header.sequence, "datagram bytes differ");
        metrics.bytes_mismatched += 1;
    }

    let expected = original.byte_tags();
    for span in &expected {
        for offset in [span.start, span.end - 1] {
            let found = datagram.get_byte_tag(span.tag.id(), offset);
            let passed = found.as_ref() == Some(&span.tag);
            if !passed {
                tracing::warn!(datagram_id, tag = %span.tag.id(), offset, "byte tag lost");
            }
            metrics.record_tag_check(passed);
        }
    }
    metrics.record_tag_check(datagram.byte_tags().len() == expected.len());

    let sequence = datagram
        .get_packet_tag(TagId(SEQUENCE_TAG))
        .and_then(|tag| tag.value_u64());
    metrics.record_tag_check(sequence == Some(datagram_id));

    tracing::debug!(datagram_id, size = datagram.size(), "datagram verified");
    Ok(())
}
