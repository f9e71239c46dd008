//! Configuration for the packet-sim application.
//!
//! Handles parsing command-line arguments and generating sensible defaults
//! (including randomized defaults that are reproducible with a seed).
//!
//! # Philosophy
//!
//! The tool should work with ZERO arguments, using intelligent defaults.
//! All defaults are printed so runs are reproducible.

use clap::{ArgAction, Parser};
use packet_sim_core::fragmentation::FRAGMENT_HEADER_SIZE;
use packet_sim_core::network::NetworkConfig;
use packet_sim_core::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Command-line flags. Anything left out is filled in by [`Config::resolve`].
#[derive(Parser, Debug)]
#[command(
    name = "packet-sim",
    version,
    about = "Fragment tagged, zero-compressed datagrams over a lossy simulated link and reassemble them"
)]
pub struct Cli {
    /// Random seed for determinism (default: time-based)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of datagrams to send
    #[arg(long)]
    pub datagrams: Option<usize>,

    /// Largest datagram payload in bytes
    #[arg(long = "max-payload")]
    pub max_payload: Option<usize>,

    /// Byte tags attached to each datagram
    #[arg(long = "tags")]
    pub tags_per_datagram: Option<usize>,

    /// MTU size in bytes, fragment header included
    #[arg(long)]
    pub mtu: Option<usize>,

    /// Base network latency in ticks (default: random 5-40)
    #[arg(long)]
    pub latency: Option<u64>,

    /// Latency jitter in ticks (default: random 0-20)
    #[arg(long)]
    pub jitter: Option<u64>,

    /// Extra hold-back window in ticks (default: random 0-16)
    #[arg(long = "reorder-window")]
    pub reorder_window: Option<u64>,

    /// Packet loss rate 0.0-1.0 (default: random 0-0.05)
    #[arg(long = "loss")]
    pub loss_rate: Option<f64>,

    /// Disable packet loss (same as --loss 0)
    #[arg(long = "no-loss", action = ArgAction::SetTrue, conflicts_with = "loss_rate")]
    pub no_loss: bool,

    /// Reassembly timeout in ticks (default: random 200-800)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Max datagrams in flight at the reassembler
    #[arg(long = "max-inflight")]
    pub max_inflight: Option<usize>,

    /// Print resolved configuration
    #[arg(long = "print-config", action = ArgAction::SetTrue)]
    pub print_config: bool,

    /// Don't print metrics summary
    #[arg(long = "no-metrics", action = ArgAction::SetTrue)]
    pub no_metrics: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Complete configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct Config {
    // === Workload ===
    /// Seed for the workload generator
    pub seed: u64,

    /// Number of datagrams to send
    pub datagrams: usize,

    /// Largest datagram payload in bytes
    pub max_payload: usize,

    /// Byte tags attached to each datagram
    pub tags_per_datagram: usize,

    // === Network ===
    /// MTU size in bytes
    pub mtu: usize,

    /// Network simulation config
    pub network: NetworkConfig,

    // === Reassembly ===
    /// Maximum datagrams in flight
    pub max_inflight: usize,

    /// Reassembly timeout in ticks
    pub reassembly_timeout: u64,

    // === Behavior ===
    /// Whether to print detailed config
    pub print_config: bool,

    /// Whether to print detailed metrics summary
    pub print_metrics: bool,

    /// Log verbosity from `-v` flags
    pub verbose: u8,
}

impl Config {
    /// Fill every missing flag with a default.
    ///
    /// If `--seed` is given, all randomized defaults derive from it (fully
    /// deterministic); otherwise a time-based seed is used and printed.
    ///
    /// # Errors
    /// Returns `Error::Config` if a flag is out of range.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let seed = cli.seed.unwrap_or_else(time_seed);

        // Generate defaults using seed
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let loss_rate = if cli.no_loss {
            0.0
        } else {
            cli.loss_rate.unwrap_or_else(|| {
                // Bias toward small loss rates
                let r: f64 = rng.gen();
                (r * r * 0.05).min(0.05) // 0-5%, biased toward 0
            })
        };

        let config = Config {
            seed,
            datagrams: cli.datagrams.unwrap_or(64),
            max_payload: cli.max_payload.unwrap_or(16 * 1024),
            tags_per_datagram: cli.tags_per_datagram.unwrap_or(4),
            mtu: cli.mtu.unwrap_or(1200),
            network: NetworkConfig {
                base_latency: cli.latency.unwrap_or_else(|| rng.gen_range(5..=40)),
                jitter: cli.jitter.unwrap_or_else(|| rng.gen_range(0..=20)),
                reorder_window: cli.reorder_window.unwrap_or_else(|| rng.gen_range(0..=16)),
                loss_rate,
                seed,
            },
            max_inflight: cli.max_inflight.unwrap_or(64),
            reassembly_timeout: cli.timeout.unwrap_or_else(|| rng.gen_range(200..=800)),
            print_config: cli.print_config,
            print_metrics: !cli.no_metrics,
            verbose: cli.verbose,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mtu <= FRAGMENT_HEADER_SIZE {
            return Err(Error::Config(format!(
                "mtu must exceed the {FRAGMENT_HEADER_SIZE}-byte fragment header, got {}",
                self.mtu
            )));
        }
        if !(0.0..=1.0).contains(&self.network.loss_rate) {
            return Err(Error::Config(format!(
                "loss rate must be within 0.0-1.0, got {}",
                self.network.loss_rate
            )));
        }
        if self.max_payload == 0 {
            return Err(Error::Config("max payload must be at least 1 byte".to_string()));
        }
        if self.max_inflight == 0 {
            return Err(Error::Config("max in-flight must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Default log filter directive for the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        println!("=== Configuration ===");
        println!("Seed: {}", self.seed);
        println!("Datagrams: {} (up to {} bytes each)", self.datagrams, self.max_payload);
        println!("Tags per datagram: {}", self.tags_per_datagram);
        println!("MTU: {} bytes", self.mtu);
        println!();
        println!("=== Network Simulation ===");
        println!("Base latency: {} ticks", self.network.base_latency);
        println!("Jitter: ±{} ticks", self.network.jitter);
        println!("Reorder window: {} ticks", self.network.reorder_window);
        println!("Loss rate: {:.2}%", self.network.loss_rate * 100.0);
        println!();
        println!("=== Reassembly ===");
        println!("Max in-flight datagrams: {}", self.max_inflight);
        println!("Timeout: {} ticks", self.reassembly_timeout);
        println!();
    }
}

fn time_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
