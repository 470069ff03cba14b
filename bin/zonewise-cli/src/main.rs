//! Zonewise CLI - placement admin command line interface
//!
//! This binary runs the placement policy against the cluster described in the
//! configuration file: place new ensembles, grade existing ones, inspect the
//! topology and plan bookie recovery.

mod recover;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recover::{RecoverCommand, RecoverFlags};
use session::PolicySession;
use std::collections::HashSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zonewise_common::{Config, NodeId};
use zonewise_placement::{EnsemblePlacementPolicy, ResolverRegistry};

#[derive(Parser, Debug)]
#[command(name = "zonewise-cli")]
#[command(about = "Zonewise placement admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/zonewise/zonewise.toml")]
    config: String,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Select nodes for a new ensemble
    Place {
        /// Ensemble size
        #[arg(short, long, allow_negative_numbers = true)]
        ensemble: i32,
        /// Write quorum size
        #[arg(short, long, allow_negative_numbers = true)]
        write_quorum: i32,
        /// Ack quorum size
        #[arg(short, long, allow_negative_numbers = true)]
        ack_quorum: i32,
        /// Nodes that must not be selected (host:port)
        #[arg(short = 'x', long)]
        exclude: Vec<String>,
    },
    /// Grade the zone spread of an ensemble
    Check {
        #[arg(short, long, allow_negative_numbers = true)]
        write_quorum: i32,
        #[arg(short, long, allow_negative_numbers = true)]
        ack_quorum: i32,
        /// Ensemble members, in write order
        nodes: Vec<String>,
    },
    /// Check whether a set of acknowledging nodes is fault tolerant
    Acked {
        #[arg(short, long, allow_negative_numbers = true)]
        write_quorum: i32,
        #[arg(short, long, allow_negative_numbers = true)]
        ack_quorum: i32,
        /// Nodes that acknowledged the write
        nodes: Vec<String>,
    },
    /// Show zones and their writable nodes
    Topology,
    /// Plan re-replication of the ledgers on failed bookies
    Recover(RecoverFlags),
}

/// Load the configuration file, layered under `ZONEWISE__*` environment
/// variables (e.g. `ZONEWISE__PLACEMENT__MIN_ZONES=1`)
fn load_config(path: &str) -> Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("ZONEWISE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {path}"))?;

    let config: Config = settings
        .try_deserialize()
        .with_context(|| format!("Invalid configuration in {path}"))?;
    config.placement.validate()?;
    Ok(config)
}

/// Build the configured policy and feed it the configured membership
fn open_policy(config: &Config) -> Result<PolicySession> {
    let writable: HashSet<NodeId> = config.cluster.writable.iter().cloned().collect();
    let read_only: HashSet<NodeId> = config.cluster.read_only.iter().cloned().collect();
    PolicySession::open(&config.placement, &ResolverRegistry::new(), &writable, &read_only)
}

fn parse_nodes(values: &[String]) -> Result<Vec<NodeId>> {
    values
        .iter()
        .map(|v| NodeId::parse(v).with_context(|| format!("Invalid node address '{v}'")))
        .collect()
}

fn print_topology(policy: &dyn EnsemblePlacementPolicy) -> Result<()> {
    let snapshot = policy.topology()?;
    println!("Cluster Topology (v{})", snapshot.version());
    println!("=====================");
    println!("{:<24} {:<30} {:<20}", "ZONE", "NODE", "LOCATION");
    println!("{}", "-".repeat(74));
    for (zone, nodes) in snapshot.zones() {
        for node in nodes {
            let location = snapshot
                .location(node)
                .map_or_else(|| "-".to_string(), ToString::to_string);
            println!("{zone:<24} {:<30} {location:<20}", node.as_str());
        }
    }
    for node in snapshot.unknown_zone_nodes() {
        println!("{:<24} {:<30} {:<20}", "(unknown)", node.as_str(), "-");
    }
    for node in snapshot.read_only() {
        println!("{:<24} {:<30} {:<20}", "(read-only)", node.as_str(), "-");
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args.config)?;

    // Initialize logging
    let level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Place {
            ensemble,
            write_quorum,
            ack_quorum,
            exclude,
        } => {
            let policy = open_policy(&config)?;
            let exclude: HashSet<NodeId> = parse_nodes(&exclude)?.into_iter().collect();
            let result = policy.new_ensemble(ensemble, write_quorum, ack_quorum, None, Some(&exclude))?;

            println!("Ensemble ({})", result.adherence);
            println!("========");
            for (position, node) in result.ensemble.iter().enumerate() {
                println!("{position:>3}  {node}");
            }
        }
        Commands::Check {
            write_quorum,
            ack_quorum,
            nodes,
        } => {
            let policy = open_policy(&config)?;
            let ensemble = parse_nodes(&nodes)?;
            let adherence = policy.is_ensemble_adhering(Some(&ensemble), write_quorum, ack_quorum)?;
            println!("{adherence}");
        }
        Commands::Acked {
            write_quorum,
            ack_quorum,
            nodes,
        } => {
            let policy = open_policy(&config)?;
            let acked: HashSet<NodeId> = parse_nodes(&nodes)?.into_iter().collect();
            let adhering = policy.are_acked_nodes_adhering(Some(&acked), write_quorum, ack_quorum)?;
            println!("{}", if adhering { "ADHERING" } else { "NOT_ADHERING" });
        }
        Commands::Topology => {
            let policy = open_policy(&config)?;
            print_topology(&*policy)?;
        }
        Commands::Recover(flags) => {
            if !RecoverCommand::new().apply(Some(&config), Some(&flags))? {
                anyhow::bail!("Recovery did not complete");
            }
        }
    }

    Ok(())
}
