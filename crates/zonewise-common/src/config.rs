//! Configuration types for zonewise
//!
//! This module defines configuration structures used by the placement engine
//! and the admin CLI.

use crate::error::{Error, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for zonewise
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Placement policy configuration
    pub placement: PlacementConfig,
    /// Cluster membership and ledger catalog
    pub cluster: ClusterConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Which placement policy implementation to run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Spread write-quorum windows across top-level fault domains
    #[default]
    ZoneAware,
    /// Rotate over nodes without regard to fault domains
    RoundRobin,
}

/// How an ensemble is cut into write-quorum windows for evaluation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowMode {
    /// Disjoint blocks of `write_quorum` consecutive members
    #[default]
    Contiguous,
    /// One window starting at every position, wrapping around the end
    Rotating,
}

/// Placement policy configuration, captured once at initialization
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Policy implementation
    pub policy: PolicyKind,
    /// Zones a write-quorum window should span to meet the strict level
    pub desired_zones: usize,
    /// Zones a write-quorum window must span to meet the soft level
    pub min_zones: usize,
    /// Never select nodes whose zone could not be resolved
    pub exclude_unknown_zone: bool,
    /// Windowing used by the adherence evaluator
    pub window_mode: WindowMode,
    /// Also require an acknowledging set to span `min(write_quorum, min_zones)`
    /// zones. Off: only the ack quorum size is checked.
    pub enforce_ack_zone_spread: bool,
    /// Fault-domain resolver
    pub resolver: ResolverConfig,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::ZoneAware,
            desired_zones: 3,
            min_zones: 2,
            exclude_unknown_zone: true,
            window_mode: WindowMode::Contiguous,
            enforce_ack_zone_spread: false,
            resolver: ResolverConfig::default(),
        }
    }
}

impl PlacementConfig {
    /// Check the invariants between the zone thresholds
    pub fn validate(&self) -> Result<()> {
        if self.min_zones > self.desired_zones {
            return Err(Error::configuration(format!(
                "min_zones ({}) must not exceed desired_zones ({})",
                self.min_zones, self.desired_zones
            )));
        }
        if self.resolver.name.trim().is_empty() {
            return Err(Error::configuration("resolver name must not be empty"));
        }
        Ok(())
    }
}

/// Resolver implementation name plus resolver-specific properties
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Registered resolver name (e.g. "static")
    pub name: String,
    /// Free-form properties interpreted by the resolver
    pub properties: BTreeMap<String, String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name: "static".to_string(),
            properties: BTreeMap::new(),
        }
    }
}

/// Cluster membership as seen by the admin tooling
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Metadata service the membership and ledgers are read from
    pub metadata_service_uri: String,
    /// Writable storage nodes
    pub writable: Vec<NodeId>,
    /// Read-only storage nodes
    pub read_only: Vec<NodeId>,
    /// Known ledgers and their ensembles
    pub ledgers: Vec<LedgerConfig>,
}

/// Ensemble layout of a single ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger identifier
    pub id: u64,
    /// Current ensemble, in write order
    pub ensemble: Vec<NodeId>,
    /// Write quorum size
    pub write_quorum: i32,
    /// Ack quorum size
    pub ack_quorum: i32,
    /// Whether the ledger is still open for writes
    #[serde(default)]
    pub open: bool,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
