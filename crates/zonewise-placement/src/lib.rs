//! Zonewise Placement - zone-aware ensemble placement
//!
//! This crate chooses which storage nodes hold each write-quorum window of a
//! replicated ledger, and grades existing ensembles by how many top-level
//! fault domains (zones) each window spans.
//!
//! # Policies
//!
//! ## Zone-aware (default)
//! Greedy selection that maximizes the number of distinct zones in every
//! write-quorum window, then the number of distinct racks.
//!
//! ## Round-robin
//! Location-agnostic rotation over the writable nodes.
//!
//! # Example
//! ```ignore
//! use zonewise_placement::{build_policy, ResolverRegistry};
//!
//! let policy = build_policy(&config.placement, &ResolverRegistry::new())?;
//! policy.on_cluster_changed(&writable, &read_only)?;
//! let result = policy.new_ensemble(6, 3, 2, None, Some(&HashSet::new()))?;
//! ```

pub mod adherence;
pub mod policy;
pub mod resolver;
pub mod round_robin;
pub mod topology;
pub mod zone_aware;

pub use adherence::{Windows, ZoneThresholds};
pub use policy::{EnsemblePlacementPolicy, PlacementResult, build_policy};
pub use resolver::{DomainResolver, ResolverFactory, ResolverRegistry, StaticResolver};
pub use round_robin::RoundRobinPolicy;
pub use topology::{ClusterChange, TopologyIndex, TopologySnapshot};
pub use zone_aware::ZoneAwarePolicy;
