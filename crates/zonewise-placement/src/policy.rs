//! Placement policy interface
//!
//! Every placement strategy implements [`EnsemblePlacementPolicy`]; the
//! configured one is built by [`build_policy`] and shared behind an `Arc`.

use crate::resolver::ResolverRegistry;
use crate::round_robin::RoundRobinPolicy;
use crate::topology::{ClusterChange, TopologySnapshot};
use crate::zone_aware::ZoneAwarePolicy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use zonewise_common::{
    CustomMetadata, Error, NodeId, PlacementConfig, PlacementPolicyAdherence, PolicyKind, Result,
};

/// Result of a placement decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementResult {
    /// Selected nodes, in write order
    pub ensemble: Vec<NodeId>,
    /// Spread of the selected ensemble
    pub adherence: PlacementPolicyAdherence,
}

impl PlacementResult {
    /// Check if the ensemble meets the strict zone requirement
    #[must_use]
    pub fn is_strictly_adhering(&self) -> bool {
        self.adherence == PlacementPolicyAdherence::MeetsStrict
    }
}

/// Strategy for choosing and validating ensembles.
///
/// Quorum sizes are signed: they come straight from ledger metadata and
/// client requests, and out-of-range values are rejected or classified by the
/// implementation rather than being unrepresentable.
pub trait EnsemblePlacementPolicy: Send + Sync {
    /// Policy name, for logs and the CLI
    fn name(&self) -> &'static str;

    /// Replace the cluster membership
    fn on_cluster_changed(
        &self,
        writable: &HashSet<NodeId>,
        read_only: &HashSet<NodeId>,
    ) -> Result<ClusterChange>;

    /// Select nodes for a new ensemble
    fn new_ensemble(
        &self,
        ensemble_size: i32,
        write_quorum: i32,
        ack_quorum: i32,
        custom_metadata: Option<&CustomMetadata>,
        exclude_nodes: Option<&HashSet<NodeId>>,
    ) -> Result<PlacementResult>;

    /// Replace one member of an existing ensemble, keeping the others in place
    #[allow(clippy::too_many_arguments)]
    fn replace_node(
        &self,
        ensemble_size: i32,
        write_quorum: i32,
        ack_quorum: i32,
        custom_metadata: Option<&CustomMetadata>,
        current_ensemble: &[NodeId],
        node_to_replace: &NodeId,
        exclude_nodes: Option<&HashSet<NodeId>>,
    ) -> Result<PlacementResult>;

    /// Classify the spread of an existing ensemble
    fn is_ensemble_adhering(
        &self,
        ensemble: Option<&[NodeId]>,
        write_quorum: i32,
        ack_quorum: i32,
    ) -> Result<PlacementPolicyAdherence>;

    /// Check whether the nodes that acknowledged a write are enough to call
    /// it fault tolerant
    fn are_acked_nodes_adhering(
        &self,
        acked_nodes: Option<&HashSet<NodeId>>,
        write_quorum: i32,
        ack_quorum: i32,
    ) -> Result<bool>;

    /// Current topology snapshot
    fn topology(&self) -> Result<Arc<TopologySnapshot>>;

    /// Release the topology and the resolver. Later calls fail with
    /// `Error::PolicyClosed`.
    fn uninitialize(&self);
}

/// Build and initialize the policy selected by the configuration
pub fn build_policy(
    config: &PlacementConfig,
    registry: &ResolverRegistry,
) -> Result<Arc<dyn EnsemblePlacementPolicy>> {
    config.validate()?;
    let resolver = registry.build(&config.resolver)?;

    let policy: Arc<dyn EnsemblePlacementPolicy> = match config.policy {
        PolicyKind::ZoneAware => Arc::new(ZoneAwarePolicy::initialize(config.clone(), resolver)?),
        PolicyKind::RoundRobin => Arc::new(RoundRobinPolicy::initialize(config.clone(), resolver)?),
    };
    info!(
        "Initialized {} placement policy with resolver '{}'",
        policy.name(),
        config.resolver.name
    );
    Ok(policy)
}

/// Validated sizes of an ensemble request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EnsembleSizes {
    pub ensemble: usize,
    pub write_quorum: usize,
}

/// Validate the sizes and exclusion set of an ensemble request, in the order
/// callers rely on: zero quorum, size/divisibility, missing exclusions.
pub(crate) fn validate_request(
    ensemble_size: i32,
    write_quorum: i32,
    exclude_nodes: Option<&HashSet<NodeId>>,
) -> Result<(EnsembleSizes, &HashSet<NodeId>)> {
    if write_quorum == 0 {
        return Err(Error::DivisionByZero("write quorum size"));
    }
    if ensemble_size < 0 || ensemble_size % write_quorum != 0 {
        return Err(Error::invalid_argument(format!(
            "ensemble size {ensemble_size} is not a non-negative multiple of write quorum size {write_quorum}"
        )));
    }
    let exclude_nodes = exclude_nodes.ok_or(Error::MissingArgument("exclude_nodes"))?;
    let write_quorum = usize::try_from(write_quorum).map_err(|_| {
        Error::invalid_argument(format!("write quorum size {write_quorum} must be positive"))
    })?;
    let ensemble = usize::try_from(ensemble_size)
        .map_err(|_| Error::invalid_argument(format!("ensemble size {ensemble_size}")))?;

    Ok((
        EnsembleSizes {
            ensemble,
            write_quorum,
        },
        exclude_nodes,
    ))
}

/// Validate a replacement request against the current ensemble
pub(crate) fn validate_replacement(
    sizes: EnsembleSizes,
    current_ensemble: &[NodeId],
    node_to_replace: &NodeId,
) -> Result<usize> {
    if current_ensemble.len() != sizes.ensemble {
        return Err(Error::invalid_argument(format!(
            "current ensemble has {} members, expected {}",
            current_ensemble.len(),
            sizes.ensemble
        )));
    }
    current_ensemble
        .iter()
        .position(|n| n == node_to_replace)
        .ok_or_else(|| {
            Error::invalid_argument(format!("{node_to_replace} is not a member of the ensemble"))
        })
}

/// Check the ack quorum against the size of the acknowledging set
pub(crate) fn ack_quorum_met(acked: usize, ack_quorum: i32) -> bool {
    usize::try_from(ack_quorum).is_ok_and(|required| required <= acked)
}
