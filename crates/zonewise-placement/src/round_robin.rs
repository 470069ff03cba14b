//! Topology-agnostic round-robin placement
//!
//! Hands out writable nodes in node-id order, starting each ensemble one step
//! further along the ring. Locations are ignored: an ensemble adheres as long
//! as no write-quorum window repeats a node.

use crate::adherence::Windows;
use crate::policy::{
    EnsemblePlacementPolicy, PlacementResult, ack_quorum_met, validate_replacement,
    validate_request,
};
use crate::resolver::DomainResolver;
use crate::topology::{ClusterChange, TopologyIndex, TopologySnapshot};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};
use zonewise_common::{
    CustomMetadata, Error, NodeId, PlacementConfig, PlacementPolicyAdherence, Result,
};

/// Placement policy rotating through the writable nodes
pub struct RoundRobinPolicy {
    config: PlacementConfig,
    topology: TopologyIndex,
    cursor: AtomicUsize,
}

impl RoundRobinPolicy {
    /// Policy name
    pub const NAME: &'static str = "round-robin";

    /// Validate the configuration and start with an empty topology
    pub fn initialize(config: PlacementConfig, resolver: Arc<dyn DomainResolver>) -> Result<Self> {
        config.validate()?;
        info!("Round-robin placement: window_mode={:?}", config.window_mode);
        Ok(Self {
            config,
            topology: TopologyIndex::new(resolver),
            cursor: AtomicUsize::new(0),
        })
    }

    fn eligible_pool<'a>(
        snapshot: &'a TopologySnapshot,
        exclude_nodes: &HashSet<NodeId>,
    ) -> Vec<&'a NodeId> {
        snapshot
            .writable()
            .iter()
            .filter(|node| !exclude_nodes.contains(*node))
            .collect()
    }

    fn next_start(&self, len: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    fn adherence_of(&self, ensemble: &[NodeId], windows: Option<Windows>) -> PlacementPolicyAdherence {
        let Some(windows) = windows else {
            return PlacementPolicyAdherence::Fail;
        };
        let distinct = windows.starts().all(|start| {
            let members: HashSet<&NodeId> = windows.members(start).map(|i| &ensemble[i]).collect();
            members.len() == windows.members(start).count()
        });
        if distinct {
            PlacementPolicyAdherence::MeetsStrict
        } else {
            debug!(
                "Ensemble {:?} repeats a node within a window ({:?})",
                ensemble, self.config.window_mode
            );
            PlacementPolicyAdherence::Fail
        }
    }
}

impl EnsemblePlacementPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_cluster_changed(
        &self,
        writable: &HashSet<NodeId>,
        read_only: &HashSet<NodeId>,
    ) -> Result<ClusterChange> {
        self.topology.apply(writable, read_only)
    }

    fn new_ensemble(
        &self,
        ensemble_size: i32,
        write_quorum: i32,
        _ack_quorum: i32,
        _custom_metadata: Option<&CustomMetadata>,
        exclude_nodes: Option<&HashSet<NodeId>>,
    ) -> Result<PlacementResult> {
        let (sizes, exclude_nodes) = validate_request(ensemble_size, write_quorum, exclude_nodes)?;
        let snapshot = self.topology.snapshot()?;

        let pool = Self::eligible_pool(&snapshot, exclude_nodes);
        if pool.len() < sizes.ensemble {
            return Err(Error::NotEnoughNodes {
                available: pool.len(),
                required: sizes.ensemble,
            });
        }
        if sizes.ensemble == 0 {
            return Ok(PlacementResult {
                ensemble: Vec::new(),
                adherence: PlacementPolicyAdherence::Fail,
            });
        }

        let start = self.next_start(pool.len());
        let ensemble: Vec<NodeId> = (0..sizes.ensemble)
            .map(|i| pool[(start + i) % pool.len()].clone())
            .collect();
        debug!("Round-robin ensemble {:?} from offset {}", ensemble, start);

        let windows = Windows::new(sizes.ensemble, sizes.write_quorum, self.config.window_mode);
        let adherence = self.adherence_of(&ensemble, Some(windows));
        Ok(PlacementResult {
            ensemble,
            adherence,
        })
    }

    fn replace_node(
        &self,
        ensemble_size: i32,
        write_quorum: i32,
        _ack_quorum: i32,
        _custom_metadata: Option<&CustomMetadata>,
        current_ensemble: &[NodeId],
        node_to_replace: &NodeId,
        exclude_nodes: Option<&HashSet<NodeId>>,
    ) -> Result<PlacementResult> {
        let (sizes, exclude_nodes) = validate_request(ensemble_size, write_quorum, exclude_nodes)?;
        let position = validate_replacement(sizes, current_ensemble, node_to_replace)?;
        let snapshot = self.topology.snapshot()?;

        let candidates: Vec<&NodeId> = Self::eligible_pool(&snapshot, exclude_nodes)
            .into_iter()
            .filter(|node| !current_ensemble.contains(*node))
            .collect();
        if candidates.is_empty() {
            return Err(Error::NotEnoughNodes {
                available: 0,
                required: 1,
            });
        }

        let replacement = candidates[self.next_start(candidates.len())].clone();
        debug!("Replacing {} at position {} with {}", node_to_replace, position, replacement);
        let mut ensemble = current_ensemble.to_vec();
        ensemble[position] = replacement;

        let windows = Windows::new(sizes.ensemble, sizes.write_quorum, self.config.window_mode);
        let adherence = self.adherence_of(&ensemble, Some(windows));
        Ok(PlacementResult {
            ensemble,
            adherence,
        })
    }

    fn is_ensemble_adhering(
        &self,
        ensemble: Option<&[NodeId]>,
        write_quorum: i32,
        _ack_quorum: i32,
    ) -> Result<PlacementPolicyAdherence> {
        self.topology.snapshot()?;
        let ensemble = ensemble.ok_or(Error::MissingArgument("ensemble"))?;
        let windows = Windows::for_evaluation(ensemble.len(), write_quorum, self.config.window_mode)?;
        Ok(self.adherence_of(ensemble, windows))
    }

    fn are_acked_nodes_adhering(
        &self,
        acked_nodes: Option<&HashSet<NodeId>>,
        _write_quorum: i32,
        ack_quorum: i32,
    ) -> Result<bool> {
        self.topology.snapshot()?;
        let acked_nodes = acked_nodes.ok_or(Error::MissingArgument("acked_nodes"))?;
        Ok(ack_quorum_met(acked_nodes.len(), ack_quorum))
    }

    fn topology(&self) -> Result<Arc<TopologySnapshot>> {
        self.topology.snapshot()
    }

    fn uninitialize(&self) {
        if self.topology.close() {
            info!("Round-robin placement policy uninitialized");
        }
    }
}
