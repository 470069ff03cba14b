//! Zone-aware placement policy
//!
//! Spreads every write-quorum window of an ensemble across as many top-level
//! fault domains (zones) as the cluster allows, and grades existing ensembles
//! against the configured `desired_zones` / `min_zones` thresholds.
//!
//! # Selection
//!
//! Slots are filled one at a time. Each slot takes a node from the zone that
//!
//! 1. is not used yet in the current write-quorum window,
//! 2. was used least recently (never-used zones first),
//! 3. sorts first by name.
//!
//! Inside that zone, a node on a rack not yet used in the window is preferred,
//! then the smallest node id. Zones drop out once all their nodes are taken.

use crate::adherence::{Windows, ZoneThresholds};
use crate::policy::{
    EnsemblePlacementPolicy, EnsembleSizes, PlacementResult, ack_quorum_met, validate_replacement,
    validate_request,
};
use crate::resolver::DomainResolver;
use crate::topology::{ClusterChange, TopologyIndex, TopologySnapshot};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zonewise_common::{
    CustomMetadata, DomainPath, Error, NodeId, PlacementConfig, PlacementPolicyAdherence, Result,
};

/// A node eligible for selection, with its location
#[derive(Clone, Copy, Debug)]
struct Candidate<'a> {
    node: &'a NodeId,
    path: &'a DomainPath,
}

impl<'a> Candidate<'a> {
    fn zone(&self) -> Option<&'a str> {
        self.path.zone()
    }
}

/// Unused candidates of one zone during selection
struct ZoneBucket<'a> {
    zone: Option<&'a str>,
    nodes: Vec<Candidate<'a>>,
    last_used: Option<usize>,
}

/// Greedy spread-maximizing selection over an eligible pool.
///
/// The pool must hold at least `sizes.ensemble` candidates, sorted by node id.
fn select_ensemble(pool: Vec<Candidate<'_>>, sizes: EnsembleSizes) -> Vec<NodeId> {
    // Unknown-domain nodes sort after every named zone
    let mut grouped: BTreeMap<(bool, Option<&str>), Vec<Candidate<'_>>> = BTreeMap::new();
    for candidate in pool {
        let zone = candidate.zone();
        grouped.entry((zone.is_none(), zone)).or_default().push(candidate);
    }
    let mut buckets: Vec<ZoneBucket<'_>> = grouped
        .into_iter()
        .map(|((_, zone), nodes)| ZoneBucket {
            zone,
            nodes,
            last_used: None,
        })
        .collect();

    let mut ensemble = Vec::with_capacity(sizes.ensemble);
    let mut window_zones: HashSet<Option<&str>> = HashSet::new();
    let mut window_paths: HashSet<&DomainPath> = HashSet::new();

    for slot in 0..sizes.ensemble {
        if slot % sizes.write_quorum == 0 {
            window_zones.clear();
            window_paths.clear();
        }

        let Some(bucket) = buckets
            .iter_mut()
            .filter(|b| !b.nodes.is_empty())
            .min_by_key(|b| {
                (
                    window_zones.contains(&b.zone),
                    b.last_used.map_or(0, |s| s + 1),
                    b.zone.is_none(),
                    b.zone,
                )
            })
        else {
            break;
        };

        let pick = bucket
            .nodes
            .iter()
            .position(|c| !window_paths.contains(c.path))
            .unwrap_or(0);
        let chosen = bucket.nodes.remove(pick);
        bucket.last_used = Some(slot);

        window_zones.insert(bucket.zone);
        window_paths.insert(chosen.path);
        ensemble.push(chosen.node.clone());
    }

    ensemble
}

/// Placement policy spreading write quorums across zones
pub struct ZoneAwarePolicy {
    config: PlacementConfig,
    thresholds: ZoneThresholds,
    topology: TopologyIndex,
}

impl ZoneAwarePolicy {
    /// Policy name
    pub const NAME: &'static str = "zone-aware";

    /// Validate the configuration and start with an empty topology
    pub fn initialize(config: PlacementConfig, resolver: Arc<dyn DomainResolver>) -> Result<Self> {
        config.validate()?;
        info!(
            "Zone-aware placement: desired_zones={}, min_zones={}, exclude_unknown_zone={}, window_mode={:?}",
            config.desired_zones, config.min_zones, config.exclude_unknown_zone, config.window_mode
        );

        Ok(Self {
            thresholds: ZoneThresholds {
                desired: config.desired_zones,
                min: config.min_zones,
            },
            topology: TopologyIndex::new(resolver),
            config,
        })
    }

    /// Configuration captured at initialization
    #[must_use]
    pub const fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Writable nodes not excluded by the request or by the unknown-zone rule
    fn eligible_pool<'a>(
        &self,
        snapshot: &'a TopologySnapshot,
        exclude_nodes: &HashSet<NodeId>,
    ) -> Vec<Candidate<'a>> {
        snapshot
            .writable_locations()
            .filter(|(node, path)| {
                !exclude_nodes.contains(*node)
                    && !(self.config.exclude_unknown_zone && path.is_unknown())
            })
            .map(|(node, path)| Candidate { node, path })
            .collect()
    }

    fn locations(&self, snapshot: &TopologySnapshot, nodes: &[NodeId]) -> Vec<DomainPath> {
        nodes
            .iter()
            .map(|node| self.topology.locate(snapshot, node))
            .collect()
    }

    /// Adherence of an ensemble that is known to decompose into windows
    fn adherence_of(
        &self,
        snapshot: &TopologySnapshot,
        ensemble: &[NodeId],
        write_quorum: usize,
    ) -> PlacementPolicyAdherence {
        if ensemble.is_empty() {
            return PlacementPolicyAdherence::Fail;
        }
        let paths = self.locations(snapshot, ensemble);
        let zones: Vec<Option<&str>> = paths.iter().map(DomainPath::zone).collect();
        Windows::new(ensemble.len(), write_quorum, self.config.window_mode)
            .classify_all(&zones, self.thresholds)
    }

    fn record_placement(counter: &'static str, outcome: &'static str) {
        metrics::counter!(counter, "outcome" => outcome).increment(1);
    }

    fn finish(
        &self,
        snapshot: &TopologySnapshot,
        counter: &'static str,
        ensemble: Vec<NodeId>,
        write_quorum: usize,
    ) -> PlacementResult {
        let adherence = self.adherence_of(snapshot, &ensemble, write_quorum);
        if adherence == PlacementPolicyAdherence::Fail && !ensemble.is_empty() {
            warn!(
                "Ensemble {:?} spans too few zones for min_zones={} (topology v{})",
                ensemble,
                self.config.min_zones,
                snapshot.version()
            );
        }
        Self::record_placement(counter, "ok");
        PlacementResult {
            ensemble,
            adherence,
        }
    }
}

const NEW_ENSEMBLE_TOTAL: &str = "zonewise_placement_new_ensemble_total";
const REPLACE_NODE_TOTAL: &str = "zonewise_placement_replace_node_total";

impl EnsemblePlacementPolicy for ZoneAwarePolicy {
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
        custom_metadata: Option<&CustomMetadata>,
        exclude_nodes: Option<&HashSet<NodeId>>,
    ) -> Result<PlacementResult> {
        let (sizes, exclude_nodes) = validate_request(ensemble_size, write_quorum, exclude_nodes)
            .inspect_err(|_| Self::record_placement(NEW_ENSEMBLE_TOTAL, "invalid"))?;
        let snapshot = self.topology.snapshot()?;

        let pool = self.eligible_pool(&snapshot, exclude_nodes);
        if pool.len() < sizes.ensemble {
            Self::record_placement(NEW_ENSEMBLE_TOTAL, "not_enough_nodes");
            return Err(Error::NotEnoughNodes {
                available: pool.len(),
                required: sizes.ensemble,
            });
        }

        let ensemble = select_ensemble(pool, sizes);
        debug!(
            "New ensemble {:?} (write quorum {}, {} excluded, {} metadata keys, topology v{})",
            ensemble,
            sizes.write_quorum,
            exclude_nodes.len(),
            custom_metadata.map_or(0, CustomMetadata::len),
            snapshot.version()
        );

        Ok(self.finish(&snapshot, NEW_ENSEMBLE_TOTAL, ensemble, sizes.write_quorum))
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
        let (sizes, exclude_nodes) = validate_request(ensemble_size, write_quorum, exclude_nodes)
            .inspect_err(|_| Self::record_placement(REPLACE_NODE_TOTAL, "invalid"))?;
        let position = validate_replacement(sizes, current_ensemble, node_to_replace)
            .inspect_err(|_| Self::record_placement(REPLACE_NODE_TOTAL, "invalid"))?;
        let snapshot = self.topology.snapshot()?;

        let members: HashSet<&NodeId> = current_ensemble.iter().collect();
        let candidates: Vec<Candidate<'_>> = self
            .eligible_pool(&snapshot, exclude_nodes)
            .into_iter()
            .filter(|c| !members.contains(c.node))
            .collect();

        let paths = self.locations(&snapshot, current_ensemble);
        let zones: Vec<Option<&str>> = paths.iter().map(DomainPath::zone).collect();
        let windows = Windows::new(sizes.ensemble, sizes.write_quorum, self.config.window_mode);
        let affected = windows.containing(position);

        let best = candidates.iter().min_by_key(|c| {
            let mut trial = zones.clone();
            trial[position] = c.zone();
            let adherence = windows.classify(&trial, affected.iter().copied(), self.thresholds);

            let neighbours = affected
                .iter()
                .flat_map(|&start| windows.members(start))
                .filter(|&i| i != position);
            let (zone_overlap, rack_overlap) = neighbours.fold((0usize, 0usize), |(z, r), i| {
                (
                    z + usize::from(zones[i] == c.zone()),
                    r + usize::from(paths[i] == *c.path),
                )
            });

            (Reverse(adherence), zone_overlap, rack_overlap, c.node)
        });

        let Some(best) = best else {
            Self::record_placement(REPLACE_NODE_TOTAL, "not_enough_nodes");
            return Err(Error::NotEnoughNodes {
                available: 0,
                required: 1,
            });
        };

        debug!(
            "Replacing {} at position {} with {} ({})",
            node_to_replace, position, best.node, best.path
        );
        let mut ensemble = current_ensemble.to_vec();
        ensemble[position] = best.node.clone();

        Ok(self.finish(&snapshot, REPLACE_NODE_TOTAL, ensemble, sizes.write_quorum))
    }

    fn is_ensemble_adhering(
        &self,
        ensemble: Option<&[NodeId]>,
        write_quorum: i32,
        _ack_quorum: i32,
    ) -> Result<PlacementPolicyAdherence> {
        let snapshot = self.topology.snapshot()?;
        let ensemble = ensemble.ok_or(Error::MissingArgument("ensemble"))?;

        let adherence =
            match Windows::for_evaluation(ensemble.len(), write_quorum, self.config.window_mode)? {
                None => PlacementPolicyAdherence::Fail,
                Some(windows) => {
                    let paths = self.locations(&snapshot, ensemble);
                    let zones: Vec<Option<&str>> = paths.iter().map(DomainPath::zone).collect();
                    windows.classify_all(&zones, self.thresholds)
                }
            };

        metrics::counter!("zonewise_placement_adherence_total", "level" => adherence.as_str())
            .increment(1);
        debug!(
            "Ensemble {:?} with write quorum {} is {}",
            ensemble, write_quorum, adherence
        );
        Ok(adherence)
    }

    fn are_acked_nodes_adhering(
        &self,
        acked_nodes: Option<&HashSet<NodeId>>,
        write_quorum: i32,
        ack_quorum: i32,
    ) -> Result<bool> {
        let snapshot = self.topology.snapshot()?;
        let acked_nodes = acked_nodes.ok_or(Error::MissingArgument("acked_nodes"))?;

        if !ack_quorum_met(acked_nodes.len(), ack_quorum) {
            return Ok(false);
        }
        if !self.config.enforce_ack_zone_spread {
            return Ok(true);
        }

        let required_zones =
            usize::try_from(write_quorum).map_or(0, |wq| wq.min(self.config.min_zones));
        if required_zones == 0 {
            return Ok(true);
        }

        // The unknown domain is one domain of its own
        let zones: HashSet<Option<String>> = acked_nodes
            .iter()
            .map(|node| {
                self.topology
                    .locate(&snapshot, node)
                    .zone()
                    .map(str::to_string)
            })
            .collect();
        Ok(zones.len() >= required_zones)
    }

    fn topology(&self) -> Result<Arc<TopologySnapshot>> {
        self.topology.snapshot()
    }

    fn uninitialize(&self) {
        if self.topology.close() {
            info!("Zone-aware placement policy uninitialized");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;
    use PlacementPolicyAdherence::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use zonewise_common::WindowMode;

    fn node(addr: &str) -> NodeId {
        NodeId::parse(addr).unwrap()
    }

    fn set(addrs: &[&str]) -> HashSet<NodeId> {
        addrs.iter().map(|a| node(a)).collect()
    }

    /// Policy whose resolver knows `layout` as `(host:port, path)` pairs
    fn policy_with(config: PlacementConfig, layout: &[(&str, &str)]) -> ZoneAwarePolicy {
        let resolver = StaticResolver::new();
        for (addr, path) in layout {
            resolver.add_node(node(addr).host(), DomainPath::parse(path).unwrap());
        }
        ZoneAwarePolicy::initialize(config, Arc::new(resolver)).unwrap()
    }

    fn config(desired: usize, min: usize) -> PlacementConfig {
        PlacementConfig {
            desired_zones: desired,
            min_zones: min,
            ..Default::default()
        }
    }

    fn adherence(policy: &ZoneAwarePolicy, ensemble: &[&str], wq: i32, aq: i32) -> Result<PlacementPolicyAdherence> {
        let ensemble: Vec<NodeId> = ensemble.iter().map(|a| node(a)).collect();
        policy.is_ensemble_adhering(Some(&ensemble), wq, aq)
    }

    #[test]
    fn test_adherence_single_zone_single_node() {
        let policy = policy_with(config(2, 1), &[("127.0.0.1:8000", "/region-a/rack-1")]);
        assert_eq!(adherence(&policy, &["127.0.0.1:8000"], 1, 1).unwrap(), MeetsSoft);
    }

    #[test]
    fn test_adherence_same_region_different_racks() {
        let policy = policy_with(
            config(2, 1),
            &[
                ("127.0.0.1:8000", "/region-a/rack-1"),
                ("127.0.0.2:8000", "/region-a/rack-2"),
            ],
        );
        assert_eq!(
            adherence(&policy, &["127.0.0.1:8000", "127.0.0.2:8000"], 2, 1).unwrap(),
            MeetsSoft
        );
    }

    #[test]
    fn test_adherence_two_regions() {
        let policy = policy_with(
            config(2, 1),
            &[
                ("127.0.0.1:8000", "/region-a/rack-1"),
                ("127.0.0.2:8000", "/region-b/rack-1"),
            ],
        );
        assert_eq!(
            adherence(&policy, &["127.0.0.1:8000", "127.0.0.2:8000"], 2, 1).unwrap(),
            MeetsStrict
        );
    }

    #[test]
    fn test_adherence_degenerate_inputs() {
        let policy = policy_with(config(2, 1), &[("127.0.0.1:8000", "/region-a/rack-1")]);

        assert!(matches!(
            policy.is_ensemble_adhering(None, 1, 2),
            Err(Error::MissingArgument(_))
        ));
        assert_eq!(adherence(&policy, &[], 2, 1).unwrap(), Fail);
        assert!(matches!(
            adherence(&policy, &[], 0, 0),
            Err(Error::DivisionByZero(_))
        ));
        assert!(matches!(
            adherence(&policy, &["127.0.0.1:8000"], 0, 0),
            Err(Error::DivisionByZero(_))
        ));
        assert_eq!(adherence(&policy, &["127.0.0.1:8000"], -2, -1).unwrap(), Fail);
        assert_eq!(adherence(&policy, &["127.0.0.1:8000"], 2, -2).unwrap(), Fail);
    }

    #[test]
    fn test_adherence_thresholds() {
        let layout = [
            ("10.0.0.1:1", "/a/r1"),
            ("10.0.0.2:1", "/b/r1"),
            ("10.0.0.3:1", "/c/r1"),
        ];
        let ensemble = ["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1"];

        let policy = policy_with(config(3, 2), &layout);
        assert_eq!(adherence(&policy, &ensemble, 3, 2).unwrap(), MeetsStrict);

        let policy = policy_with(config(4, 3), &layout);
        assert_eq!(adherence(&policy, &ensemble, 3, 2).unwrap(), MeetsSoft);

        let policy = policy_with(config(5, 4), &layout);
        assert_eq!(adherence(&policy, &ensemble, 3, 2).unwrap(), Fail);
    }

    #[test]
    fn test_adherence_worst_window_wins() {
        let policy = policy_with(
            config(2, 2),
            &[
                ("10.0.0.1:1", "/a/r1"),
                ("10.0.0.2:1", "/b/r1"),
                ("10.0.0.3:1", "/a/r2"),
                ("10.0.0.4:1", "/a/r3"),
            ],
        );
        let ensemble = ["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1", "10.0.0.4:1"];
        assert_eq!(adherence(&policy, &ensemble, 2, 2).unwrap(), Fail);
        assert_eq!(adherence(&policy, &ensemble[..2], 2, 2).unwrap(), MeetsStrict);
    }

    #[test]
    fn test_adherence_rotating_windows() {
        let layout = [
            ("10.0.0.1:1", "/a/r1"),
            ("10.0.0.2:1", "/b/r1"),
            ("10.0.0.3:1", "/b/r2"),
            ("10.0.0.4:1", "/a/r2"),
        ];
        let ensemble = ["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1", "10.0.0.4:1"];

        let contiguous = policy_with(config(2, 1), &layout);
        assert_eq!(adherence(&contiguous, &ensemble, 2, 2).unwrap(), MeetsStrict);

        let rotating = policy_with(
            PlacementConfig {
                window_mode: WindowMode::Rotating,
                ..config(2, 1)
            },
            &layout,
        );
        assert_eq!(adherence(&rotating, &ensemble, 2, 2).unwrap(), MeetsSoft);
    }

    #[test]
    fn test_adherence_unknown_domain_is_one_domain() {
        let policy = policy_with(config(2, 1), &[("10.0.0.1:1", "/a/r1")]);
        assert_eq!(adherence(&policy, &["10.0.0.9:1"], 1, 1).unwrap(), MeetsSoft);
        assert_eq!(
            adherence(&policy, &["10.0.0.1:1", "10.0.0.9:1"], 2, 1).unwrap(),
            MeetsStrict
        );
        // Two unresolved nodes share the same unknown domain
        assert_eq!(
            adherence(&policy, &["10.0.0.8:1", "10.0.0.9:1"], 2, 1).unwrap(),
            MeetsSoft
        );
    }

    fn two_region_pool() -> ZoneAwarePolicy {
        let layout = [
            ("127.0.0.1:8000", "/region-a/rack-1"),
            ("127.0.0.2:8000", "/region-b/rack-1"),
        ];
        let policy = policy_with(config(1, 0), &layout);
        policy
            .on_cluster_changed(&set(&["127.0.0.1:8000", "127.0.0.2:8000"]), &HashSet::new())
            .unwrap();
        policy
    }

    #[test]
    fn test_new_ensemble_uses_whole_pool() {
        let policy = two_region_pool();
        let result = policy
            .new_ensemble(2, 1, 0, None, Some(&HashSet::new()))
            .unwrap();
        assert_eq!(result.ensemble.len(), 2);
        assert_eq!(
            result.ensemble.iter().cloned().collect::<HashSet<_>>(),
            set(&["127.0.0.1:8000", "127.0.0.2:8000"])
        );
        assert!(result.is_strictly_adhering());
    }

    #[test]
    fn test_new_ensemble_not_enough_after_exclusion() {
        let policy = two_region_pool();
        let err = policy
            .new_ensemble(2, 1, 1, None, Some(&set(&["127.0.0.1:8000"])))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotEnoughNodes {
                available: 1,
                required: 2
            }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_new_ensemble_with_exclusion_and_metadata() {
        let policy = two_region_pool();
        let mut metadata = CustomMetadata::new();
        metadata.insert("property".to_string(), b"bytes".to_vec());

        let result = policy
            .new_ensemble(1, 1, 1, Some(&metadata), Some(&set(&["127.0.0.1:8000"])))
            .unwrap();
        assert_eq!(result.ensemble, vec![node("127.0.0.2:8000")]);
    }

    #[test]
    fn test_new_ensemble_empty() {
        let policy = two_region_pool();
        let result = policy
            .new_ensemble(0, 1, 2, None, Some(&HashSet::new()))
            .unwrap();
        assert!(result.ensemble.is_empty());
        assert_eq!(result.adherence, Fail);
    }

    #[test]
    fn test_new_ensemble_validation() {
        let policy = two_region_pool();
        let empty = HashSet::new();

        assert!(matches!(
            policy.new_ensemble(-1, -2, -2, None, Some(&empty)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            policy.new_ensemble(2, 1, 1, None, None),
            Err(Error::MissingArgument(_))
        ));
        assert!(matches!(
            policy.new_ensemble(2, -1, -1, None, None),
            Err(Error::MissingArgument(_))
        ));
        assert!(matches!(
            policy.new_ensemble(1, 0, 2, None, Some(&empty)),
            Err(Error::DivisionByZero(_))
        ));
        assert!(matches!(
            policy.new_ensemble(3, 2, 2, None, Some(&empty)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_ensemble_spreads_windows() {
        let mut layout = Vec::new();
        for zone in ["a", "b", "c"] {
            for i in 1..=3 {
                layout.push((format!("{zone}{i}.example:3181"), format!("/{zone}/rack-{i}")));
            }
        }
        let layout: Vec<(&str, &str)> = layout.iter().map(|(n, p)| (n.as_str(), p.as_str())).collect();
        let policy = policy_with(config(3, 2), &layout);
        let writable: HashSet<NodeId> = layout.iter().map(|(n, _)| node(n)).collect();
        policy.on_cluster_changed(&writable, &HashSet::new()).unwrap();

        let result = policy.new_ensemble(6, 3, 2, None, Some(&HashSet::new())).unwrap();
        assert_eq!(result.adherence, MeetsStrict);

        // Deterministic: least recently used zone first, ties by name
        let zones: Vec<String> = result
            .ensemble
            .iter()
            .map(|n| n.as_str()[..1].to_string())
            .collect();
        assert_eq!(zones, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_new_ensemble_prefers_distinct_racks_within_zone() {
        let layout = [
            ("10.0.0.1:1", "/a/r1"),
            ("10.0.0.2:1", "/a/r1"),
            ("10.0.0.3:1", "/a/r2"),
        ];
        let policy = policy_with(config(1, 1), &layout);
        policy
            .on_cluster_changed(&set(&["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1"]), &HashSet::new())
            .unwrap();

        let result = policy.new_ensemble(2, 2, 2, None, Some(&HashSet::new())).unwrap();
        assert_eq!(result.ensemble, vec![node("10.0.0.1:1"), node("10.0.0.3:1")]);
    }

    #[test]
    fn test_new_ensemble_skips_read_only_and_unknown() {
        let layout = [("10.0.0.1:1", "/a/r1"), ("10.0.0.2:1", "/b/r1")];
        let policy = policy_with(config(2, 1), &layout);
        policy
            .on_cluster_changed(&set(&["10.0.0.1:1", "10.0.0.9:1"]), &set(&["10.0.0.2:1"]))
            .unwrap();

        let result = policy.new_ensemble(1, 1, 1, None, Some(&HashSet::new())).unwrap();
        assert_eq!(result.ensemble, vec![node("10.0.0.1:1")]);
        assert!(matches!(
            policy.new_ensemble(2, 1, 1, None, Some(&HashSet::new())),
            Err(Error::NotEnoughNodes {
                available: 1,
                required: 2
            })
        ));
    }

    #[test]
    fn test_new_ensemble_may_use_unknown_zone_when_allowed() {
        let policy = policy_with(
            PlacementConfig {
                exclude_unknown_zone: false,
                ..config(2, 1)
            },
            &[("10.0.0.1:1", "/a/r1")],
        );
        policy
            .on_cluster_changed(&set(&["10.0.0.1:1", "10.0.0.9:1"]), &HashSet::new())
            .unwrap();

        let result = policy.new_ensemble(2, 2, 2, None, Some(&HashSet::new())).unwrap();
        // Named zones are used before the unknown bucket
        assert_eq!(result.ensemble, vec![node("10.0.0.1:1"), node("10.0.0.9:1")]);
        assert_eq!(result.adherence, MeetsStrict);
    }

    #[test]
    fn test_new_ensemble_random_topologies() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let zone_count = rng.gen_range(1..=5);
            let mut layout = Vec::new();
            for z in 0..zone_count {
                for n in 0..rng.gen_range(1..=6) {
                    layout.push((format!("10.{z}.{n}.1:3181"), format!("/zone-{z}/rack-{}", n % 2)));
                }
            }
            let layout_refs: Vec<(&str, &str)> =
                layout.iter().map(|(n, p)| (n.as_str(), p.as_str())).collect();
            let policy = policy_with(config(3, 2), &layout_refs);
            let all: Vec<NodeId> = layout.iter().map(|(n, _)| node(n)).collect();
            policy
                .on_cluster_changed(&all.iter().cloned().collect(), &HashSet::new())
                .unwrap();

            let excluded = rng.gen_range(0..=2);
            let exclude: HashSet<NodeId> = all.choose_multiple(&mut rng, excluded).cloned().collect();
            let write_quorum = rng.gen_range(1..=3);
            let ensemble_size = write_quorum * rng.gen_range(1..=4);
            let eligible = all.len() - exclude.len();

            let result = policy.new_ensemble(
                ensemble_size,
                write_quorum,
                write_quorum,
                None,
                Some(&exclude),
            );

            let required = usize::try_from(ensemble_size).unwrap();
            if eligible < required {
                assert!(matches!(result, Err(Error::NotEnoughNodes { .. })));
                continue;
            }
            let result = result.unwrap();
            assert_eq!(result.ensemble.len(), required);
            let unique: HashSet<_> = result.ensemble.iter().collect();
            assert_eq!(unique.len(), required);
            assert!(result.ensemble.iter().all(|n| !exclude.contains(n)));
        }
    }

    #[test]
    fn test_new_ensemble_window_spread_with_deep_zones() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let zone_count: usize = rng.gen_range(1..=4);
            let write_quorum: usize = rng.gen_range(1..=4);
            let ensemble_size = write_quorum * rng.gen_range(1..=3);

            let mut layout = Vec::new();
            for z in 0..zone_count {
                for n in 0..ensemble_size {
                    layout.push((format!("z{z}-n{n}:1"), format!("/zone-{z}/rack-{n}")));
                }
            }
            let layout_refs: Vec<(&str, &str)> =
                layout.iter().map(|(n, p)| (n.as_str(), p.as_str())).collect();
            let policy = policy_with(config(3, 1), &layout_refs);
            let all: HashSet<NodeId> = layout.iter().map(|(n, _)| node(n)).collect();
            policy.on_cluster_changed(&all, &HashSet::new()).unwrap();

            let result = policy
                .new_ensemble(
                    i32::try_from(ensemble_size).unwrap(),
                    i32::try_from(write_quorum).unwrap(),
                    1,
                    None,
                    Some(&HashSet::new()),
                )
                .unwrap();

            let snapshot = policy.topology().unwrap();
            for window in result.ensemble.chunks(write_quorum) {
                let zones: HashSet<_> = window
                    .iter()
                    .map(|n| snapshot.location(n).unwrap().zone().unwrap())
                    .collect();
                assert_eq!(zones.len(), write_quorum.min(zone_count));
            }
        }
    }

    #[test]
    fn test_replace_node_prefers_missing_zone() {
        let layout = [
            ("10.0.0.1:1", "/a/r1"),
            ("10.0.0.2:1", "/b/r1"),
            ("10.0.0.3:1", "/a/r2"),
            ("10.0.0.4:1", "/b/r2"),
            ("10.0.0.5:1", "/c/r1"),
        ];
        let policy = policy_with(config(2, 1), &layout);
        policy
            .on_cluster_changed(
                &set(&["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1", "10.0.0.4:1", "10.0.0.5:1"]),
                &HashSet::new(),
            )
            .unwrap();

        let current = vec![node("10.0.0.1:1"), node("10.0.0.2:1")];
        let result = policy
            .replace_node(2, 2, 2, None, &current, &node("10.0.0.2:1"), Some(&HashSet::new()))
            .unwrap();

        // 10.0.0.3 would share zone "a" with position 0; 10.0.0.4 and 10.0.0.5
        // both restore the spread and the smaller id wins
        assert_eq!(result.ensemble, vec![node("10.0.0.1:1"), node("10.0.0.4:1")]);
        assert_eq!(result.adherence, MeetsStrict);
    }

    #[test]
    fn test_replace_node_respects_exclusions_and_members() {
        let layout = [
            ("10.0.0.1:1", "/a/r1"),
            ("10.0.0.2:1", "/b/r1"),
            ("10.0.0.3:1", "/c/r1"),
        ];
        let policy = policy_with(config(2, 1), &layout);
        policy
            .on_cluster_changed(&set(&["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1"]), &HashSet::new())
            .unwrap();

        let current = vec![node("10.0.0.1:1"), node("10.0.0.2:1")];
        let err = policy
            .replace_node(
                2,
                2,
                2,
                None,
                &current,
                &node("10.0.0.2:1"),
                Some(&set(&["10.0.0.3:1"])),
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotEnoughNodes { .. }));

        let err = policy
            .replace_node(2, 2, 2, None, &current, &node("10.0.0.3:1"), Some(&HashSet::new()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_acked_nodes_adherence() {
        let layout = [
            ("127.0.0.1:8000", "/region-a/rack-1"),
            ("127.0.0.2:8000", "/region-b/rack-1"),
            ("127.0.0.3:8000", "/region-c/rack-1"),
            ("127.0.0.4:8000", "/region-a/rack-1"),
        ];
        let policy = policy_with(PlacementConfig::default(), &layout);
        let four = set(&["127.0.0.1:8000", "127.0.0.2:8000", "127.0.0.3:8000", "127.0.0.4:8000"]);
        let empty = HashSet::new();

        assert!(matches!(
            policy.are_acked_nodes_adhering(None, 1, 2),
            Err(Error::MissingArgument(_))
        ));
        assert!(policy.are_acked_nodes_adhering(Some(&empty), 0, 0).unwrap());
        assert!(!policy.are_acked_nodes_adhering(Some(&empty), 2, 1).unwrap());
        assert!(!policy.are_acked_nodes_adhering(Some(&empty), 2, -1).unwrap());
        assert!(
            policy
                .are_acked_nodes_adhering(Some(&set(&["127.0.0.1:8000"])), 1, 0)
                .unwrap()
        );
        assert!(policy.are_acked_nodes_adhering(Some(&four), -1, 4).unwrap());
        assert!(!policy.are_acked_nodes_adhering(Some(&four), 1, 5).unwrap());
    }

    #[test]
    fn test_acked_nodes_size_rule_ignores_zones_by_default() {
        let layout = [("10.0.0.1:1", "/a/r1"), ("10.0.0.2:1", "/a/r2")];
        let policy = policy_with(PlacementConfig::default(), &layout);
        let same_zone = set(&["10.0.0.1:1", "10.0.0.2:1"]);

        for write_quorum in [-1, 0, 1, 2, 3] {
            for ack_quorum in -1..=3 {
                let expected = (0..=2).contains(&ack_quorum);
                assert_eq!(
                    policy
                        .are_acked_nodes_adhering(Some(&same_zone), write_quorum, ack_quorum)
                        .unwrap(),
                    expected,
                    "wq={write_quorum} aq={ack_quorum}"
                );
            }
        }
    }

    #[test]
    fn test_acked_nodes_need_zone_spread_when_enforced() {
        let layout = [
            ("10.0.0.1:1", "/a/r1"),
            ("10.0.0.2:1", "/a/r2"),
            ("10.0.0.3:1", "/b/r1"),
        ];
        let policy = policy_with(
            PlacementConfig {
                enforce_ack_zone_spread: true,
                ..config(3, 2)
            },
            &layout,
        );

        let same_zone = set(&["10.0.0.1:1", "10.0.0.2:1"]);
        assert!(!policy.are_acked_nodes_adhering(Some(&same_zone), 3, 2).unwrap());
        // A single-node write quorum only needs one zone
        assert!(policy.are_acked_nodes_adhering(Some(&same_zone), 1, 2).unwrap());

        let spread = set(&["10.0.0.1:1", "10.0.0.3:1"]);
        assert!(policy.are_acked_nodes_adhering(Some(&spread), 3, 2).unwrap());

        // An unresolved node adds the unknown domain
        let with_unknown = set(&["10.0.0.1:1", "10.0.0.9:1"]);
        assert!(policy.are_acked_nodes_adhering(Some(&with_unknown), 3, 2).unwrap());
    }

    #[test]
    fn test_uninitialize() {
        let policy = two_region_pool();
        policy.uninitialize();
        policy.uninitialize();

        let empty = HashSet::new();
        assert!(matches!(
            policy.new_ensemble(1, 1, 1, None, Some(&empty)),
            Err(Error::PolicyClosed)
        ));
        assert!(matches!(
            policy.is_ensemble_adhering(Some(&[]), 1, 1),
            Err(Error::PolicyClosed)
        ));
        assert!(matches!(
            policy.are_acked_nodes_adhering(Some(&empty), 1, 1),
            Err(Error::PolicyClosed)
        ));
        assert!(matches!(
            policy.on_cluster_changed(&empty, &empty),
            Err(Error::PolicyClosed)
        ));
    }

    #[test]
    fn test_initialize_rejects_inverted_thresholds() {
        let result = ZoneAwarePolicy::initialize(config(1, 2), Arc::new(StaticResolver::new()));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
