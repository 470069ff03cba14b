//! Cluster topology index
//!
//! Holds the current [`TopologySnapshot`]: the writable/read-only membership of
//! the cluster and the zone index derived from it. Snapshots are immutable;
//! every membership change builds a new one and swaps it in, so readers always
//! see either the old view or the new one.

use crate::resolver::DomainResolver;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zonewise_common::{DomainPath, Error, NodeId, Result};

/// Immutable view of cluster membership and node locations
#[derive(Clone, Debug, Default)]
pub struct TopologySnapshot {
    version: u64,
    writable: BTreeSet<NodeId>,
    read_only: BTreeSet<NodeId>,
    /// Location of every writable node (unknown domain when unresolved)
    locations: HashMap<NodeId, DomainPath>,
    /// Zone -> writable nodes in that zone
    zones: BTreeMap<String, BTreeSet<NodeId>>,
    /// Writable nodes in the unknown domain
    unknown: BTreeSet<NodeId>,
}

impl TopologySnapshot {
    /// Change counter, incremented on every membership update
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// All writable nodes
    #[must_use]
    pub const fn writable(&self) -> &BTreeSet<NodeId> {
        &self.writable
    }

    /// All read-only nodes
    #[must_use]
    pub const fn read_only(&self) -> &BTreeSet<NodeId> {
        &self.read_only
    }

    /// Writable nodes grouped by zone, in zone-name order
    #[must_use]
    pub const fn zones(&self) -> &BTreeMap<String, BTreeSet<NodeId>> {
        &self.zones
    }

    /// Writable nodes whose location could not be resolved
    #[must_use]
    pub const fn unknown_zone_nodes(&self) -> &BTreeSet<NodeId> {
        &self.unknown
    }

    /// Cached location of a writable node
    #[must_use]
    pub fn location(&self, node: &NodeId) -> Option<&DomainPath> {
        self.locations.get(node)
    }

    /// Writable nodes with their locations, in node order
    pub fn writable_locations(&self) -> impl Iterator<Item = (&NodeId, &DomainPath)> {
        self.writable
            .iter()
            .filter_map(|node| self.locations.get(node).map(|path| (node, path)))
    }

    /// Check if a node is currently writable
    #[must_use]
    pub fn is_writable(&self, node: &NodeId) -> bool {
        self.writable.contains(node)
    }

    /// Check if a node is known, writable or read-only
    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.writable.contains(node) || self.read_only.contains(node)
    }

    fn build(
        version: u64,
        writable: &HashSet<NodeId>,
        read_only: &HashSet<NodeId>,
        previous: Option<&Self>,
        resolver: &dyn DomainResolver,
    ) -> Self {
        let read_only: BTreeSet<NodeId> = read_only.iter().cloned().collect();
        let writable: BTreeSet<NodeId> = writable
            .iter()
            .filter(|node| !read_only.contains(*node))
            .cloned()
            .collect();

        let mut locations = HashMap::with_capacity(writable.len());
        let mut zones: BTreeMap<String, BTreeSet<NodeId>> = BTreeMap::new();
        let mut unknown = BTreeSet::new();

        for node in &writable {
            let cached = previous
                .and_then(|p| p.locations.get(node))
                .filter(|path| !path.is_unknown())
                .cloned();
            let path = cached.unwrap_or_else(|| match resolver.resolve(node.host()) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Placing {} in the unknown domain: {}", node, e);
                    DomainPath::unknown()
                }
            });

            match path.zone() {
                Some(zone) => {
                    zones.entry(zone.to_string()).or_default().insert(node.clone());
                }
                None => {
                    unknown.insert(node.clone());
                }
            }
            locations.insert(node.clone(), path);
        }

        Self {
            version,
            writable,
            read_only,
            locations,
            zones,
            unknown,
        }
    }
}

/// Outcome of applying a membership change
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterChange {
    /// Version of the snapshot now in effect
    pub version: u64,
    /// Nodes that became writable and were not known before
    pub joined: BTreeSet<NodeId>,
    /// Nodes previously known that are no longer in either set
    pub departed: BTreeSet<NodeId>,
}

/// Live, atomically replaced index of the cluster topology
pub struct TopologyIndex {
    resolver: Arc<dyn DomainResolver>,
    current: RwLock<Option<Arc<TopologySnapshot>>>,
    /// Serializes writers so versions are never skipped or duplicated
    update: Mutex<()>,
}

impl TopologyIndex {
    /// Create an index with an empty topology
    #[must_use]
    pub fn new(resolver: Arc<dyn DomainResolver>) -> Self {
        Self {
            resolver,
            current: RwLock::new(Some(Arc::new(TopologySnapshot::default()))),
            update: Mutex::new(()),
        }
    }

    /// Resolver used for this index
    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn DomainResolver> {
        &self.resolver
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Result<Arc<TopologySnapshot>> {
        self.current.read().clone().ok_or(Error::PolicyClosed)
    }

    /// Replace the membership and rebuild the zone index
    pub fn apply(
        &self,
        writable: &HashSet<NodeId>,
        read_only: &HashSet<NodeId>,
    ) -> Result<ClusterChange> {
        let _update = self.update.lock();
        let previous = self.snapshot()?;

        let next = TopologySnapshot::build(
            previous.version + 1,
            writable,
            read_only,
            Some(&previous),
            self.resolver.as_ref(),
        );

        let joined: BTreeSet<NodeId> = next
            .writable
            .iter()
            .filter(|node| !previous.contains(node))
            .cloned()
            .collect();
        let departed: BTreeSet<NodeId> = previous
            .writable
            .iter()
            .chain(previous.read_only.iter())
            .filter(|node| !next.contains(node))
            .cloned()
            .collect();

        metrics::gauge!("zonewise_topology_writable_nodes").set(next.writable.len() as f64);
        metrics::gauge!("zonewise_topology_read_only_nodes").set(next.read_only.len() as f64);
        metrics::gauge!("zonewise_topology_zones").set(next.zones.len() as f64);

        info!(
            "Topology v{}: {} writable in {} zones ({} unknown), {} read-only, {} joined, {} departed",
            next.version,
            next.writable.len(),
            next.zones.len(),
            next.unknown.len(),
            next.read_only.len(),
            joined.len(),
            departed.len()
        );

        let version = next.version;
        {
            let mut current = self.current.write();
            if current.is_none() {
                return Err(Error::PolicyClosed);
            }
            *current = Some(Arc::new(next));
        }

        Ok(ClusterChange {
            version,
            joined,
            departed,
        })
    }

    /// Location of any node: cached for members, resolved on demand otherwise.
    /// Unresolvable nodes fall into the unknown domain.
    pub fn locate(&self, snapshot: &TopologySnapshot, node: &NodeId) -> DomainPath {
        if let Some(path) = snapshot.location(node) {
            return path.clone();
        }
        self.resolver.resolve(node.host()).unwrap_or_else(|e| {
            debug!("No location for {}: {}", node, e);
            DomainPath::unknown()
        })
    }

    /// Drop the topology and close the resolver. Returns false if already closed.
    pub fn close(&self) -> bool {
        let _update = self.update.lock();
        let was_open = self.current.write().take().is_some();
        if was_open {
            self.resolver.close();
        }
        was_open
    }
}
