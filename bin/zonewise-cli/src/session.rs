//! Scoped placement policy handle

use anyhow::Result;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;
use zonewise_common::{NodeId, PlacementConfig};
use zonewise_placement::{EnsemblePlacementPolicy, ResolverRegistry, build_policy};

/// Initialized policy that is uninitialized when dropped, on every exit path
pub struct PolicySession {
    policy: Arc<dyn EnsemblePlacementPolicy>,
}

impl PolicySession {
    /// Build the configured policy and load the given membership into it
    pub fn open(
        config: &PlacementConfig,
        registry: &ResolverRegistry,
        writable: &HashSet<NodeId>,
        read_only: &HashSet<NodeId>,
    ) -> Result<Self> {
        let session = Self {
            policy: build_policy(config, registry)?,
        };
        let change = session.policy.on_cluster_changed(writable, read_only)?;
        debug!(
            "Loaded topology v{} ({} writable, {} read-only)",
            change.version,
            writable.len(),
            read_only.len()
        );
        Ok(session)
    }
}

impl Deref for PolicySession {
    type Target = dyn EnsemblePlacementPolicy;

    fn deref(&self) -> &Self::Target {
        self.policy.as_ref()
    }
}

impl Drop for PolicySession {
    fn drop(&mut self) {
        self.policy.uninitialize();
    }
}
