//! Fault-domain resolution
//!
//! A resolver maps a node's host to its [`DomainPath`]. The placement policy
//! receives one at initialization and never resolves locations itself.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use zonewise_common::{DomainPath, Error, ResolverConfig, Result};

/// Maps a network host to its location in the fault-domain hierarchy
pub trait DomainResolver: Send + Sync {
    /// Name the resolver is registered under
    fn name(&self) -> &str;

    /// Resolve a host (without port) to a domain path
    fn resolve(&self, host: &str) -> Result<DomainPath>;

    /// Release anything acquired at construction. Called once at teardown.
    fn close(&self) {}
}

/// Resolver backed by an in-memory host table.
///
/// The table is seeded from resolver properties (`host = "/region/rack"`) and
/// may be edited at runtime, which makes it the usual choice for tests and for
/// small clusters with a hand-maintained layout.
#[derive(Debug, Default)]
pub struct StaticResolver {
    table: RwLock<HashMap<String, DomainPath>>,
}

impl StaticResolver {
    /// Registered name of this resolver
    pub const NAME: &'static str = "static";

    /// Create an empty resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from `host -> path` properties
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        let resolver = Self::new();
        for (host, path) in properties {
            let path = DomainPath::parse(path).map_err(|e| {
                Error::configuration(format!("static resolver entry for {host}: {e}"))
            })?;
            resolver.add_node(host, path);
        }
        Ok(resolver)
    }

    /// Map a host to a domain path, replacing any previous mapping
    pub fn add_node(&self, host: &str, path: DomainPath) {
        self.table.write().insert(host.trim().to_ascii_lowercase(), path);
    }

    /// Forget a host
    pub fn remove_node(&self, host: &str) -> Option<DomainPath> {
        self.table.write().remove(&host.trim().to_ascii_lowercase())
    }

    /// Number of mapped hosts
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Check if no host is mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl DomainResolver for StaticResolver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, host: &str) -> Result<DomainPath> {
        self.table
            .read()
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnresolvedAddress(host.to_string()))
    }

    fn close(&self) {
        self.table.write().clear();
    }
}

/// Constructs a resolver from its configured properties
pub type ResolverFactory =
    Box<dyn Fn(&BTreeMap<String, String>) -> Result<Arc<dyn DomainResolver>> + Send + Sync>;

/// Resolver implementations available to configuration, by name
pub struct ResolverRegistry {
    factories: HashMap<String, ResolverFactory>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(StaticResolver::NAME, |properties| {
            Ok(Arc::new(StaticResolver::from_properties(properties)?) as Arc<dyn DomainResolver>)
        });
        registry
    }
}

impl ResolverRegistry {
    /// Create a registry with the built-in resolvers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a resolver factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BTreeMap<String, String>) -> Result<Arc<dyn DomainResolver>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Build the resolver named by the configuration
    pub fn build(&self, config: &ResolverConfig) -> Result<Arc<dyn DomainResolver>> {
        let factory = self.factories.get(&config.name).ok_or_else(|| {
            Error::configuration(format!("unknown fault-domain resolver: {}", config.name))
        })?;
        debug!(
            "Building resolver '{}' with {} properties",
            config.name,
            config.properties.len()
        );
        factory(&config.properties)
    }
}
