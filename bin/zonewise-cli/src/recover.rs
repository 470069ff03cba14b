//! Bookie recovery planning
//!
//! Computes where the ledgers stored on failed bookies should be
//! re-replicated, using the configured placement policy against the
//! surviving cluster.

use anyhow::{Context, Result};
use crate::session::PolicySession;
use clap::Args;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{error, info, warn};
use zonewise_common::{Config, Error, LedgerConfig, NodeId, PlacementPolicyAdherence};
use zonewise_placement::{EnsemblePlacementPolicy, ResolverRegistry};

/// Flags of the `recover` command
#[derive(Args, Clone, Debug)]
pub struct RecoverFlags {
    /// Bookies to recover, comma separated (host:port)
    #[arg(short = 'b', long)]
    pub bookie_address: Option<String>,

    /// Recover a single ledger (-1 for every ledger on the bookies)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub ledger: i64,

    /// Only list the ledgers stored on the bookies
    #[arg(short, long)]
    pub query: bool,

    /// Leave ledgers that are still open untouched
    #[arg(long)]
    pub skip_open_ledgers: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl Default for RecoverFlags {
    fn default() -> Self {
        Self {
            bookie_address: None,
            ledger: -1,
            query: false,
            skip_open_ledgers: false,
            force: false,
        }
    }
}

/// One planned move of a ledger replica
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub ledger: u64,
    pub position: usize,
    pub from: NodeId,
    pub to: NodeId,
    pub adherence: PlacementPolicyAdherence,
}

/// Ledger catalog access and replication hand-off used by recovery
pub trait RecoveryAdmin: Send + Sync {
    /// Ledgers with at least one ensemble member among `bookies`
    fn ledgers_on(&self, bookies: &BTreeSet<NodeId>) -> Result<Vec<LedgerConfig>>;

    /// Hand one planned replacement over for re-replication
    fn replicate(&self, step: &Replacement) -> Result<()>;
}

/// Admin backed by the ledger catalog from the configuration. Planned
/// replacements are kept in memory.
pub struct CatalogAdmin {
    ledgers: Vec<LedgerConfig>,
    plan: Mutex<Vec<Replacement>>,
}

impl CatalogAdmin {
    pub fn new(ledgers: Vec<LedgerConfig>) -> Self {
        Self {
            ledgers,
            plan: Mutex::new(Vec::new()),
        }
    }

    /// Replacements handed over so far
    pub fn plan(&self) -> Vec<Replacement> {
        self.plan.lock().clone()
    }
}

impl RecoveryAdmin for CatalogAdmin {
    fn ledgers_on(&self, bookies: &BTreeSet<NodeId>) -> Result<Vec<LedgerConfig>> {
        Ok(self
            .ledgers
            .iter()
            .filter(|ledger| ledger.ensemble.iter().any(|n| bookies.contains(n)))
            .cloned()
            .collect())
    }

    fn replicate(&self, step: &Replacement) -> Result<()> {
        info!(
            "Ledger {}: re-replicate position {} from {} to {}",
            step.ledger, step.position, step.from, step.to
        );
        self.plan.lock().push(step.clone());
        Ok(())
    }
}

/// The `recover` admin command
#[derive(Default)]
pub struct RecoverCommand {
    admin: Option<Arc<dyn RecoveryAdmin>>,
    registry: ResolverRegistry,
}

impl RecoverCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `admin` instead of the catalog from the configuration
    pub fn with_admin(admin: Arc<dyn RecoveryAdmin>) -> Self {
        Self {
            admin: Some(admin),
            registry: ResolverRegistry::new(),
        }
    }

    /// Resolve locations with resolvers from `registry`
    #[must_use]
    pub fn with_registry(mut self, registry: ResolverRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Run the command. Returns false when the bookie list cannot be parsed
    /// or the operator declines.
    pub fn apply(&self, conf: Option<&Config>, flags: Option<&RecoverFlags>) -> Result<bool> {
        let conf = conf.ok_or_else(|| Error::configuration("recover requires a configuration"))?;
        let flags = flags.ok_or_else(|| Error::configuration("recover requires flags"))?;
        let addresses = flags
            .bookie_address
            .as_deref()
            .ok_or_else(|| Error::configuration("no bookie address given"))?;
        if conf.cluster.metadata_service_uri.trim().is_empty() {
            return Err(Error::configuration("metadata_service_uri is not set").into());
        }

        let bookies = match parse_bookies(addresses) {
            Ok(bookies) => bookies,
            Err(e) => {
                error!("Invalid bookie address '{}': {}", addresses, e);
                return Ok(false);
            }
        };

        let admin = self.admin.clone().unwrap_or_else(|| {
            Arc::new(CatalogAdmin::new(conf.cluster.ledgers.clone())) as Arc<dyn RecoveryAdmin>
        });
        let mut ledgers = admin
            .ledgers_on(&bookies)
            .context("Failed to list ledgers on the bookies")?;
        if flags.ledger >= 0 {
            ledgers.retain(|ledger| i64::try_from(ledger.id).is_ok_and(|id| id == flags.ledger));
        }

        if flags.query {
            print_ledgers(&bookies, &ledgers);
            return Ok(true);
        }

        let prompt = format!(
            "Recover {} ledger(s) from {} bookie(s)?",
            ledgers.len(),
            bookies.len()
        );
        if !flags.force && !confirm(&prompt)? {
            info!("Recovery aborted by operator");
            return Ok(false);
        }

        let surviving: HashSet<NodeId> = conf
            .cluster
            .writable
            .iter()
            .filter(|n| !bookies.contains(*n))
            .cloned()
            .collect();
        let read_only: HashSet<NodeId> = conf.cluster.read_only.iter().cloned().collect();
        let policy = PolicySession::open(&conf.placement, &self.registry, &surviving, &read_only)?;
        info!(
            "Recovering {} from {} ({} ledgers, {} surviving writable bookies)",
            bookies.iter().map(NodeId::as_str).collect::<Vec<_>>().join(","),
            conf.cluster.metadata_service_uri,
            ledgers.len(),
            surviving.len()
        );

        let exclude: HashSet<NodeId> = bookies.iter().cloned().collect();
        let mut failed = 0usize;
        for ledger in &ledgers {
            if flags.skip_open_ledgers && ledger.open {
                info!("Skipping open ledger {}", ledger.id);
                continue;
            }
            match plan_ledger(&*policy, ledger, &bookies, &exclude) {
                Ok(steps) => {
                    for step in &steps {
                        println!(
                            "ledger {:<10} position {:<3} {} -> {} ({})",
                            step.ledger, step.position, step.from, step.to, step.adherence
                        );
                        admin.replicate(step)?;
                    }
                }
                Err(e) => {
                    warn!("Cannot recover ledger {}: {}", ledger.id, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            error!("{} ledger(s) could not be recovered", failed);
        }
        Ok(failed == 0)
    }
}

fn parse_bookies(addresses: &str) -> zonewise_common::Result<BTreeSet<NodeId>> {
    let bookies = addresses
        .split(',')
        .map(|address| {
            let bookie = NodeId::parse(address)?;
            if bookie.port().is_none() {
                return Err(Error::InvalidNodeId(address.to_string()));
            }
            Ok(bookie)
        })
        .collect::<zonewise_common::Result<BTreeSet<_>>>()?;
    if bookies.is_empty() {
        return Err(Error::invalid_argument("empty bookie list"));
    }
    Ok(bookies)
}

/// Replace every failed member of one ledger's ensemble, one position at a time
fn plan_ledger(
    policy: &dyn EnsemblePlacementPolicy,
    ledger: &LedgerConfig,
    bookies: &BTreeSet<NodeId>,
    exclude: &HashSet<NodeId>,
) -> zonewise_common::Result<Vec<Replacement>> {
    let ensemble_size = i32::try_from(ledger.ensemble.len())
        .map_err(|_| Error::invalid_argument(format!("ledger {} ensemble too large", ledger.id)))?;
    let mut ensemble = ledger.ensemble.clone();
    let mut steps = Vec::new();

    for position in 0..ensemble.len() {
        if !bookies.contains(&ensemble[position]) {
            continue;
        }
        let from = ensemble[position].clone();
        let result = policy.replace_node(
            ensemble_size,
            ledger.write_quorum,
            ledger.ack_quorum,
            None,
            &ensemble,
            &from,
            Some(exclude),
        )?;
        ensemble = result.ensemble;
        steps.push(Replacement {
            ledger: ledger.id,
            position,
            to: ensemble[position].clone(),
            from,
            adherence: result.adherence,
        });
    }
    Ok(steps)
}

fn print_ledgers(bookies: &BTreeSet<NodeId>, ledgers: &[LedgerConfig]) {
    for bookie in bookies {
        let ids: Vec<String> = ledgers
            .iter()
            .filter(|l| l.ensemble.contains(bookie))
            .map(|l| l.id.to_string())
            .collect();
        println!("{bookie}: {}", if ids.is_empty() { "-".to_string() } else { ids.join(", ") });
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (Y/N) ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}
