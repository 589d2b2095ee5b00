//! Ledger of created sub-resources and the step executor that fills it
//!
//! A composite resource is built by an ordered list of [`Step`]s. Each step
//! issues one backend creation call, reports what it created, then waits for
//! that object to settle. The executor records the created object in the
//! [`Ledger`] *before* waiting, so an object that never becomes ready is still
//! known to the compensator.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of backend object a ledger entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    Router,
    RouterInterface,
    LoadBalancer,
    Pool,
    HealthMonitor,
    PoolMember,
    Listener,
    PublicAddress,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::Router,
        ResourceKind::RouterInterface,
        ResourceKind::LoadBalancer,
        ResourceKind::Pool,
        ResourceKind::HealthMonitor,
        ResourceKind::PoolMember,
        ResourceKind::Listener,
        ResourceKind::PublicAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Router => "router",
            ResourceKind::RouterInterface => "router-interface",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::Pool => "pool",
            ResourceKind::HealthMonitor => "health-monitor",
            ResourceKind::PoolMember => "pool-member",
            ResourceKind::Listener => "listener",
            ResourceKind::PublicAddress => "public-address",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

/// One created backend object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: ResourceKind,
    pub id: String,
    /// Owning object, for kinds whose deletion is addressed through a parent
    /// (pool members through their pool, router interfaces through their router)
    pub parent: Option<String>,
}

impl LedgerEntry {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn parent_id(&self) -> Result<&str> {
        self.parent.as_deref().ok_or_else(|| {
            CloudError::InvalidConfig(format!("{} {} has no parent recorded", self.kind, self.id))
        })
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} {} (of {})", self.kind, self.id, parent),
            None => write!(f, "{} {}", self.kind, self.id),
        }
    }
}

/// Ordered record of everything one orchestration run created
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: LedgerEntry) {
        tracing::debug!("Ledger: recorded {}", entry);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind, in creation order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

impl From<Vec<LedgerEntry>> for Ledger {
    fn from(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }
}

/// One creation step of a composite resource
#[async_trait]
pub trait Step<C: Send>: Send + Sync {
    /// Short human readable step name, used in logs and errors
    fn name(&self) -> String;

    /// Issue the backend call. Returns the created object, or `None` when the
    /// step only reads or updates the context.
    async fn create(&self, ctx: &mut C) -> Result<Option<LedgerEntry>>;

    /// Wait until the object created by [`Step::create`] is ready
    async fn settle(&self, _ctx: &mut C) -> Result<()> {
        Ok(())
    }
}

/// Runs steps in order, stopping at the first error
pub struct StepExecutor<C: Send> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: Send> Default for StepExecutor<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C: Send> StepExecutor<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn Step<C>>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute every step against `ctx`, recording created objects in `ledger`
    pub async fn run(&self, ctx: &mut C, ledger: &mut Ledger) -> Result<()> {
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name();
            tracing::info!("Step {}/{}: {}", index + 1, total, name);

            let wrap = |source: CloudError| CloudError::StepFailed {
                step: name.clone(),
                source: Box::new(source),
            };

            if let Some(entry) = step.create(ctx).await.map_err(wrap)? {
                ledger.record(entry);
            }
            step.settle(ctx).await.map_err(wrap)?;
        }
        Ok(())
    }
}
