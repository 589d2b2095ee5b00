//! The in-memory cloud
//!
//! Objects are created in a pending state and become ACTIVE after a
//! configurable number of reads through their `get_*` call. Deletion works
//! the same way: the object turns PENDING_DELETE and disappears after the
//! same number of reads. Every call runs as one transaction on the scope.

mod compute;
mod load_balancer;
mod network;
mod tags;

use crate::error::MemoryError;
use crate::faults::{Fault, Progress, Transition};
use crate::store::{MemoryStore, Scope, Transaction};
use nimbus_cloud::{
    CloudClients, CloudError, LbCapabilities, ProvisioningStatus, RawListener, RawLoadBalancer,
    RawMember, RawMonitor, RawNetwork, RawPool, RawRouter, ResourceKind, Result,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub(crate) const NETWORKS: &str = "networks";
pub(crate) const SUBNETS: &str = "subnets";
pub(crate) const ROUTERS: &str = "routers";
pub(crate) const SERVERS: &str = "servers";
pub(crate) const LOAD_BALANCERS: &str = "load-balancers";
pub(crate) const POOLS: &str = "pools";
pub(crate) const MONITORS: &str = "monitors";
pub(crate) const MEMBERS: &str = "members";
pub(crate) const LISTENERS: &str = "listeners";
pub(crate) const FLOATING_IPS: &str = "floating-ips";
pub(crate) const PROGRESS: &str = "progress";
pub(crate) const FAULTS: &str = "faults";
pub(crate) const TAGS: &str = "tags";
pub(crate) const METADATA: &str = "metadata";
pub(crate) const COUNTERS: &str = "counters";

const TAG_FAULT: &str = "tag-binder";

/// Name of the external network seeded into every new scope
pub const DEFAULT_EXTERNAL_NETWORK: &str = "public";

/// Stored objects that carry a provisioning status
pub(crate) trait Record: Serialize + DeserializeOwned {
    const TABLE: &'static str;
    const KIND: ResourceKind;

    fn id(&self) -> &str;

    fn status(&self) -> ProvisioningStatus;

    fn set_status(&mut self, status: ProvisioningStatus);
}

macro_rules! record {
    ($($ty:ty => $table:ident, $kind:ident;)*) => {
        $(impl Record for $ty {
            const TABLE: &'static str = $table;
            const KIND: ResourceKind = ResourceKind::$kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn status(&self) -> ProvisioningStatus {
                self.status
            }

            fn set_status(&mut self, status: ProvisioningStatus) {
                self.status = status;
            }
        })*
    };
}

record! {
    RawNetwork => NETWORKS, Network;
    RawRouter => ROUTERS, Router;
    RawLoadBalancer => LOAD_BALANCERS, LoadBalancer;
    RawPool => POOLS, Pool;
    RawMonitor => MONITORS, HealthMonitor;
    RawMember => MEMBERS, PoolMember;
    RawListener => LISTENERS, Listener;
}

fn progress_key(table: &str, id: &str) -> String {
    format!("{}/{}", table, id)
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Object counts per resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Census {
    counts: HashMap<ResourceKind, usize>,
}

impl Census {
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for Census {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in ResourceKind::ALL {
            let count = self.count(kind);
            if count == 0 {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", count, kind)?;
            first = false;
        }
        if first {
            write!(f, "nothing")?;
        }
        Ok(())
    }
}

/// In-memory backend implementing every backend client trait
#[derive(Debug, Clone)]
pub struct MemoryCloud {
    scope: Scope,
    latency: u32,
    side_table: bool,
    capabilities: LbCapabilities,
    external_network: String,
}

impl MemoryCloud {
    /// Backend on `scope`, seeding the default external network
    pub fn new(scope: Scope) -> std::result::Result<Self, MemoryError> {
        let cloud = Self {
            scope,
            latency: 1,
            side_table: true,
            capabilities: LbCapabilities::default(),
            external_network: DEFAULT_EXTERNAL_NETWORK.to_string(),
        };
        cloud.seed_external_network()?;
        Ok(cloud)
    }

    /// Backend on a scope of a fresh private store
    pub fn isolated(scope: &str) -> std::result::Result<Self, MemoryError> {
        Self::new(MemoryStore::new().scope(scope))
    }

    /// Number of reads an object stays pending for
    pub fn with_latency(mut self, reads: u32) -> Self {
        self.latency = reads;
        self
    }

    /// Whether the structured side-table is offered to callers
    pub fn with_side_table(mut self, enabled: bool) -> Self {
        self.side_table = enabled;
        self
    }

    pub fn with_capabilities(mut self, capabilities: LbCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Use (and seed) a differently named external network
    pub fn with_external_network(
        mut self,
        name: impl Into<String>,
    ) -> std::result::Result<Self, MemoryError> {
        self.external_network = name.into();
        self.seed_external_network()?;
        Ok(self)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Client bundle backed entirely by this cloud
    pub fn clients(self: &Arc<Self>) -> CloudClients {
        CloudClients::new(self.clone(), self.clone(), self.clone()).with_tags(self.clone())
    }

    fn seed_external_network(&self) -> std::result::Result<(), MemoryError> {
        let name = self.external_network.clone();
        self.scope.transaction(|tx| {
            let networks: Vec<RawNetwork> = tx.values(NETWORKS)?;
            if networks.iter().any(|n| n.external && n.name == name) {
                return Ok(());
            }
            let network = RawNetwork {
                id: new_id("net"),
                name: name.clone(),
                cidr: None,
                subnet_ids: Vec::new(),
                external: true,
                status: ProvisioningStatus::Active,
            };
            tracing::debug!("Seeding external network {} ({})", network.name, network.id);
            tx.put(NETWORKS, network.id.clone(), &network)
        })
    }

    /// Set (or clear, with `Fault::default()`) the fault of one kind
    pub fn inject(&self, kind: ResourceKind, fault: Fault) -> Result<()> {
        tracing::debug!("Fault for {}: {:?}", kind, fault);
        self.scope.transaction(|tx| {
            if fault.is_clear() {
                tx.remove(FAULTS, kind.as_str());
                Ok(())
            } else {
                tx.put(FAULTS, kind.as_str(), &fault).map_err(CloudError::from)
            }
        })
    }

    pub fn clear_faults(&self) -> Result<()> {
        self.scope.transaction(|tx| {
            for key in tx.keys(FAULTS) {
                tx.remove(FAULTS, &key);
            }
            Ok(())
        })
    }

    /// Make every tag call fail
    pub fn fail_tags(&self, fail: bool) -> Result<()> {
        self.scope
            .transaction(|tx| tx.put(FAULTS, TAG_FAULT, &fail).map_err(CloudError::from))
    }

    /// Object counts, excluding the seeded external network
    pub fn census(&self) -> Result<Census> {
        self.scope.transaction(|tx| {
            let mut counts = HashMap::new();
            let networks: Vec<RawNetwork> = tx.values(NETWORKS)?;
            let routers: Vec<RawRouter> = tx.values(ROUTERS)?;

            counts.insert(
                ResourceKind::Network,
                networks.iter().filter(|n| !n.external).count(),
            );
            counts.insert(ResourceKind::Subnet, tx.count(SUBNETS));
            counts.insert(ResourceKind::Router, routers.len());
            counts.insert(
                ResourceKind::RouterInterface,
                routers.iter().map(|r| r.interface_subnet_ids.len()).sum(),
            );
            counts.insert(ResourceKind::LoadBalancer, tx.count(LOAD_BALANCERS));
            counts.insert(ResourceKind::Pool, tx.count(POOLS));
            counts.insert(ResourceKind::HealthMonitor, tx.count(MONITORS));
            counts.insert(ResourceKind::PoolMember, tx.count(MEMBERS));
            counts.insert(ResourceKind::Listener, tx.count(LISTENERS));
            counts.insert(ResourceKind::PublicAddress, tx.count(FLOATING_IPS));
            Ok::<_, CloudError>(Census { counts })
        })
    }

    /// Run one backend call as a transaction, failing first if a transient
    /// read error is queued for `kind`
    pub(crate) fn read<T>(
        &self,
        kind: ResourceKind,
        f: impl FnOnce(&mut Transaction) -> Result<T>,
    ) -> Result<T> {
        let outcome = self.scope.transaction(|tx| {
            let mut fault = fault_of(tx, kind)?;
            if fault.transient_read_errors > 0 {
                fault.transient_read_errors -= 1;
                tx.put(FAULTS, kind.as_str(), &fault)?;
                return Ok(Err(CloudError::ApiError(format!(
                    "{} read temporarily unavailable",
                    kind
                ))));
            }
            Ok::<_, CloudError>(f(tx))
        })?;
        outcome
    }

    /// Read one object, advancing its pending work by one read
    pub(crate) fn observe<R: Record>(&self, id: &str) -> Result<Option<R>> {
        self.read(R::KIND, |tx| advance::<R>(tx, id))
    }

    /// Store a freshly created object, scheduling its activation
    pub(crate) fn admit<R: Record>(&self, tx: &mut Transaction, record: &R) -> Result<()> {
        let fault = self.refuse_create(tx, R::KIND)?;
        if fault.spoils_creation() {
            use_up(tx, R::KIND, fault.clone())?;
        }

        tx.put(R::TABLE, record.id(), record)?;
        if !fault.never_ready {
            let then = if fault.error_state {
                Transition::Fail
            } else {
                Transition::Activate
            };
            schedule(tx, R::TABLE, record.id(), Progress::new(self.latency, then))?;
        }
        Ok(())
    }

    /// Fail with the injected creation error, if any
    pub(crate) fn refuse_create(&self, tx: &Transaction, kind: ResourceKind) -> Result<Fault> {
        let fault = fault_of(tx, kind)?;
        if fault.fail_create {
            return Err(CloudError::ApiError(format!("injected failure creating {}", kind)));
        }
        Ok(fault)
    }

    /// Fail with the injected deletion error, if any
    pub(crate) fn refuse_delete(&self, tx: &mut Transaction, kind: ResourceKind, id: &str) -> Result<()> {
        let mut fault = fault_of(tx, kind)?;
        if !fault.fail_delete {
            return Ok(());
        }
        if fault.deletes_before_failing > 0 {
            fault.deletes_before_failing -= 1;
            tx.put(FAULTS, kind.as_str(), &fault)?;
            return Ok(());
        }
        Err(CloudError::ApiError(format!("injected failure deleting {} {}", kind, id)))
    }

    /// Put an object into PENDING_DELETE; it vanishes after the latency
    pub(crate) fn retire<R: Record>(&self, tx: &mut Transaction, id: &str) -> Result<R> {
        self.refuse_delete(tx, R::KIND, id)?;
        let mut record: R = tx
            .get(R::TABLE, id)?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("{} {}", R::KIND, id)))?;
        record.set_status(ProvisioningStatus::PendingDelete);
        tx.put(R::TABLE, id, &record)?;
        schedule(tx, R::TABLE, id, Progress::new(self.latency, Transition::Vanish))?;
        tracing::debug!("Deleting {} {}", R::KIND, id);
        Ok(record)
    }

    /// Mark an ACTIVE object as updating until the latency passes
    pub(crate) fn touch<R: Record>(&self, tx: &mut Transaction, id: &str) -> Result<()> {
        let Some(mut record) = tx.get::<R>(R::TABLE, id)? else {
            return Ok(());
        };
        if record.status() != ProvisioningStatus::Active {
            return Ok(());
        }
        record.set_status(ProvisioningStatus::PendingUpdate);
        tx.put(R::TABLE, id, &record)?;
        schedule(tx, R::TABLE, id, Progress::new(self.latency, Transition::Activate))
    }

    /// Drop an object immediately, along with its pending work
    pub(crate) fn purge(&self, tx: &mut Transaction, table: &str, id: &str) {
        tx.remove(table, id);
        tx.remove(PROGRESS, &progress_key(table, id));
    }

    /// Next value of a named counter, starting at 1
    pub(crate) fn next(&self, tx: &mut Transaction, counter: &str) -> Result<u32> {
        let value = tx.get::<u32>(COUNTERS, counter)?.unwrap_or(0) + 1;
        tx.put(COUNTERS, counter, &value)?;
        Ok(value)
    }

    pub(crate) fn tags_failing(&self, tx: &Transaction) -> Result<bool> {
        Ok(tx.get::<bool>(FAULTS, TAG_FAULT)?.unwrap_or(false))
    }
}

fn fault_of(tx: &Transaction, kind: ResourceKind) -> std::result::Result<Fault, MemoryError> {
    Ok(tx.get(FAULTS, kind.as_str())?.unwrap_or_default())
}

/// Count one use of a limited creation fault, dropping it when spent
fn use_up(tx: &mut Transaction, kind: ResourceKind, mut fault: Fault) -> Result<()> {
    let Some(left) = fault.times else {
        return Ok(());
    };
    if left <= 1 {
        fault.error_state = false;
        fault.never_ready = false;
        fault.times = None;
    } else {
        fault.times = Some(left - 1);
    }

    if fault.is_clear() {
        tx.remove(FAULTS, kind.as_str());
    } else {
        tx.put(FAULTS, kind.as_str(), &fault)?;
    }
    Ok(())
}

fn schedule(tx: &mut Transaction, table: &str, id: &str, progress: Progress) -> Result<()> {
    tx.put(PROGRESS, progress_key(table, id), &progress)?;
    Ok(())
}

fn advance<R: Record>(tx: &mut Transaction, id: &str) -> Result<Option<R>> {
    let Some(mut record) = tx.get::<R>(R::TABLE, id)? else {
        return Ok(None);
    };

    let key = progress_key(R::TABLE, id);
    let Some(mut progress) = tx.get::<Progress>(PROGRESS, &key)? else {
        return Ok(Some(record));
    };

    match progress.tick() {
        None => tx.put(PROGRESS, key, &progress)?,
        Some(transition) => {
            tx.remove(PROGRESS, &key);
            match transition {
                Transition::Activate => record.set_status(ProvisioningStatus::Active),
                Transition::Fail => record.set_status(ProvisioningStatus::Error),
                Transition::Vanish => {
                    tx.remove(R::TABLE, id);
                    tracing::debug!("{} {} is gone", R::KIND, id);
                    return Ok(None);
                }
            }
            tx.put(R::TABLE, id, &record)?;
        }
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(id: &str) -> RawNetwork {
        RawNetwork {
            id: id.to_string(),
            name: id.to_string(),
            cidr: Some("10.0.0.0/16".to_string()),
            subnet_ids: Vec::new(),
            external: false,
            status: ProvisioningStatus::PendingCreate,
        }
    }

    fn admit(cloud: &MemoryCloud, record: &RawNetwork) {
        cloud
            .scope()
            .transaction(|tx| cloud.admit(tx, record))
            .unwrap();
    }

    #[test]
    fn test_pending_for_latency_reads() {
        let cloud = MemoryCloud::isolated("t").unwrap().with_latency(2);
        admit(&cloud, &network("n1"));

        let status = |c: &MemoryCloud| c.observe::<RawNetwork>("n1").unwrap().unwrap().status;
        assert_eq!(status(&cloud), ProvisioningStatus::PendingCreate);
        assert_eq!(status(&cloud), ProvisioningStatus::PendingCreate);
        assert_eq!(status(&cloud), ProvisioningStatus::Active);
        assert_eq!(status(&cloud), ProvisioningStatus::Active);
    }

    #[test]
    fn test_error_state_fault() {
        let cloud = MemoryCloud::isolated("t").unwrap().with_latency(0);
        cloud.inject(ResourceKind::Network, Fault::error_state()).unwrap();
        admit(&cloud, &network("n1"));

        let got = cloud.observe::<RawNetwork>("n1").unwrap().unwrap();
        assert_eq!(got.status, ProvisioningStatus::Error);
    }

    #[test]
    fn test_never_ready_fault() {
        let cloud = MemoryCloud::isolated("t").unwrap().with_latency(0);
        cloud.inject(ResourceKind::Network, Fault::never_ready()).unwrap();
        admit(&cloud, &network("n1"));

        for _ in 0..5 {
            let got = cloud.observe::<RawNetwork>("n1").unwrap().unwrap();
            assert_eq!(got.status, ProvisioningStatus::PendingCreate);
        }
    }

    #[test]
    fn test_limited_fault_is_used_up() {
        let cloud = MemoryCloud::isolated("t").unwrap().with_latency(0);
        cloud
            .inject(ResourceKind::Network, Fault::error_state().times(1))
            .unwrap();
        admit(&cloud, &network("n1"));
        admit(&cloud, &network("n2"));

        let n1 = cloud.observe::<RawNetwork>("n1").unwrap().unwrap();
        let n2 = cloud.observe::<RawNetwork>("n2").unwrap().unwrap();
        assert_eq!(n1.status, ProvisioningStatus::Error);
        assert_eq!(n2.status, ProvisioningStatus::Active);
    }

    #[test]
    fn test_fail_create_leaves_nothing() {
        let cloud = MemoryCloud::isolated("t").unwrap();
        cloud.inject(ResourceKind::Network, Fault::fail_create()).unwrap();

        let result = cloud.scope().transaction(|tx| cloud.admit(tx, &network("n1")));
        assert!(matches!(result, Err(CloudError::ApiError(_))));
        assert_eq!(cloud.census().unwrap().count(ResourceKind::Network), 0);
    }

    #[test]
    fn test_retire_vanishes_after_latency() {
        let cloud = MemoryCloud::isolated("t").unwrap().with_latency(1);
        admit(&cloud, &network("n1"));
        cloud
            .scope()
            .transaction(|tx| cloud.retire::<RawNetwork>(tx, "n1"))
            .unwrap();

        let got = cloud.observe::<RawNetwork>("n1").unwrap().unwrap();
        assert_eq!(got.status, ProvisioningStatus::PendingDelete);
        assert!(cloud.observe::<RawNetwork>("n1").unwrap().is_none());
    }

    #[test]
    fn test_fail_delete_after_some_deletions() {
        let cloud = MemoryCloud::isolated("t").unwrap();
        admit(&cloud, &network("n1"));
        admit(&cloud, &network("n2"));
        cloud
            .inject(ResourceKind::Network, Fault::fail_delete().after(1))
            .unwrap();

        let retire = |id: &str| {
            cloud
                .scope()
                .transaction(|tx| cloud.retire::<RawNetwork>(tx, id))
        };
        assert!(retire("n1").is_ok());
        assert!(matches!(retire("n2"), Err(CloudError::ApiError(_))));
        assert!(matches!(retire("n2"), Err(CloudError::ApiError(_))));

        let got = cloud.observe::<RawNetwork>("n2").unwrap().unwrap();
        assert_ne!(got.status, ProvisioningStatus::PendingDelete);
    }

    #[test]
    fn test_transient_reads_then_recover() {
        let cloud = MemoryCloud::isolated("t").unwrap().with_latency(0);
        admit(&cloud, &network("n1"));
        cloud
            .inject(ResourceKind::Network, Fault::transient_reads(2))
            .unwrap();

        assert!(cloud.observe::<RawNetwork>("n1").is_err());
        assert!(cloud.observe::<RawNetwork>("n1").is_err());
        assert!(cloud.observe::<RawNetwork>("n1").unwrap().is_some());
    }

    #[test]
    fn test_census_skips_external_network() {
        let cloud = MemoryCloud::isolated("t").unwrap();
        assert!(cloud.census().unwrap().is_empty());
        assert_eq!(cloud.census().unwrap().to_string(), "nothing");

        admit(&cloud, &network("n1"));
        let census = cloud.census().unwrap();
        assert_eq!(census.total(), 1);
        assert_eq!(census.to_string(), "1 network");
    }
}
