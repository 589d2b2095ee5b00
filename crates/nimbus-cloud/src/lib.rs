//! Nimbus Cloud Provisioning
//!
//! This crate provides the provider-neutral resource model and the composite
//! provisioning orchestrators for Nimbus. A composite resource (a virtual
//! network with its router, a load balancer with its pool, monitor, members,
//! listener and public address) is created as an ordered series of backend
//! calls; every created sub-resource is recorded so that a failure part way
//! through can be undone.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        VpcHandler / NlbHandler (callers)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                  nimbus-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   NetworkProvisioner  LoadBalancerProv.   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │StepExecutor│ │Compensator │ │   Poller   │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │  backend traits │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  in-memory    │ │  other cloud  │
//! │   backend     │ │   backends    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod backend;
pub mod compensator;
pub mod connection;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod metadata;
pub mod model;
pub mod poller;
pub mod provision;
pub mod status;

// Re-exports
pub use backend::{
    CloudClients, ComputeBackend, FixedAddress, LbCapabilities, ListenerCreate,
    LoadBalancerBackend, LoadBalancerCreate, MemberCreate, MonitorCreate, NetworkBackend,
    NetworkCreate, PoolCreate, RawFloatingIp, RawListener, RawLoadBalancer, RawMember,
    RawMonitor, RawNetwork, RawPool, RawRouter, RawServer, RawSubnet, RouterCreate,
    SubnetCreate,
};
pub use compensator::{Compensator, Reaper};
pub use connection::CloudConnection;
pub use error::{CloudError, FailureOutcome, Result, RollbackError, RollbackFailure};
pub use handler::{NlbHandler, TagBinder, VpcHandler};
pub use ledger::{Ledger, LedgerEntry, ResourceKind, Step, StepExecutor};
pub use metadata::{
    MEMBER_PORT_KEY, MemberPortRecord, MetadataStore, decode_port_description,
    encode_port_description,
};
pub use model::{
    Applied, HealthCheckerInfo, HealthInfo, Iid, Ipv4Cidr, KeyValue, ListenerInfo, NlbInfo,
    NlbRequest, NlbScope, NlbType, Notice, Protocol, ResourceType, SubnetInfo, VmGroupInfo,
    VpcInfo, VpcRequest, validate_tag,
};
pub use poller::{
    HasStatus, PollConfig, PollTarget, ProvisionSettings, wait_for_active, wait_for_deleted,
    wait_until,
};
pub use provision::{
    BackendReaper, LoadBalancerProvisioner, NOTICE_KEY, NetworkProvisioner, STALE_MEMBERS_KEY,
};
pub use status::{OperatingStatus, ProvisioningStatus};
