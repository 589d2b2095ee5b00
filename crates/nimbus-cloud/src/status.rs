//! Backend object status values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provisioning status of a backend object
///
/// Objects start `PendingCreate`, move to `Active`, and may pass through
/// `PendingUpdate` while children are attached. `Error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    /// Object is being created
    PendingCreate,
    /// Object is being reconfigured
    PendingUpdate,
    /// Object is being deleted
    PendingDelete,
    /// Object is ready
    Active,
    /// Object has been deleted
    Deleted,
    /// Object failed and will not recover
    Error,
}

impl ProvisioningStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ProvisioningStatus::Active)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ProvisioningStatus::Error)
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ProvisioningStatus::PendingCreate
                | ProvisioningStatus::PendingUpdate
                | ProvisioningStatus::PendingDelete
        )
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningStatus::PendingCreate => write!(f, "PENDING_CREATE"),
            ProvisioningStatus::PendingUpdate => write!(f, "PENDING_UPDATE"),
            ProvisioningStatus::PendingDelete => write!(f, "PENDING_DELETE"),
            ProvisioningStatus::Active => write!(f, "ACTIVE"),
            ProvisioningStatus::Deleted => write!(f, "DELETED"),
            ProvisioningStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Operating status reported for load-balancer members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingStatus {
    Online,
    Draining,
    Offline,
    Degraded,
    Error,
    NoMonitor,
}

impl fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingStatus::Online => write!(f, "ONLINE"),
            OperatingStatus::Draining => write!(f, "DRAINING"),
            OperatingStatus::Offline => write!(f, "OFFLINE"),
            OperatingStatus::Degraded => write!(f, "DEGRADED"),
            OperatingStatus::Error => write!(f, "ERROR"),
            OperatingStatus::NoMonitor => write!(f, "NO_MONITOR"),
        }
    }
}
