//! Provider-neutral resource model

pub mod cidr;
pub mod iid;
pub mod load_balancer;
pub mod network;
pub mod tag;

pub use cidr::Ipv4Cidr;
pub use iid::{Iid, KeyValue};
pub use load_balancer::{
    HealthCheckerInfo, HealthInfo, ListenerInfo, NlbInfo, NlbRequest, NlbScope, NlbType, Protocol,
    VmGroupInfo,
};
pub use network::{SubnetInfo, VpcInfo, VpcRequest};
pub use tag::{ResourceType, validate_tag};

use crate::error::CloudError;
use crate::ledger::LedgerEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-fatal problem reported alongside a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// What the notice is about (`tag`, `listener`, ...)
    pub subject: String,
    /// Backend id or name of the affected object
    pub id: String,
    pub message: String,
}

impl Notice {
    /// A superseded object that could not be deleted
    pub fn orphaned(entry: &LedgerEntry, error: &CloudError) -> Self {
        Self {
            subject: entry.kind.to_string(),
            id: entry.id.clone(),
            message: format!("left behind, delete it manually: {}", error),
        }
    }

    pub fn tag_failed(target: &Iid, tag: &KeyValue, error: &CloudError) -> Self {
        Self {
            subject: "tag".to_string(),
            id: target.to_string(),
            message: format!("failed to add tag {}: {}", tag, error),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.subject, self.id, self.message)
    }
}

/// Result of a successful create or change, with any non-fatal notices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Applied<T> {
    pub info: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<Notice>,
}

impl<T> Applied<T> {
    pub fn new(info: T) -> Self {
        Self {
            info,
            notices: Vec::new(),
        }
    }

    pub fn with_notices(mut self, notices: Vec<Notice>) -> Self {
        self.notices.extend(notices);
        self
    }

    pub fn into_info(self) -> T {
        self.info
    }

    pub fn is_clean(&self) -> bool {
        self.notices.is_empty()
    }
}
