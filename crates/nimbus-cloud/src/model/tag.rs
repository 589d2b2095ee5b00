use super::KeyValue;
use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource types a tag can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Vpc,
    Subnet,
    Nlb,
    Vm,
    Sg,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Vpc => write!(f, "VPC"),
            ResourceType::Subnet => write!(f, "SUBNET"),
            ResourceType::Nlb => write!(f, "NLB"),
            ResourceType::Vm => write!(f, "VM"),
            ResourceType::Sg => write!(f, "SG"),
        }
    }
}

/// Reject tags the `key=value` storage form cannot represent
pub fn validate_tag(tag: &KeyValue) -> Result<()> {
    if tag.key.is_empty() {
        return Err(CloudError::Validation("tag key must not be empty".to_string()));
    }
    if tag.key.contains('=') || tag.value.contains('=') {
        return Err(CloudError::Validation(format!(
            "tag {} must not contain '=' in key or value",
            tag
        )));
    }
    Ok(())
}
