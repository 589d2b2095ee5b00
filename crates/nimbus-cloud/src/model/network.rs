use super::{Iid, KeyValue};
use serde::{Deserialize, Serialize};

/// Subnet of a VPC, used both as request and as result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetInfo {
    pub iid: Iid,
    pub ipv4_cidr: String,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
    #[serde(default)]
    pub key_values: Vec<KeyValue>,
}

impl SubnetInfo {
    pub fn new(name: impl Into<String>, ipv4_cidr: impl Into<String>) -> Self {
        Self {
            iid: Iid::by_name(name),
            ipv4_cidr: ipv4_cidr.into(),
            ..Default::default()
        }
    }
}

/// Request to create a VPC with its subnets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcRequest {
    pub iid: Iid,
    pub ipv4_cidr: String,
    #[serde(default)]
    pub subnets: Vec<SubnetInfo>,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

impl VpcRequest {
    pub fn new(name: impl Into<String>, ipv4_cidr: impl Into<String>) -> Self {
        Self {
            iid: Iid::by_name(name),
            ipv4_cidr: ipv4_cidr.into(),
            ..Default::default()
        }
    }

    pub fn with_subnet(mut self, subnet: SubnetInfo) -> Self {
        self.subnets.push(subnet);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(KeyValue::new(key, value));
        self
    }
}

/// VPC as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInfo {
    pub iid: Iid,
    pub ipv4_cidr: String,
    pub subnets: Vec<SubnetInfo>,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
    #[serde(default)]
    pub key_values: Vec<KeyValue>,
}

impl VpcInfo {
    pub fn subnet(&self, name: &str) -> Option<&SubnetInfo> {
        self.subnets.iter().find(|s| s.iid.name_id == name)
    }
}
