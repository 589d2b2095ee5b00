use super::{Iid, KeyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocols accepted by listeners, pools and health checkers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Ping,
}

impl Protocol {
    /// Case-insensitive parse
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Some(Self::Tcp),
            "UDP" => Some(Self::Udp),
            "HTTP" => Some(Self::Http),
            "HTTPS" => Some(Self::Https),
            "PING" => Some(Self::Ping),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Ping => "PING",
        }
    }

    /// Protocols a health checker may check with
    pub fn is_health_check(&self) -> bool {
        matches!(self, Self::Ping | Self::Tcp | Self::Http | Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load balancer exposure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NlbType {
    #[default]
    Public,
    Internal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NlbScope {
    #[default]
    Region,
    Global,
}

/// Front end of a load balancer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerInfo {
    pub protocol: String,
    /// Public address, filled in by the backend
    #[serde(default)]
    pub ip: String,
    pub port: String,
    #[serde(default)]
    pub dns_name: String,
    #[serde(default)]
    pub csp_id: String,
    #[serde(default)]
    pub key_values: Vec<KeyValue>,
}

impl ListenerInfo {
    pub fn new(protocol: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            port: port.into(),
            ..Default::default()
        }
    }
}

/// Back-end VMs receiving traffic, all on the same port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmGroupInfo {
    pub protocol: String,
    pub port: String,
    #[serde(default)]
    pub vms: Vec<Iid>,
    #[serde(default)]
    pub csp_id: String,
    #[serde(default)]
    pub key_values: Vec<KeyValue>,
}

impl VmGroupInfo {
    pub fn new(protocol: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn with_vm(mut self, name: impl Into<String>) -> Self {
        self.vms.push(Iid::by_name(name));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vms.iter().any(|vm| vm.same_name(name))
    }
}

/// Health check of the VM group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckerInfo {
    pub protocol: String,
    /// Empty means "the VM group port"
    #[serde(default)]
    pub port: String,
    /// Seconds between checks
    pub interval: i32,
    /// Seconds before a check counts as failed
    pub timeout: i32,
    /// Consecutive results needed to flip health
    pub threshold: i32,
    #[serde(default)]
    pub csp_id: String,
    #[serde(default)]
    pub key_values: Vec<KeyValue>,
}

impl HealthCheckerInfo {
    pub fn new(protocol: impl Into<String>, interval: i32, timeout: i32, threshold: i32) -> Self {
        Self {
            protocol: protocol.into(),
            interval,
            timeout,
            threshold,
            ..Default::default()
        }
    }

    /// Whether both describe the same check, ignoring ids and port
    pub fn same_check(&self, other: &HealthCheckerInfo) -> bool {
        self.protocol.eq_ignore_ascii_case(&other.protocol)
            && self.interval == other.interval
            && self.timeout == other.timeout
            && self.threshold == other.threshold
    }
}

/// Member health of a VM group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthInfo {
    pub all_vms: Vec<Iid>,
    pub healthy_vms: Vec<Iid>,
    pub unhealthy_vms: Vec<Iid>,
}

/// Request to create a network load balancer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlbRequest {
    pub iid: Iid,
    pub vpc_iid: Iid,
    #[serde(default)]
    pub nlb_type: NlbType,
    #[serde(default)]
    pub scope: NlbScope,
    pub listener: ListenerInfo,
    pub vm_group: VmGroupInfo,
    pub health_checker: HealthCheckerInfo,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

/// Network load balancer as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlbInfo {
    pub iid: Iid,
    pub vpc_iid: Iid,
    pub nlb_type: NlbType,
    pub scope: NlbScope,
    pub listener: ListenerInfo,
    pub vm_group: VmGroupInfo,
    pub health_checker: HealthCheckerInfo,
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
    #[serde(default)]
    pub key_values: Vec<KeyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("tcp"), Some(Protocol::Tcp));
        assert_eq!(Protocol::parse(" Https "), Some(Protocol::Https));
        assert_eq!(Protocol::parse("SCTP"), None);
        assert!(Protocol::Ping.is_health_check());
        assert!(!Protocol::Udp.is_health_check());
    }

    #[test]
    fn test_same_check() {
        let a = HealthCheckerInfo::new("TCP", 10, 5, 3);
        let mut b = HealthCheckerInfo::new("tcp", 10, 5, 3);
        b.port = "8080".to_string();
        b.csp_id = "hm-1".to_string();
        assert!(a.same_check(&b));
        assert!(!a.same_check(&HealthCheckerInfo::new("TCP", 10, 5, 4)));
    }

    #[test]
    fn test_vm_group_contains() {
        let group = VmGroupInfo::new("TCP", "8080").with_vm("web-1");
        assert!(group.contains("WEB-1"));
        assert!(!group.contains("web-2"));
    }
}
