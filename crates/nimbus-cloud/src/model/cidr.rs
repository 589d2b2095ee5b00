//! IPv4 CIDR value object

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 network in CIDR notation, normalised to its network address
///
/// Invariants:
/// - prefix length is 0-32
/// - host bits of `network` are zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(cidr: impl AsRef<str>) -> Result<Self> {
        let cidr = cidr.as_ref().trim();
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| CloudError::Validation(format!("invalid CIDR '{}': missing prefix", cidr)))?;

        let address = Ipv4Addr::from_str(addr)
            .map_err(|_| CloudError::Validation(format!("invalid CIDR '{}': bad address", cidr)))?;
        let prefix = prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| CloudError::Validation(format!("invalid CIDR '{}': bad prefix", cidr)))?;

        Ok(Self {
            network: Ipv4Addr::from(u32::from(address) & mask(prefix)),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn first(&self) -> u32 {
        u32::from(self.network)
    }

    fn last(&self) -> u32 {
        self.first() | !mask(self.prefix)
    }

    /// Whether `other` lies entirely inside this network
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.first() >= self.first() && other.last() <= self.last()
    }

    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        addr >= self.first() && addr <= self.last()
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}
