//! Where the VM-group port is remembered
//!
//! Pool members each carry a port, but an empty group still needs one. The
//! port is kept in the backend's structured metadata when it offers any, and
//! otherwise in the pool description as the token `vmgroupport:<port>,`.

use crate::backend::{LoadBalancerBackend, RawMember, RawPool};
use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Metadata key holding the VM-group port
pub const MEMBER_PORT_KEY: &str = "vmgroupport";

static PORT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vmgroupport:([0-9]+)").expect("constant pattern"));

/// Structured per-object key/value side-table
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put(&self, object_id: &str, key: &str, value: &str) -> Result<()>;

    async fn get(&self, object_id: &str, key: &str) -> Result<Option<String>>;

    /// Drop everything stored for an object
    async fn remove_all(&self, object_id: &str) -> Result<()>;
}

pub fn encode_port_description(port: u16) -> String {
    format!("{}:{},", MEMBER_PORT_KEY, port)
}

/// Port from the first `vmgroupport:<digits>` token of a description
pub fn decode_port_description(description: &str) -> Option<u16> {
    PORT_TOKEN
        .captures(description)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Reads and writes the VM-group port of a pool
pub struct MemberPortRecord<'a> {
    backend: &'a dyn LoadBalancerBackend,
}

impl<'a> MemberPortRecord<'a> {
    pub fn new(backend: &'a dyn LoadBalancerBackend) -> Self {
        Self { backend }
    }

    /// Description to create a pool with
    pub fn pool_description(&self, port: u16) -> String {
        match self.backend.metadata() {
            Some(_) => String::new(),
            None => encode_port_description(port),
        }
    }

    /// Record `port` for an existing pool
    pub async fn store(&self, pool_id: &str, port: u16) -> Result<()> {
        match self.backend.metadata() {
            Some(store) => store.put(pool_id, MEMBER_PORT_KEY, &port.to_string()).await,
            None => {
                self.backend
                    .update_pool_description(pool_id, &encode_port_description(port))
                    .await?;
                Ok(())
            }
        }
    }

    /// Recorded port, falling back to the first member's port
    pub async fn load(&self, pool: &RawPool, members: &[RawMember]) -> Option<u16> {
        if let Some(store) = self.backend.metadata() {
            match store.get(&pool.id, MEMBER_PORT_KEY).await {
                Ok(Some(value)) => {
                    if let Ok(port) = value.parse() {
                        return Some(port);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("Metadata lookup for pool {} failed: {}", pool.id, e),
            }
        }

        decode_port_description(&pool.description)
            .or_else(|| members.first().map(|m| m.protocol_port))
    }

    pub async fn forget(&self, pool_id: &str) -> Result<()> {
        match self.backend.metadata() {
            Some(store) => store.remove_all(pool_id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_port_description() {
        assert_eq!(encode_port_description(8080), "vmgroupport:8080,");
    }

    #[test]
    fn test_decode_first_token_wins() {
        assert_eq!(decode_port_description("vmgroupport:8080,"), Some(8080));
        assert_eq!(
            decode_port_description("owner=ops vmgroupport:81,vmgroupport:82,"),
            Some(81)
        );
    }

    #[test]
    fn test_decode_without_token() {
        assert_eq!(decode_port_description(""), None);
        assert_eq!(decode_port_description("vmgroupport:,"), None);
        assert_eq!(decode_port_description("vmgroupport:99999,"), None);
    }
}
