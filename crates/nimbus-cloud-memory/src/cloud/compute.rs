use super::{MemoryCloud, SERVERS, SUBNETS, new_id};
use async_trait::async_trait;
use nimbus_cloud::{
    CloudError, ComputeBackend, FixedAddress, Ipv4Cidr, RawServer, RawSubnet, Result,
};
use std::net::Ipv4Addr;

impl MemoryCloud {
    /// Register a running instance with one private address on `subnet_id`
    pub fn add_server(&self, name: &str, subnet_id: &str, address: &str) -> Result<RawServer> {
        let addr: Ipv4Addr = address
            .parse()
            .map_err(|_| CloudError::Validation(format!("invalid address '{}'", address)))?;

        self.scope().transaction(|tx| {
            let subnet: RawSubnet = tx
                .get(SUBNETS, subnet_id)?
                .ok_or_else(|| CloudError::ResourceNotFound(format!("subnet {}", subnet_id)))?;
            if !Ipv4Cidr::new(&subnet.cidr)?.contains_addr(addr) {
                return Err(CloudError::Validation(format!(
                    "{} is outside subnet {} ({})",
                    address, subnet.name, subnet.cidr
                )));
            }

            let servers: Vec<RawServer> = tx.values(SERVERS)?;
            if servers.iter().any(|s| s.name == name) {
                return Err(CloudError::ResourceAlreadyExists(format!("server {}", name)));
            }

            let server = RawServer {
                id: new_id("server"),
                name: name.to_string(),
                addresses: vec![FixedAddress {
                    address: address.to_string(),
                    subnet_id: subnet.id,
                }],
            };
            tx.put(SERVERS, server.id.clone(), &server)?;
            tracing::debug!("memory: server {} at {}", name, address);
            Ok(server)
        })
    }

    /// Returns whether a server of that name existed
    pub fn remove_server(&self, name: &str) -> Result<bool> {
        self.scope().transaction(|tx| {
            let servers: Vec<RawServer> = tx.values(SERVERS)?;
            Ok(match servers.into_iter().find(|s| s.name == name) {
                Some(server) => tx.remove(SERVERS, &server.id),
                None => false,
            })
        })
    }
}

#[async_trait]
impl ComputeBackend for MemoryCloud {
    async fn list_servers(&self) -> Result<Vec<RawServer>> {
        self.scope().transaction(|tx| Ok(tx.values(SERVERS)?))
    }

    async fn find_server(&self, name: &str) -> Result<Option<RawServer>> {
        let servers = self.list_servers().await?;
        Ok(servers.into_iter().find(|s| s.name == name))
    }
}
