//! Entry point bundling one backend's clients with provisioning settings

use crate::backend::CloudClients;
use crate::poller::ProvisionSettings;
use crate::provision::{LoadBalancerProvisioner, NetworkProvisioner};

/// Connection to one backend region, handing out capability handlers
#[derive(Clone)]
pub struct CloudConnection {
    clients: CloudClients,
    settings: ProvisionSettings,
}

impl CloudConnection {
    pub fn new(clients: CloudClients, settings: ProvisionSettings) -> Self {
        Self { clients, settings }
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    pub fn vpc_handler(&self) -> NetworkProvisioner {
        NetworkProvisioner::new(self.clients.clone(), self.settings)
    }

    pub fn nlb_handler(&self) -> LoadBalancerProvisioner {
        LoadBalancerProvisioner::new(self.clients.clone(), self.settings)
    }
}
