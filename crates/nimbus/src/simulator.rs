//! In-memory cloud wired up from the loaded config

use colored::Colorize;
use nimbus_cloud::{CloudConnection, CloudError, FailureOutcome, ResourceKind};
use nimbus_cloud_memory::{Fault, MemoryCloud, MemoryStore};
use nimbus_config::NimbusConfig;
use std::sync::Arc;

pub struct Simulator {
    pub cloud: Arc<MemoryCloud>,
    pub connection: CloudConnection,
}

impl Simulator {
    pub fn new(config: &NimbusConfig, side_table: bool) -> anyhow::Result<Self> {
        let mut cloud = MemoryCloud::new(MemoryStore::new().scope(&config.scope))?
            .with_side_table(side_table);
        if let Some(name) = &config.external_network {
            cloud = cloud.with_external_network(name.as_str())?;
        }
        let cloud = Arc::new(cloud);
        let connection = CloudConnection::new(cloud.clients(), config.settings());
        Ok(Self { cloud, connection })
    }

    pub fn fail_at(&self, kind: Option<ResourceKind>) -> anyhow::Result<()> {
        if let Some(kind) = kind {
            println!("{} creating any {} will fail", "!".yellow().bold(), kind);
            self.cloud.inject(kind, Fault::fail_create())?;
        }
        Ok(())
    }

    /// Print what a failed operation left behind
    pub fn report_failure(&self, what: &str, error: &CloudError) -> anyhow::Result<()> {
        eprintln!();
        eprintln!("{}", format!("✗ {} failed", what).red().bold());
        eprintln!("  {}", error.root_cause());

        let outcome = error.failure_outcome();
        let label = match outcome {
            FailureOutcome::NothingCreated => outcome.to_string().normal(),
            FailureOutcome::CleanedUp => outcome.to_string().green(),
            FailureOutcome::NeedsManualCleanup => outcome.to_string().red().bold(),
        };
        eprintln!("  outcome: {}", label);
        for entry in error.leftovers() {
            eprintln!("  left behind: {}", entry.to_string().yellow());
        }
        eprintln!("  backend now holds: {}", self.cloud.census()?);
        Ok(())
    }
}
