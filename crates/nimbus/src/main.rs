mod commands;
mod simulator;

use clap::{Parser, Subcommand};
use nimbus_cloud::ResourceKind;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Composite cloud resources, created all or nothing", long_about = None)]
struct Cli {
    /// Config file to use instead of the discovered one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Virtual networks
    Network {
        #[command(subcommand)]
        command: NetworkCommands,
    },
    /// Network load balancers
    Lb {
        #[command(subcommand)]
        command: LbCommands,
    },
    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum NetworkCommands {
    /// Create a network with its router and subnets in the simulator
    Create {
        /// Network name
        name: String,
        /// Network CIDR
        #[arg(long, default_value = "10.0.0.0/16")]
        cidr: String,
        /// Subnet as NAME=CIDR (repeatable)
        #[arg(short, long = "subnet", value_parser = parse_pair)]
        subnets: Vec<(String, String)>,
        /// Tag as KEY=VALUE (repeatable)
        #[arg(short, long = "tag", value_parser = parse_pair)]
        tags: Vec<(String, String)>,
        /// Make creating this kind of object fail
        #[arg(long, value_parser = parse_kind)]
        fail_at: Option<ResourceKind>,
    },
}

#[derive(Subcommand)]
enum LbCommands {
    /// Create a load balancer in front of simulated VMs
    Create {
        /// Load balancer name
        name: String,
        /// Number of VMs to put behind it
        #[arg(long, default_value = "2")]
        vms: usize,
        /// Listener and VM group protocol
        #[arg(long, default_value = "TCP")]
        protocol: String,
        /// Listener port
        #[arg(long, default_value = "80")]
        listener_port: u16,
        /// Port the VMs serve on
        #[arg(long, default_value = "8080")]
        vm_port: u16,
        /// Keep the VM group port in the pool description only
        #[arg(long)]
        no_side_table: bool,
        /// Make creating this kind of object fail
        #[arg(long, value_parser = parse_kind)]
        fail_at: Option<ResourceKind>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    ResourceKind::from_str(s)
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("nimbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let loaded = match &cli.config {
        Some(path) => nimbus_config::LoadedConfig {
            config: nimbus_config::NimbusConfig::from_path(path)?,
            source: Some(path.clone()),
        },
        None => nimbus_config::load()?,
    };
    tracing::debug!("Using scope {}", loaded.config.scope);

    match cli.command {
        Commands::Network { command } => match command {
            NetworkCommands::Create {
                name,
                cidr,
                subnets,
                tags,
                fail_at,
            } => {
                let options = commands::network::CreateOptions {
                    name,
                    cidr,
                    subnets,
                    tags,
                    fail_at,
                };
                commands::network::create(&loaded.config, options).await?;
            }
        },
        Commands::Lb { command } => match command {
            LbCommands::Create {
                name,
                vms,
                protocol,
                listener_port,
                vm_port,
                no_side_table,
                fail_at,
            } => {
                let options = commands::lb::CreateOptions {
                    name,
                    vms,
                    protocol,
                    listener_port,
                    vm_port,
                    side_table: !no_side_table,
                    fail_at,
                };
                commands::lb::create(&loaded.config, options).await?;
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config::show(&loaded)?,
        },
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
