use crate::simulator::Simulator;
use colored::Colorize;
use nimbus_cloud::{ResourceKind, SubnetInfo, VpcHandler, VpcInfo, VpcRequest};
use nimbus_config::NimbusConfig;

pub struct CreateOptions {
    pub name: String,
    pub cidr: String,
    pub subnets: Vec<(String, String)>,
    pub tags: Vec<(String, String)>,
    pub fail_at: Option<ResourceKind>,
}

/// First /24 inside the network, named after it
fn default_subnet(name: &str, cidr: &str) -> SubnetInfo {
    let base = cidr.split('/').next().unwrap_or(cidr);
    let prefix: Vec<&str> = base.split('.').take(3).collect();
    SubnetInfo::new(format!("{}-subnet", name), format!("{}.0/24", prefix.join(".")))
}

pub async fn create(config: &NimbusConfig, options: CreateOptions) -> anyhow::Result<()> {
    let sim = Simulator::new(config, true)?;
    sim.fail_at(options.fail_at)?;

    let mut request = VpcRequest::new(options.name.as_str(), options.cidr.as_str());
    if options.subnets.is_empty() {
        request = request.with_subnet(default_subnet(&options.name, &options.cidr));
    }
    for (name, cidr) in options.subnets {
        request = request.with_subnet(SubnetInfo::new(name, cidr));
    }
    for (key, value) in options.tags {
        request = request.with_tag(key, value);
    }

    println!("{}", format!("Creating network {}...", options.name).blue());
    match sim.connection.vpc_handler().create_vpc(request).await {
        Ok(applied) => {
            print_vpc(&applied.info);
            for notice in &applied.notices {
                println!("  {} {}", "⚠".yellow(), notice);
            }
            println!("  backend now holds: {}", sim.cloud.census()?);
            Ok(())
        }
        Err(e) => {
            sim.report_failure("network creation", &e)?;
            Err(e.into())
        }
    }
}

fn print_vpc(vpc: &VpcInfo) {
    println!("{}", format!("✓ Network {} created", vpc.iid).green().bold());
    println!("  CIDR: {}", vpc.ipv4_cidr.cyan());
    for subnet in &vpc.subnets {
        println!("  subnet: {} {}", subnet.iid, subnet.ipv4_cidr.cyan());
    }
    for tag in &vpc.tags {
        println!("  tag: {}={}", tag.key, tag.value);
    }
}
