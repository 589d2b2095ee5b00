use crate::simulator::Simulator;
use colored::Colorize;
use nimbus_cloud::{
    HealthCheckerInfo, Iid, ListenerInfo, NlbHandler, NlbInfo, NlbRequest, ResourceKind,
    SubnetInfo, VmGroupInfo, VpcHandler, VpcRequest,
};
use nimbus_config::NimbusConfig;

/// Enough host addresses in the simulated /24
const MAX_VMS: usize = 200;

pub struct CreateOptions {
    pub name: String,
    pub vms: usize,
    pub protocol: String,
    pub listener_port: u16,
    pub vm_port: u16,
    pub side_table: bool,
    pub fail_at: Option<ResourceKind>,
}

fn vm_name(lb: &str, index: usize) -> String {
    format!("{}-vm-{}", lb, index + 1)
}

pub async fn create(config: &NimbusConfig, options: CreateOptions) -> anyhow::Result<()> {
    if options.vms == 0 || options.vms > MAX_VMS {
        anyhow::bail!("--vms must be between 1 and {}", MAX_VMS);
    }
    let sim = Simulator::new(config, options.side_table)?;

    // Network and VMs the load balancer is put in front of
    let vpc_name = format!("{}-vpc", options.name);
    let request = VpcRequest::new(vpc_name.as_str(), "10.0.0.0/16")
        .with_subnet(SubnetInfo::new(format!("{}-subnet", options.name), "10.0.0.0/24"));
    let vpc = sim.connection.vpc_handler().create_vpc(request).await?.into_info();
    let subnet_id = vpc
        .subnets
        .first()
        .map(|s| s.iid.system_id.clone())
        .ok_or_else(|| anyhow::anyhow!("network {} came back without a subnet", vpc.iid))?;

    let mut vm_group = VmGroupInfo::new(options.protocol.as_str(), options.vm_port.to_string());
    for i in 0..options.vms {
        let name = vm_name(&options.name, i);
        sim.cloud
            .add_server(&name, &subnet_id, &format!("10.0.0.{}", 10 + i))?;
        vm_group = vm_group.with_vm(name);
    }
    println!(
        "Prepared network {} with {} VM(s)",
        vpc.iid.to_string().cyan(),
        options.vms
    );

    sim.fail_at(options.fail_at)?;

    let request = NlbRequest {
        iid: Iid::by_name(options.name.as_str()),
        vpc_iid: vpc.iid.clone(),
        listener: ListenerInfo::new(options.protocol.as_str(), options.listener_port.to_string()),
        vm_group,
        health_checker: HealthCheckerInfo::new(options.protocol.as_str(), 10, 5, 3),
        ..Default::default()
    };

    println!("{}", format!("Creating load balancer {}...", options.name).blue());
    let handler = sim.connection.nlb_handler();
    match handler.create_nlb(request).await {
        Ok(applied) => {
            print_nlb(&applied.info);
            for notice in &applied.notices {
                println!("  {} {}", "⚠".yellow(), notice);
            }
            println!("  backend now holds: {}", sim.cloud.census()?);
            Ok(())
        }
        Err(e) => {
            sim.report_failure("load balancer creation", &e)?;
            Err(e.into())
        }
    }
}

fn print_nlb(nlb: &NlbInfo) {
    println!("{}", format!("✓ Load balancer {} created", nlb.iid).green().bold());
    println!(
        "  listener: {} {}:{}",
        nlb.listener.protocol,
        nlb.listener.ip.cyan(),
        nlb.listener.port
    );
    let vms: Vec<String> = nlb.vm_group.vms.iter().map(|vm| vm.to_string()).collect();
    println!(
        "  VM group: {} port {} ({})",
        nlb.vm_group.protocol,
        nlb.vm_group.port,
        vms.join(", ")
    );
    let checker = &nlb.health_checker;
    println!(
        "  health checker: {} every {}s, timeout {}s, threshold {}",
        checker.protocol, checker.interval, checker.timeout, checker.threshold
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_name() {
        assert_eq!(vm_name("web", 0), "web-vm-1");
        assert_eq!(vm_name("web", 2), "web-vm-3");
    }
}
