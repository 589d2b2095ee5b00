//! Request checks performed before any backend call

use crate::backend::LbCapabilities;
use crate::error::{CloudError, Result};
use crate::model::{HealthCheckerInfo, Ipv4Cidr, NlbRequest, Protocol, SubnetInfo, VpcRequest};

pub fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CloudError::Validation(format!("{} name must not be empty", what)));
    }
    Ok(())
}

/// Port in 1..=65535
pub fn parse_port(what: &str, port: &str) -> Result<u16> {
    match port.trim().parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(CloudError::Validation(format!(
            "invalid {} port '{}', port must be between 1 and 65535",
            what, port
        ))),
    }
}

fn supported(what: &str, protocol: &str, allowed: &[Protocol]) -> Result<Protocol> {
    Protocol::parse(protocol)
        .filter(|p| allowed.contains(p))
        .ok_or_else(|| {
            let names: Vec<_> = allowed.iter().map(Protocol::as_str).collect();
            CloudError::Validation(format!(
                "invalid {} protocol '{}', supported: {}",
                what,
                protocol,
                names.join(", ")
            ))
        })
}

pub fn listener_protocol(caps: &LbCapabilities, protocol: &str) -> Result<Protocol> {
    supported("listener", protocol, &caps.listener_protocols)
}

pub fn pool_protocol(caps: &LbCapabilities, protocol: &str) -> Result<Protocol> {
    supported("VM group", protocol, &caps.pool_protocols)
}

pub fn health_checker(checker: &HealthCheckerInfo) -> Result<Protocol> {
    let protocol = Protocol::parse(&checker.protocol)
        .filter(Protocol::is_health_check)
        .ok_or_else(|| {
            CloudError::Validation(format!(
                "invalid health checker protocol '{}', supported: PING, TCP, HTTP, HTTPS",
                checker.protocol
            ))
        })?;

    if !(1..=10).contains(&checker.threshold) {
        return Err(CloudError::Validation(
            "invalid health checker threshold, must be between 1 and 10".to_string(),
        ));
    }
    if checker.timeout < 0 {
        return Err(CloudError::Validation(
            "invalid health checker timeout, must be greater than or equal to 0".to_string(),
        ));
    }
    if checker.interval < checker.timeout {
        return Err(CloudError::Validation(
            "invalid health checker interval, must be greater than or equal to the timeout"
                .to_string(),
        ));
    }
    Ok(protocol)
}

/// Validated shape of a load-balancer request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NlbPlan {
    pub listener_protocol: Protocol,
    pub listener_port: u16,
    pub pool_protocol: Protocol,
    pub member_port: u16,
    pub monitor_protocol: Protocol,
}

pub fn nlb_request(caps: &LbCapabilities, request: &NlbRequest) -> Result<NlbPlan> {
    require_name("NLB", &request.iid.name_id)?;
    if request.vpc_iid.is_empty() {
        return Err(CloudError::Validation("NLB VPC must be given".to_string()));
    }

    let plan = NlbPlan {
        listener_protocol: listener_protocol(caps, &request.listener.protocol)?,
        listener_port: parse_port("listener", &request.listener.port)?,
        pool_protocol: pool_protocol(caps, &request.vm_group.protocol)?,
        member_port: parse_port("VM group", &request.vm_group.port)?,
        monitor_protocol: health_checker(&request.health_checker)?,
    };

    let checker_port = request.health_checker.port.trim();
    if !checker_port.is_empty() && parse_port("health checker", checker_port)? != plan.member_port {
        return Err(CloudError::Unsupported(
            "the health checker port must match the VM group port".to_string(),
        ));
    }

    let mut seen: Vec<&str> = Vec::new();
    for vm in &request.vm_group.vms {
        require_name("VM", &vm.name_id)?;
        if seen.iter().any(|s| s.eq_ignore_ascii_case(&vm.name_id)) {
            return Err(CloudError::Validation(format!(
                "VM '{}' is listed more than once",
                vm.name_id
            )));
        }
        seen.push(&vm.name_id);
    }

    Ok(plan)
}

/// Subnet CIDR inside `vpc` and clear of `siblings`
pub fn subnet_cidr(vpc: &Ipv4Cidr, siblings: &[(String, Ipv4Cidr)], subnet: &SubnetInfo) -> Result<Ipv4Cidr> {
    require_name("subnet", &subnet.iid.name_id)?;
    let cidr = Ipv4Cidr::new(&subnet.ipv4_cidr)?;

    if !vpc.contains(&cidr) {
        return Err(CloudError::Validation(format!(
            "subnet {} CIDR {} is outside the VPC CIDR {}",
            subnet.iid.name_id, cidr, vpc
        )));
    }
    for (name, other) in siblings {
        if name.eq_ignore_ascii_case(&subnet.iid.name_id) {
            return Err(CloudError::Validation(format!(
                "subnet name {} is used twice",
                subnet.iid.name_id
            )));
        }
        if other.overlaps(&cidr) {
            return Err(CloudError::Validation(format!(
                "subnet {} CIDR {} overlaps subnet {} ({})",
                subnet.iid.name_id, cidr, name, other
            )));
        }
    }
    Ok(cidr)
}

pub fn vpc_request(request: &VpcRequest) -> Result<Ipv4Cidr> {
    require_name("VPC", &request.iid.name_id)?;
    let vpc = Ipv4Cidr::new(&request.ipv4_cidr)?;

    let mut siblings = Vec::with_capacity(request.subnets.len());
    for subnet in &request.subnets {
        let cidr = subnet_cidr(&vpc, &siblings, subnet)?;
        siblings.push((subnet.iid.name_id.clone(), cidr));
    }
    Ok(vpc)
}
