use std::fmt;

use crate::net::InetAddress;
use crate::state::{IpIdCounter, IpTable};

/// The probing technique that established an interface as part of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasMethod {
    /// Ally-style IP-ID counter compatibility.
    IpIdBased,
    /// UDP probe answered by a port-unreachable from a different interface.
    UdpPortUnreachable,
    /// Matching reverse-DNS naming scheme.
    ReverseDns,
    /// Grouped among echo-counter interfaces of one neighborhood.
    GroupEcho,
    /// Grouped among random-counter interfaces of one neighborhood.
    GroupRandom,
    /// Grouped on the timestamp fingerprint alone.
    GroupReserved,
}

impl AliasMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AliasMethod::IpIdBased => "ip-id",
            AliasMethod::UdpPortUnreachable => "udp-unreachable",
            AliasMethod::ReverseDns => "reverse-dns",
            AliasMethod::GroupEcho => "group-echo",
            AliasMethod::GroupRandom => "group-random",
            AliasMethod::GroupReserved => "group-reserved",
        }
    }
}

impl fmt::Display for AliasMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interface attributed to a router, ordered by ip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterInterface {
    pub ip: InetAddress,
    pub method: AliasMethod,
}

impl PartialOrd for RouterInterface {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RouterInterface {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ip.cmp(&other.ip)
    }
}

/// A set of interfaces believed to sit on one device.
///
/// Credible routers carry at least two interfaces, or exactly one whose
/// association came from a UDP port-unreachable reply-source mismatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Router {
    interfaces: Vec<RouterInterface>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interface(&mut self, ip: InetAddress, method: AliasMethod) {
        if self.has_interface(ip) {
            return;
        }
        let pos = self.interfaces.partition_point(|i| i.ip < ip);
        self.interfaces.insert(pos, RouterInterface { ip, method });
    }

    pub fn interfaces(&self) -> &[RouterInterface] {
        &self.interfaces
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn has_interface(&self, ip: InetAddress) -> bool {
        self.interfaces.iter().any(|i| i.ip == ip)
    }

    /// First interface aliased through UDP port-unreachable whose counter
    /// classifies Healthy. Such an interface anchors the merge of two router
    /// candidates that may describe the same device.
    pub fn merging_pivot(&self, table: &IpTable) -> Option<InetAddress> {
        for itf in &self.interfaces {
            if itf.method != AliasMethod::UdpPortUnreachable {
                continue;
            }
            if let Some(entry) = table.lookup(itf.ip) {
                if entry.read().counter == IpIdCounter::Healthy {
                    return Some(itf.ip);
                }
            }
        }
        None
    }

    /// A router is credible with two interfaces, or with a single one
    /// established by a UDP reply-source mismatch.
    pub fn is_credible(&self) -> bool {
        match self.interfaces.len() {
            0 => false,
            1 => self.interfaces[0].method == AliasMethod::UdpPortUnreachable,
            _ => true,
        }
    }

    /// Distinct alias methods present, in interface order.
    pub fn methods(&self) -> Vec<AliasMethod> {
        let mut methods = Vec::new();
        for itf in &self.interfaces {
            if !methods.contains(&itf.method) {
                methods.push(itf.method);
            }
        }
        methods
    }
}

impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for itf in &self.interfaces {
            if first {
                first = false;
            } else {
                f.write_str(" ")?;
            }
            write!(f, "{}", itf.ip)?;
        }
        Ok(())
    }
}
