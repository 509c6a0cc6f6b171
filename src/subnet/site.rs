use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TopologyError;
use crate::net::InetAddress;

/// Measurement status of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetStatus {
    /// Pivot and contra-pivot(s) observed; borders credible.
    Accurate,
    /// Responsive but with an unusual interface layout.
    Odd,
    /// Only a partial interface list is known.
    Shadow,
    /// Block listed for avoidance, not measured.
    Undefined,
}

impl SubnetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubnetStatus::Accurate => "ACCURATE",
            SubnetStatus::Odd => "ODD",
            SubnetStatus::Shadow => "SHADOW",
            SubnetStatus::Undefined => "UNDEFINED",
        }
    }

    pub fn parse(token: &str) -> Option<SubnetStatus> {
        match token {
            "ACCURATE" => Some(SubnetStatus::Accurate),
            "ODD" => Some(SubnetStatus::Odd),
            "SHADOW" => Some(SubnetStatus::Shadow),
            "UNDEFINED" => Some(SubnetStatus::Undefined),
            _ => None,
        }
    }
}

impl fmt::Display for SubnetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A responding interface inside a subnet, with the TTL at which it answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetInterface {
    pub ip: InetAddress,
    pub ttl: u8,
}

/// A measured subnet: prefix, status, pivot, interface list and the
/// traceroute-style route leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSite {
    prefix: InetAddress,
    prefix_len: u8,
    pub status: SubnetStatus,
    pivot_ip: InetAddress,
    pub pivot_ttl: u8,
    /// Sorted by ip.
    interfaces: Vec<SubnetInterface>,
    /// One hop per TTL; `InetAddress::MISSING` marks an unresponsive hop.
    pub route: Vec<InetAddress>,
}

impl SubnetSite {
    /// Build a subnet site, enforcing that every interface lies inside the
    /// prefix block. The pivot is the first interface listed at the pivot
    /// TTL, falling back to the first interface, then to the prefix itself.
    pub fn new(
        prefix: InetAddress,
        prefix_len: u8,
        status: SubnetStatus,
        pivot_ttl: u8,
        mut interfaces: Vec<SubnetInterface>,
        route: Vec<InetAddress>,
    ) -> Result<Self, TopologyError> {
        let prefix = prefix.prefix(prefix_len);
        for itf in &interfaces {
            if !itf.ip.is_within(prefix, prefix_len) {
                return Err(TopologyError::InvariantViolation {
                    interface: itf.ip,
                    prefix,
                    prefix_len,
                });
            }
        }
        let pivot_ip = interfaces
            .iter()
            .find(|i| i.ttl == pivot_ttl)
            .or_else(|| interfaces.first())
            .map(|i| i.ip)
            .unwrap_or(prefix);
        interfaces.sort_by_key(|i| i.ip);
        interfaces.dedup_by_key(|i| i.ip);
        Ok(SubnetSite {
            prefix,
            prefix_len,
            status,
            pivot_ip,
            pivot_ttl,
            interfaces,
            route,
        })
    }

    pub fn prefix(&self) -> InetAddress {
        self.prefix
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn pivot_ip(&self) -> InetAddress {
        self.pivot_ip
    }

    pub fn interfaces(&self) -> &[SubnetInterface] {
        &self.interfaces
    }

    pub fn contains(&self, ip: InetAddress) -> bool {
        ip.is_within(self.prefix, self.prefix_len)
    }

    pub fn has_interface(&self, ip: InetAddress) -> bool {
        self.interfaces.binary_search_by_key(&ip, |i| i.ip).is_ok()
    }

    /// Merge another site's interfaces into this one (union by ip).
    pub fn absorb_interfaces(&mut self, other: &SubnetSite) {
        for itf in &other.interfaces {
            if !self.has_interface(itf.ip) && itf.ip.is_within(self.prefix, self.prefix_len) {
                let pos = self
                    .interfaces
                    .partition_point(|existing| existing.ip < itf.ip);
                self.interfaces.insert(pos, *itf);
            }
        }
    }

    /// Last address of the block.
    pub fn upper_border(&self) -> InetAddress {
        self.prefix.block_end(self.prefix_len)
    }

    /// True iff the two blocks share at least one address.
    pub fn overlaps(&self, lower: InetAddress, upper: InetAddress) -> bool {
        self.prefix <= upper && lower <= self.upper_border()
    }

    /// Strict containment: `other`'s block lies inside this one and the
    /// prefixes differ.
    pub fn encompasses(&self, other: &SubnetSite) -> bool {
        self.prefix_len < other.prefix_len && other.prefix.is_within(self.prefix, self.prefix_len)
    }

    /// Non-strict: same block or larger.
    pub fn covers(&self, other: &SubnetSite) -> bool {
        self.prefix_len <= other.prefix_len && other.prefix.is_within(self.prefix, self.prefix_len)
    }

    pub fn same_block(&self, other: &SubnetSite) -> bool {
        self.prefix == other.prefix && self.prefix_len == other.prefix_len
    }

    /// Contra-pivot interfaces: the subnet-side interfaces of the ingress
    /// router, observed one hop before the pivot.
    pub fn ingress_interfaces(&self) -> Vec<InetAddress> {
        self.interfaces
            .iter()
            .filter(|i| self.pivot_ttl > 0 && i.ttl == self.pivot_ttl - 1)
            .map(|i| i.ip)
            .collect()
    }

    pub fn has_complete_route(&self) -> bool {
        !self.route.is_empty() && self.route.iter().all(|hop| !hop.is_missing())
    }

    /// Replace the leading `old` hops by `new` when the route starts with
    /// exactly `old`. Returns true when the route was rewritten.
    pub fn transplant_route(&mut self, old: &[InetAddress], new: &[InetAddress]) -> bool {
        if old.is_empty() || self.route.len() < old.len() || &self.route[..old.len()] != old {
            return false;
        }
        let mut rewritten = Vec::with_capacity(new.len() + self.route.len() - old.len());
        rewritten.extend_from_slice(new);
        rewritten.extend_from_slice(&self.route[old.len()..]);
        self.route = rewritten;
        true
    }
}

impl fmt::Display for SubnetSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    fn site(prefix: &str, len: u8, pivot_ttl: u8, ifaces: &[(&str, u8)]) -> SubnetSite {
        let interfaces = ifaces
            .iter()
            .map(|(s, t)| SubnetInterface { ip: ip(s), ttl: *t })
            .collect();
        SubnetSite::new(
            ip(prefix),
            len,
            SubnetStatus::Accurate,
            pivot_ttl,
            interfaces,
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_interface_outside_prefix_is_rejected() {
        let err = SubnetSite::new(
            ip("10.0.0.0"),
            24,
            SubnetStatus::Accurate,
            5,
            vec![SubnetInterface { ip: ip("10.0.1.1"), ttl: 5 }],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::InvariantViolation { .. }));
    }

    #[test]
    fn test_pivot_derivation() {
        let s = site("10.0.0.0", 24, 5, &[("10.0.0.254", 4), ("10.0.0.1", 5)]);
        assert_eq!(s.pivot_ip(), ip("10.0.0.1"));
        assert_eq!(s.ingress_interfaces(), vec![ip("10.0.0.254")]);
    }

    #[test]
    fn test_absorb_interfaces_unions_by_ip() {
        let mut a = site("10.0.0.0", 23, 5, &[("10.0.0.129", 5)]);
        let b = site("10.0.0.0", 24, 5, &[("10.0.0.1", 5), ("10.0.0.129", 5)]);
        a.absorb_interfaces(&b);
        let ips: Vec<_> = a.interfaces().iter().map(|i| i.ip).collect();
        assert_eq!(ips, vec![ip("10.0.0.1"), ip("10.0.0.129")]);
    }

    #[test]
    fn test_containment_predicates() {
        let wide = site("10.0.0.0", 23, 5, &[]);
        let narrow = site("10.0.0.0", 24, 5, &[]);
        assert!(wide.encompasses(&narrow));
        assert!(!narrow.encompasses(&wide));
        assert!(wide.covers(&narrow));
        assert!(wide.covers(&wide.clone()));
        assert!(!narrow.covers(&wide));
    }

    #[test]
    fn test_transplant_route() {
        let mut s = site("10.0.0.0", 24, 4, &[]);
        s.route = vec![ip("1.0.0.1"), ip("2.0.0.1"), ip("3.0.0.1")];
        assert!(s.transplant_route(&[ip("1.0.0.1")], &[ip("9.0.0.1")]));
        assert_eq!(s.route, vec![ip("9.0.0.1"), ip("2.0.0.1"), ip("3.0.0.1")]);
        // Route no longer starts with the old prefix: second call is a no-op.
        assert!(!s.transplant_route(&[ip("1.0.0.1")], &[ip("9.0.0.1")]));
    }

    #[test]
    fn test_complete_route() {
        let mut s = site("10.0.0.0", 24, 3, &[]);
        s.route = vec![ip("1.0.0.1"), InetAddress::MISSING];
        assert!(!s.has_complete_route());
        s.route = vec![ip("1.0.0.1"), ip("2.0.0.1")];
        assert!(s.has_complete_route());
    }
}
