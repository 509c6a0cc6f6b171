//! Per-neighborhood alias resolution.
//!
//! Candidates (neighborhood labels and contra-pivots of child subnets) are
//! partitioned into disjoint routers. Pairwise evidence runs first — UDP
//! unreachable reply-source matching, IP-ID velocity compatibility,
//! reverse-DNS naming — then interfaces left over are grouped by their
//! counter class and timestamp fingerprint. Every interface lands in at
//! most one router, tagged with the method that first grouped it.

use crate::alias::router::{AliasMethod, Router};
use crate::net::InetAddress;
use crate::state::{IpEntry, IpIdCounter, IpTable};

/// Widening factor applied to velocity ranges before testing overlap.
const VELOCITY_TOLERANCE: f64 = 0.3;

pub struct AliasResolver<'a> {
    table: &'a IpTable,
}

impl<'a> AliasResolver<'a> {
    pub fn new(table: &'a IpTable) -> Self {
        AliasResolver { table }
    }

    /// Partition the candidates of one neighborhood into routers.
    pub fn resolve_neighborhood(&self, candidates: &[InetAddress]) -> Vec<Router> {
        let mut ips: Vec<InetAddress> = candidates.to_vec();
        ips.sort();
        ips.dedup();
        let n = ips.len();
        if n == 0 {
            return Vec::new();
        }

        let entries: Vec<Option<IpEntry>> = ips
            .iter()
            .map(|&ip| self.table.lookup(ip).map(|e| e.read().clone()))
            .collect();

        let mut groups = Grouping::new(n);

        // (i) UDP unreachable reply-source matching. A reply from another
        // candidate welds the two; a reply from an unseen interface makes
        // the candidate a credible single-interface router on its own.
        let mut udp_standalone = vec![false; n];
        for i in 0..n {
            let Some(entry) = &entries[i] else { continue };
            let Some(src) = entry.udp_reply_src else {
                continue;
            };
            match ips.binary_search(&src) {
                Ok(j) if j != i => groups.join(i, j, AliasMethod::UdpPortUnreachable),
                _ => udp_standalone[i] = true,
            }
        }

        // (ii) IP-ID counter compatibility among healthy counters.
        for i in 0..n {
            for j in (i + 1)..n {
                let (Some(a), Some(b)) = (&entries[i], &entries[j]) else {
                    continue;
                };
                if velocity_compatible(a, b) {
                    groups.join(i, j, AliasMethod::IpIdBased);
                }
            }
        }

        // (iii) Reverse-DNS naming: same domain, different host label.
        for i in 0..n {
            for j in (i + 1)..n {
                let (Some(a), Some(b)) = (&entries[i], &entries[j]) else {
                    continue;
                };
                let (Some(ha), Some(hb)) = (&a.hostname, &b.hostname) else {
                    continue;
                };
                if dns_similar(ha, hb) {
                    groups.join(i, j, AliasMethod::ReverseDns);
                }
            }
        }

        // (iv) Fingerprint grouping for interfaces still alone: echo and
        // random counters group among themselves when their timestamp
        // fingerprint agrees; interfaces with no usable counter but a
        // positive timestamp fingerprint fall into the reserved group.
        let mut echo_groups: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        let mut random_groups: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        let mut reserved_group: Vec<usize> = Vec::new();
        for i in 0..n {
            if !groups.is_singleton(i) || udp_standalone[i] {
                continue;
            }
            let Some(entry) = &entries[i] else { continue };
            let fp = entry.replies_timestamp as usize;
            match entry.counter {
                IpIdCounter::Echo => echo_groups[fp].push(i),
                IpIdCounter::Random => random_groups[fp].push(i),
                IpIdCounter::Unknown if entry.replies_timestamp => reserved_group.push(i),
                _ => {}
            }
        }
        for bucket in echo_groups.iter().filter(|b| b.len() >= 2) {
            groups.join_all(bucket, AliasMethod::GroupEcho);
        }
        for bucket in random_groups.iter().filter(|b| b.len() >= 2) {
            groups.join_all(bucket, AliasMethod::GroupRandom);
        }
        if reserved_group.len() >= 2 {
            groups.join_all(&reserved_group, AliasMethod::GroupReserved);
        }

        // Materialize: multi-interface components, plus single-interface
        // routers backed by a UDP reply mismatch.
        let mut routers = Vec::new();
        for component in groups.components() {
            if component.len() < 2 {
                continue;
            }
            let mut router = Router::new();
            for &i in &component {
                let method = groups.method(i).expect("grouped interface carries a method");
                router.add_interface(ips[i], method);
            }
            routers.push(router);
        }
        for i in 0..n {
            if udp_standalone[i] && groups.is_singleton(i) {
                let mut router = Router::new();
                router.add_interface(ips[i], AliasMethod::UdpPortUnreachable);
                routers.push(router);
            }
        }

        routers.sort_by_key(|r| r.interfaces().first().map(|i| i.ip));
        routers
    }
}

/// Union-find over candidate indices, remembering for each interface the
/// method that first grouped it.
struct Grouping {
    parent: Vec<usize>,
    method: Vec<Option<AliasMethod>>,
}

impl Grouping {
    fn new(n: usize) -> Self {
        Grouping {
            parent: (0..n).collect(),
            method: vec![None; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn join(&mut self, i: usize, j: usize, method: AliasMethod) {
        let (ri, rj) = (self.find(i), self.find(j));
        if ri != rj {
            self.parent[rj] = ri;
            self.method[i].get_or_insert(method);
            self.method[j].get_or_insert(method);
        }
    }

    fn join_all(&mut self, members: &[usize], method: AliasMethod) {
        for window in members.windows(2) {
            self.join(window[0], window[1], method);
        }
    }

    fn is_singleton(&mut self, i: usize) -> bool {
        let root = self.find(i);
        (0..self.parent.len()).all(|j| j == i || self.find(j) != root)
    }

    fn method(&self, i: usize) -> Option<AliasMethod> {
        self.method[i]
    }

    fn components(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut by_root: std::collections::HashMap<usize, Vec<usize>> =
            std::collections::HashMap::new();
        for i in 0..n {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        let mut components: Vec<Vec<usize>> = by_root.into_values().collect();
        components.sort_by_key(|c| c[0]);
        components
    }
}

/// Two healthy counters alias when their velocity ranges overlap after
/// widening by the tolerance factor.
fn velocity_compatible(a: &IpEntry, b: &IpEntry) -> bool {
    if a.counter != IpIdCounter::Healthy || b.counter != IpIdCounter::Healthy {
        return false;
    }
    let (Some((amin, amax)), Some((bmin, bmax))) = (a.velocity, b.velocity) else {
        return false;
    };
    let (alo, ahi) = (amin * (1.0 - VELOCITY_TOLERANCE), amax * (1.0 + VELOCITY_TOLERANCE));
    let (blo, bhi) = (bmin * (1.0 - VELOCITY_TOLERANCE), bmax * (1.0 + VELOCITY_TOLERANCE));
    alo <= bhi && blo <= ahi
}

/// Same domain, different host: `core1.ams.example.net` and
/// `core2.ams.example.net` are similar; equal names or different domains
/// are not.
fn dns_similar(a: &str, b: &str) -> bool {
    if a == b {
        return false;
    }
    let (Some((_, domain_a)), Some((_, domain_b))) = (a.split_once('.'), b.split_once('.')) else {
        return false;
    };
    !domain_a.is_empty() && domain_a.eq_ignore_ascii_case(domain_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    fn healthy(table: &IpTable, addr: &str, vmin: f64, vmax: f64) {
        let entry = table.create(ip(addr), 3);
        let mut e = entry.write();
        e.counter = IpIdCounter::Healthy;
        e.velocity = Some((vmin, vmax));
    }

    #[test]
    fn test_udp_reply_source_welds_candidates() {
        let table = IpTable::new();
        table
            .create(ip("10.0.0.1"), 3)
            .write()
            .udp_reply_src = Some(ip("10.0.0.2"));
        table.create(ip("10.0.0.2"), 3);

        let resolver = AliasResolver::new(&table);
        let routers = resolver.resolve_neighborhood(&[ip("10.0.0.1"), ip("10.0.0.2")]);
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].to_string(), "10.0.0.1 10.0.0.2");
        assert!(routers[0]
            .interfaces()
            .iter()
            .all(|i| i.method == AliasMethod::UdpPortUnreachable));
    }

    #[test]
    fn test_udp_mismatch_standalone_router() {
        let table = IpTable::new();
        table
            .create(ip("10.0.0.1"), 3)
            .write()
            .udp_reply_src = Some(ip("172.16.0.9"));

        let resolver = AliasResolver::new(&table);
        let routers = resolver.resolve_neighborhood(&[ip("10.0.0.1")]);
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].interface_count(), 1);
        assert!(routers[0].is_credible());
    }

    #[test]
    fn test_velocity_compatibility_groups_healthy_counters() {
        let table = IpTable::new();
        healthy(&table, "10.0.0.1", 900.0, 1100.0);
        healthy(&table, "10.0.0.2", 1000.0, 1200.0);
        healthy(&table, "10.0.0.3", 90_000.0, 95_000.0); // far away

        let resolver = AliasResolver::new(&table);
        let routers = resolver.resolve_neighborhood(&[
            ip("10.0.0.1"),
            ip("10.0.0.2"),
            ip("10.0.0.3"),
        ]);
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].to_string(), "10.0.0.1 10.0.0.2");
        assert_eq!(routers[0].interfaces()[0].method, AliasMethod::IpIdBased);
    }

    #[test]
    fn test_dns_similarity() {
        let table = IpTable::new();
        table.create(ip("10.0.0.1"), 3).write().hostname =
            Some("core1.ams.example.net".into());
        table.create(ip("10.0.0.2"), 3).write().hostname =
            Some("core2.ams.example.net".into());
        table.create(ip("10.0.0.3"), 3).write().hostname =
            Some("edge.other.org".into());

        let resolver = AliasResolver::new(&table);
        let routers = resolver.resolve_neighborhood(&[
            ip("10.0.0.1"),
            ip("10.0.0.2"),
            ip("10.0.0.3"),
        ]);
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].to_string(), "10.0.0.1 10.0.0.2");
        assert_eq!(routers[0].interfaces()[0].method, AliasMethod::ReverseDns);
    }

    #[test]
    fn test_echo_group_respects_fingerprint() {
        let table = IpTable::new();
        for (addr, ts) in [
            ("10.0.0.1", true),
            ("10.0.0.2", true),
            ("10.0.0.3", false),
        ] {
            let entry = table.create(ip(addr), 3);
            let mut e = entry.write();
            e.counter = IpIdCounter::Echo;
            e.replies_timestamp = ts;
        }

        let resolver = AliasResolver::new(&table);
        let routers = resolver.resolve_neighborhood(&[
            ip("10.0.0.1"),
            ip("10.0.0.2"),
            ip("10.0.0.3"),
        ]);
        // Only the two timestamp-replying echoes group; the third has a
        // different fingerprint and stays out.
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].to_string(), "10.0.0.1 10.0.0.2");
        assert_eq!(routers[0].interfaces()[0].method, AliasMethod::GroupEcho);
    }

    #[test]
    fn test_reserved_group() {
        let table = IpTable::new();
        for addr in ["10.0.0.1", "10.0.0.2"] {
            table.create(ip(addr), 3).write().replies_timestamp = true;
        }

        let resolver = AliasResolver::new(&table);
        let routers = resolver.resolve_neighborhood(&[ip("10.0.0.1"), ip("10.0.0.2")]);
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].interfaces()[0].method, AliasMethod::GroupReserved);
    }

    #[test]
    fn test_no_interface_in_two_routers() {
        // An interface with both healthy-velocity and DNS evidence must not
        // be emitted twice.
        let table = IpTable::new();
        healthy(&table, "10.0.0.1", 900.0, 1100.0);
        healthy(&table, "10.0.0.2", 1000.0, 1200.0);
        table.lookup(ip("10.0.0.1")).unwrap().write().hostname =
            Some("r1.pop.example.net".into());
        table.lookup(ip("10.0.0.2")).unwrap().write().hostname =
            Some("r2.pop.example.net".into());

        let resolver = AliasResolver::new(&table);
        let routers =
            resolver.resolve_neighborhood(&[ip("10.0.0.1"), ip("10.0.0.2")]);

        let mut seen = HashSet::new();
        for router in &routers {
            for itf in router.interfaces() {
                assert!(seen.insert(itf.ip), "{} appears twice", itf.ip);
            }
        }
        assert_eq!(routers.len(), 1);
        // First evidence wins the method tag.
        assert_eq!(routers[0].interfaces()[0].method, AliasMethod::IpIdBased);
    }

    #[test]
    fn test_unresponsive_candidates_stay_ungrouped() {
        let table = IpTable::new();
        table.create(ip("10.0.0.1"), 3);
        table.create(ip("10.0.0.2"), 3);

        let resolver = AliasResolver::new(&table);
        assert!(resolver
            .resolve_neighborhood(&[ip("10.0.0.1"), ip("10.0.0.2")])
            .is_empty());
    }
}
