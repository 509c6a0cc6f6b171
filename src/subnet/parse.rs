//! Parser for subnet record files.
//!
//! One record per block, blocks separated by blank lines:
//!
//! ```text
//! 10.0.0.0/24 ACCURATE 5
//! interfaces:
//! 10.0.0.254 4
//! 10.0.0.1 5
//! route:
//! 192.168.0.1 0.0.0.0 10.1.1.1
//! ```
//!
//! The route line lists one hop per TTL, `0.0.0.0` marking an unresponsive
//! hop. The format is exactly what [`crate::export::write_subnets`] emits,
//! so reports re-parse.

use ipnetwork::Ipv4Network;
use std::str::FromStr;

use crate::errors::TopologyError;
use crate::net::InetAddress;
use crate::subnet::site::{SubnetInterface, SubnetSite, SubnetStatus};

fn malformed(line: usize, reason: impl Into<String>) -> TopologyError {
    TopologyError::MalformedInput {
        line,
        reason: reason.into(),
    }
}

/// Parse a whole subnet file into sites, preserving record order.
pub fn parse_subnet_records(input: &str) -> Result<Vec<SubnetSite>, TopologyError> {
    let mut sites = Vec::new();
    let mut block: Vec<(usize, &str)> = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            if !block.is_empty() {
                sites.push(parse_record(&block)?);
                block.clear();
            }
            continue;
        }
        block.push((idx + 1, line));
    }
    if !block.is_empty() {
        sites.push(parse_record(&block)?);
    }

    Ok(sites)
}

fn parse_record(block: &[(usize, &str)]) -> Result<SubnetSite, TopologyError> {
    let (head_line, head) = block[0];
    let mut fields = head.split_whitespace();

    let cidr = fields
        .next()
        .ok_or_else(|| malformed(head_line, "missing CIDR prefix"))?;
    let network = Ipv4Network::from_str(cidr)
        .map_err(|e| malformed(head_line, format!("bad CIDR '{cidr}': {e}")))?;
    let prefix = InetAddress::from(network.network());
    let prefix_len = network.prefix();

    let status_token = fields
        .next()
        .ok_or_else(|| malformed(head_line, "missing status token"))?;
    let status = SubnetStatus::parse(status_token)
        .ok_or_else(|| malformed(head_line, format!("unknown status '{status_token}'")))?;

    let ttl_token = fields
        .next()
        .ok_or_else(|| malformed(head_line, "missing pivot TTL"))?;
    let pivot_ttl: u8 = ttl_token
        .parse()
        .map_err(|_| malformed(head_line, format!("bad pivot TTL '{ttl_token}'")))?;

    let mut interfaces = Vec::new();
    let mut route = Vec::new();
    let mut section = None;

    for &(line_no, line) in &block[1..] {
        match line {
            "interfaces:" => section = Some("interfaces"),
            "route:" => section = Some("route"),
            _ => match section {
                Some("interfaces") => {
                    let mut parts = line.split_whitespace();
                    let ip_tok = parts
                        .next()
                        .ok_or_else(|| malformed(line_no, "empty interface line"))?;
                    let ttl_tok = parts
                        .next()
                        .ok_or_else(|| malformed(line_no, "interface line missing TTL"))?;
                    let ip = ip_tok
                        .parse::<InetAddress>()
                        .map_err(|_| malformed(line_no, format!("bad interface ip '{ip_tok}'")))?;
                    let ttl = ttl_tok
                        .parse::<u8>()
                        .map_err(|_| malformed(line_no, format!("bad interface TTL '{ttl_tok}'")))?;
                    interfaces.push(SubnetInterface { ip, ttl });
                }
                Some("route") => {
                    for hop_tok in line.split_whitespace() {
                        let hop = hop_tok
                            .parse::<InetAddress>()
                            .map_err(|_| malformed(line_no, format!("bad route hop '{hop_tok}'")))?;
                        route.push(hop);
                    }
                }
                _ => return Err(malformed(line_no, "content before a section header")),
            },
        }
    }

    SubnetSite::new(prefix, prefix_len, status, pivot_ttl, interfaces, route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_record() {
        let input = "\
10.0.0.0/24 ACCURATE 5
interfaces:
10.0.0.254 4
10.0.0.1 5
route:
192.168.0.1 0.0.0.0 10.1.1.1
";
        let sites = parse_subnet_records(input).unwrap();
        assert_eq!(sites.len(), 1);
        let s = &sites[0];
        assert_eq!(s.to_string(), "10.0.0.0/24");
        assert_eq!(s.status, SubnetStatus::Accurate);
        assert_eq!(s.pivot_ttl, 5);
        assert_eq!(s.pivot_ip(), "10.0.0.1".parse().unwrap());
        assert_eq!(s.interfaces().len(), 2);
        assert_eq!(s.route.len(), 3);
        assert!(s.route[1].is_missing());
    }

    #[test]
    fn test_parse_multiple_records_and_comments() {
        let input = "\
# measured yesterday
10.0.0.0/24 ACCURATE 5
interfaces:
10.0.0.1 5
route:
192.168.0.1

10.0.2.0/25 SHADOW 6
interfaces:
10.0.2.3 6
route:
192.168.0.1 10.0.0.1
";
        let sites = parse_subnet_records(input).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[1].status, SubnetStatus::Shadow);
        assert_eq!(sites[1].route.len(), 2);
    }

    #[test]
    fn test_malformed_status_is_reported_with_line() {
        let input = "10.0.0.0/24 BOGUS 5\ninterfaces:\nroute:\n";
        let err = parse_subnet_records(input).unwrap_err();
        match err {
            TopologyError::MalformedInput { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_interface_outside_prefix_aborts() {
        let input = "\
10.0.0.0/24 ACCURATE 5
interfaces:
10.9.0.1 5
route:
192.168.0.1
";
        let err = parse_subnet_records(input).unwrap_err();
        assert!(matches!(err, TopologyError::InvariantViolation { .. }));
    }
}
