//! UDP probes to a high, presumably closed port. A well-behaved router
//! answers with ICMP destination unreachable (port unreachable), and some
//! devices answer from a different interface than the probed one; that
//! mismatch is first-class alias evidence.

use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;

use crate::net::InetAddress;

/// Payload carried by unreachable-port probes.
pub const UDP_PROBE_PAYLOAD: usize = 12;
const ICMP_PORT_UNREACHABLE_CODE: u8 = 3;

/// Build the probe payload: a recognizable tag plus the source port, so the
/// quoted datagram in the ICMP error can be matched back.
pub fn build_udp_probe_payload(src_port: u16) -> Vec<u8> {
    let mut payload = vec![0u8; UDP_PROBE_PAYLOAD];
    payload[0..4].copy_from_slice(b"cnpy");
    payload[4..6].copy_from_slice(&src_port.to_be_bytes());
    for (i, byte) in payload[6..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }
    payload
}

/// A port-unreachable reply correlated to one of our UDP probes.
#[derive(Debug, Clone, Copy)]
pub struct UnreachableReply {
    /// Interface the reply came from; may differ from the probed address.
    pub reply_from: InetAddress,
}

/// Parse a raw datagram as an ICMP port unreachable quoting a probe we sent
/// to `target` from a source port inside `[src_lo, src_hi]`.
pub fn parse_port_unreachable(
    datagram: &[u8],
    target: InetAddress,
    src_lo: u16,
    src_hi: u16,
) -> Option<UnreachableReply> {
    let ip = Ipv4Packet::new(datagram)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let reply_from = InetAddress::from(ip.get_source());

    let header_len = ip.get_header_length() as usize * 4;
    let icmp = IcmpPacket::new(&datagram[header_len..])?;
    if icmp.get_icmp_type() != IcmpTypes::DestinationUnreachable
        || icmp.get_icmp_code().0 != ICMP_PORT_UNREACHABLE_CODE
    {
        return None;
    }

    // The error quotes the original IP header + 8 bytes of UDP header;
    // the payload starts after 4 unused bytes.
    let quoted = &icmp.packet()[ICMP_UNREACHABLE_HEADER..];
    let inner = Ipv4Packet::new(quoted)?;
    if inner.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    if InetAddress::from(inner.get_destination()) != target {
        return None;
    }
    let inner_header_len = inner.get_header_length() as usize * 4;
    let udp = &quoted[inner_header_len..];
    if udp.len() < 4 {
        return None;
    }
    let src_port = u16::from_be_bytes([udp[0], udp[1]]);
    if src_port < src_lo || src_port > src_hi {
        return None;
    }

    Some(UnreachableReply { reply_from })
}

/// ICMP type/code/checksum plus the 4 unused bytes before the quoted
/// datagram.
const ICMP_UNREACHABLE_HEADER: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    /// Hand-assemble an ICMP port-unreachable datagram quoting a UDP probe.
    fn craft_unreachable(reply_src: &str, probed: &str, src_port: u16) -> Vec<u8> {
        let quoted_udp: [u8; 8] = {
            let mut h = [0u8; 8];
            h[0..2].copy_from_slice(&src_port.to_be_bytes());
            h[2..4].copy_from_slice(&33434u16.to_be_bytes());
            h[4..6].copy_from_slice(&16u16.to_be_bytes());
            h
        };

        // Quoted IPv4 header for the original probe.
        let mut inner = vec![0u8; 20];
        inner[0] = 0x45;
        inner[9] = 17; // UDP
        inner[12..16].copy_from_slice(&ip("192.168.0.2").octets());
        inner[16..20].copy_from_slice(&ip(probed).octets());

        // ICMP error: type 3 code 3, 4 unused bytes, quoted datagram.
        let mut icmp = vec![3u8, 3, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&inner);
        icmp.extend_from_slice(&quoted_udp);
        let cksum = pnet::util::checksum(&icmp, 1);
        icmp[2..4].copy_from_slice(&cksum.to_be_bytes());

        // Outer IPv4 header from the replying interface.
        let mut outer = vec![0u8; 20];
        outer[0] = 0x45;
        outer[2..4].copy_from_slice(&((20 + icmp.len()) as u16).to_be_bytes());
        outer[9] = 1; // ICMP
        outer[12..16].copy_from_slice(&ip(reply_src).octets());
        outer[16..20].copy_from_slice(&ip("192.168.0.2").octets());
        outer.extend_from_slice(&icmp);
        outer
    }

    #[test]
    fn test_parse_port_unreachable_with_mismatched_source() {
        let datagram = craft_unreachable("10.0.0.254", "10.0.0.1", 40_100);
        let reply = parse_port_unreachable(&datagram, ip("10.0.0.1"), 40_000, 40_199).unwrap();
        assert_eq!(reply.reply_from, ip("10.0.0.254"));
    }

    #[test]
    fn test_parse_rejects_foreign_probe() {
        // Source port outside our band: some other process's probe.
        let datagram = craft_unreachable("10.0.0.254", "10.0.0.1", 50_000);
        assert!(parse_port_unreachable(&datagram, ip("10.0.0.1"), 40_000, 40_199).is_none());
        // Quoted destination is not the probed target.
        let datagram = craft_unreachable("10.0.0.254", "10.0.0.9", 40_100);
        assert!(parse_port_unreachable(&datagram, ip("10.0.0.1"), 40_000, 40_199).is_none());
    }
}
