//! ICMP echo probes with a controlled IP header, used for IP-ID collection.
//!
//! The probe's own IPv4 identification field is set to a known value so
//! that routers echoing the probe's IP-ID back (instead of stamping their
//! own counter) can be told apart.

use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes, checksum, echo_reply::EchoReplyPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
use pnet::packet::Packet;
use std::net::Ipv4Addr;

use crate::net::InetAddress;

pub const IPV4_HEADER_SIZE: usize = 20;
pub const ICMP_HEADER_SIZE: usize = 8;
/// Probe payload: enough to carry a recognizable pattern.
pub const ECHO_PAYLOAD_SIZE: usize = 8;

/// Process identifier for the ICMP identification field.
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build a full IPv4 + ICMP echo request datagram with `ip_id` in the IP
/// identification field, for a header-included raw socket.
pub fn build_echo_probe(
    source: Ipv4Addr,
    target: InetAddress,
    ip_id: u16,
    identifier: u16,
    sequence: u16,
) -> Vec<u8> {
    let total = IPV4_HEADER_SIZE + ICMP_HEADER_SIZE + ECHO_PAYLOAD_SIZE;
    let mut buffer = vec![0u8; total];

    {
        let mut icmp =
            MutableEchoRequestPacket::new(&mut buffer[IPV4_HEADER_SIZE..]).expect("sized buffer");
        icmp.set_icmp_type(IcmpTypes::EchoRequest);
        icmp.set_icmp_code(IcmpCode::new(0));
        icmp.set_identifier(identifier);
        icmp.set_sequence_number(sequence);
        for (i, byte) in icmp.payload_mut().iter_mut().enumerate() {
            *byte = (i & 0xFF) as u8;
        }
        let cksum = checksum(&IcmpPacket::new(icmp.packet()).expect("sized buffer"));
        let mut icmp =
            MutableEchoRequestPacket::new(&mut buffer[IPV4_HEADER_SIZE..]).expect("sized buffer");
        icmp.set_checksum(cksum);
    }

    let mut ip = MutableIpv4Packet::new(&mut buffer).expect("sized buffer");
    ip.set_version(4);
    ip.set_header_length((IPV4_HEADER_SIZE / 4) as u8);
    ip.set_total_length(total as u16);
    ip.set_identification(ip_id);
    ip.set_ttl(64);
    ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    ip.set_source(source);
    ip.set_destination(Ipv4Addr::from(target));
    let ip_cksum = pnet::packet::ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(ip_cksum);

    buffer
}

/// An echo reply matched to one of our probes.
#[derive(Debug, Clone, Copy)]
pub struct EchoReply {
    pub from: InetAddress,
    /// Identification field of the reply's own IP header.
    pub ip_id: u16,
}

/// Parse a raw datagram as an echo reply to the probe identified by
/// `(identifier, sequence)` sent to `target`. Returns `None` for unrelated
/// traffic.
pub fn parse_echo_reply(
    datagram: &[u8],
    target: InetAddress,
    identifier: u16,
    sequence: u16,
) -> Option<EchoReply> {
    let ip = Ipv4Packet::new(datagram)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let from = InetAddress::from(ip.get_source());
    if from != target {
        return None;
    }
    let header_len = ip.get_header_length() as usize * 4;
    let reply = EchoReplyPacket::new(&datagram[header_len..])?;
    if reply.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }
    if reply.get_identifier() != identifier || reply.get_sequence_number() != sequence {
        return None;
    }
    Some(EchoReply {
        from,
        ip_id: ip.get_identification(),
    })
}
