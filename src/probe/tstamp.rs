//! ICMP timestamp request/reply (types 13/14). pnet has no builder for
//! these, so the 20-byte message is laid out by hand.

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;

use crate::net::InetAddress;

const TIMESTAMP_REQUEST: u8 = 13;
const TIMESTAMP_REPLY: u8 = 14;
/// 8-byte ICMP header + originate/receive/transmit timestamps.
pub const TIMESTAMP_MSG_SIZE: usize = 20;

/// Build an ICMP timestamp request. `originate` is milliseconds since
/// midnight UTC, as RFC 792 wants.
pub fn build_timestamp_request(identifier: u16, sequence: u16, originate: u32) -> Vec<u8> {
    let mut msg = vec![0u8; TIMESTAMP_MSG_SIZE];
    msg[0] = TIMESTAMP_REQUEST;
    msg[1] = 0;
    msg[4..6].copy_from_slice(&identifier.to_be_bytes());
    msg[6..8].copy_from_slice(&sequence.to_be_bytes());
    msg[8..12].copy_from_slice(&originate.to_be_bytes());
    let cksum = pnet::util::checksum(&msg, 1);
    msg[2..4].copy_from_slice(&cksum.to_be_bytes());
    msg
}

/// Timestamps carried by a reply, all in milliseconds since midnight UTC.
#[derive(Debug, Clone, Copy)]
pub struct TimestampReply {
    pub originate: u32,
    pub receive: u32,
    pub transmit: u32,
}

/// Parse a raw datagram as a timestamp reply from `target` matching
/// `(identifier, sequence)`.
pub fn parse_timestamp_reply(
    datagram: &[u8],
    target: InetAddress,
    identifier: u16,
    sequence: u16,
) -> Option<TimestampReply> {
    let ip = Ipv4Packet::new(datagram)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    if InetAddress::from(ip.get_source()) != target {
        return None;
    }
    let header_len = ip.get_header_length() as usize * 4;
    let msg = &datagram[header_len..];
    if msg.len() < TIMESTAMP_MSG_SIZE || msg[0] != TIMESTAMP_REPLY {
        return None;
    }
    let reply_id = u16::from_be_bytes([msg[4], msg[5]]);
    let reply_seq = u16::from_be_bytes([msg[6], msg[7]]);
    if reply_id != identifier || reply_seq != sequence {
        return None;
    }
    Some(TimestampReply {
        originate: u32::from_be_bytes([msg[8], msg[9], msg[10], msg[11]]),
        receive: u32::from_be_bytes([msg[12], msg[13], msg[14], msg[15]]),
        transmit: u32::from_be_bytes([msg[16], msg[17], msg[18], msg[19]]),
    })
}

/// Milliseconds since midnight UTC, for the originate field.
pub fn ms_since_midnight() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_millis() % 86_400_000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_timestamp_request_layout() {
        let msg = build_timestamp_request(321, 7, 1_000_000);
        assert_eq!(msg.len(), TIMESTAMP_MSG_SIZE);
        assert_eq!(msg[0], 13);
        assert_eq!(u16::from_be_bytes([msg[4], msg[5]]), 321);
        assert_eq!(u16::from_be_bytes([msg[6], msg[7]]), 7);
        assert_eq!(
            u32::from_be_bytes([msg[8], msg[9], msg[10], msg[11]]),
            1_000_000
        );
        // Checksum verifies: sum over the message with the stored checksum
        // must fold to zero, i.e. recomputing with it skipped reproduces it.
        let recomputed = pnet::util::checksum(&msg, 1);
        assert_eq!(recomputed.to_be_bytes(), [msg[2], msg[3]]);
    }
}
