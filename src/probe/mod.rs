//! Probing primitives behind the [`ProbeDriver`] seam.
//!
//! The hint collector schedules workers; the driver does the wire work. A
//! driver call has a fixed wait budget and absorbs every recoverable
//! condition into `None` — timeouts, unrelated traffic, resolver failures
//! never cross the worker boundary as errors.

pub mod icmp;
pub mod socket;
pub mod tstamp;
pub mod udp;

pub use icmp::*;
pub use socket::*;
pub use tstamp::*;
pub use udp::*;

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::lookup::DnsLookup;
use crate::net::InetAddress;

/// Result of one IP-ID probe.
#[derive(Debug, Clone, Copy)]
pub struct IpIdProbeResult {
    pub ip_id: u16,
    /// The reply carried the probe's own IP-ID back.
    pub echoed: bool,
}

/// The wire-level operations the alias hint collector consumes.
#[async_trait]
pub trait ProbeDriver: Send + Sync {
    /// Send one echo probe and read the reply's IP-ID. `sequence`
    /// distinguishes concurrent probes of one run.
    async fn ip_id_probe(&self, target: InetAddress, sequence: u16) -> Option<IpIdProbeResult>;

    /// UDP probe to a presumably closed port, sourced from a port inside
    /// the worker's `[lo, hi]` band; returns the unreachable-reply source.
    async fn udp_port_unreachable(
        &self,
        target: InetAddress,
        src_ports: (u16, u16),
    ) -> Option<UnreachableReply>;

    /// ICMP timestamp request.
    async fn timestamp_request(
        &self,
        target: InetAddress,
        sequence: u16,
    ) -> Option<TimestampReply>;

    /// Reverse DNS.
    async fn reverse_lookup(&self, target: InetAddress) -> Option<String>;
}

/// Driver doing real raw-socket I/O. Blocking socket work runs on the
/// blocking pool; one short-lived socket per probe keeps workers isolated.
pub struct RawSockDriver {
    identifier: u16,
    timeout: Duration,
    dst_port: u16,
    dns: DnsLookup,
}

impl RawSockDriver {
    pub fn new(timeout: Duration, dst_port: u16) -> Self {
        RawSockDriver {
            identifier: get_identifier(),
            timeout,
            dst_port,
            dns: DnsLookup::new(),
        }
    }
}

#[async_trait]
impl ProbeDriver for RawSockDriver {
    async fn ip_id_probe(&self, target: InetAddress, sequence: u16) -> Option<IpIdProbeResult> {
        let identifier = self.identifier;
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            let send_socket = create_header_included_socket().ok()?;
            let recv_socket = create_raw_icmp_socket().ok()?;

            let source = local_addr_towards(target);
            // Tag the probe's own IP-ID so an echoing counter is detectable.
            let probe_ip_id = 0x8000 | (sequence & 0x7FFF);
            let packet = build_echo_probe(source, target, probe_ip_id, identifier, sequence);
            send_to(&send_socket, &packet, target).ok()?;

            let deadline = Instant::now() + timeout;
            let mut buffer = [0u8; 1500];
            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                if remaining.is_zero() {
                    break;
                }
                recv_socket.set_read_timeout(Some(remaining)).ok()?;
                let Ok((len, _)) = recv_from(&recv_socket, &mut buffer) else {
                    break;
                };
                if let Some(reply) = parse_echo_reply(&buffer[..len], target, identifier, sequence)
                {
                    return Some(IpIdProbeResult {
                        ip_id: reply.ip_id,
                        echoed: reply.ip_id == probe_ip_id,
                    });
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    async fn udp_port_unreachable(
        &self,
        target: InetAddress,
        src_ports: (u16, u16),
    ) -> Option<UnreachableReply> {
        let timeout = self.timeout;
        let dst_port = self.dst_port;
        tokio::task::spawn_blocking(move || {
            let (src_lo, src_hi) = src_ports;
            let udp_socket = create_udp_probe_socket(src_lo).ok()?;
            let recv_socket = create_raw_icmp_socket().ok()?;

            let payload = build_udp_probe_payload(src_lo);
            send_udp_to(&udp_socket, &payload, target, dst_port).ok()?;

            let deadline = Instant::now() + timeout;
            let mut buffer = [0u8; 1500];
            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                if remaining.is_zero() {
                    break;
                }
                recv_socket.set_read_timeout(Some(remaining)).ok()?;
                let Ok((len, _)) = recv_from(&recv_socket, &mut buffer) else {
                    break;
                };
                if let Some(reply) = parse_port_unreachable(&buffer[..len], target, src_lo, src_hi)
                {
                    return Some(reply);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    async fn timestamp_request(
        &self,
        target: InetAddress,
        sequence: u16,
    ) -> Option<TimestampReply> {
        let identifier = self.identifier;
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            let socket = create_raw_icmp_socket().ok()?;
            let request = build_timestamp_request(identifier, sequence, ms_since_midnight());
            send_to(&socket, &request, target).ok()?;

            let deadline = Instant::now() + timeout;
            let mut buffer = [0u8; 1500];
            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                if remaining.is_zero() {
                    break;
                }
                socket.set_read_timeout(Some(remaining)).ok()?;
                let Ok((len, _)) = recv_from(&socket, &mut buffer) else {
                    break;
                };
                if let Some(reply) =
                    parse_timestamp_reply(&buffer[..len], target, identifier, sequence)
                {
                    return Some(reply);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    async fn reverse_lookup(&self, target: InetAddress) -> Option<String> {
        self.dns.reverse_lookup(target).await
    }
}
