use anyhow::{Result, anyhow};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::errors::TopologyError;
use crate::net::InetAddress;

/// Check raw-socket permissions early; alias probing cannot run without
/// them.
pub fn check_permissions() -> Result<(), TopologyError> {
    if create_raw_icmp_socket().is_ok() {
        return Ok(());
    }

    let binary_path = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "canopy".to_string());

    Err(TopologyError::ProbeUnavailable(format!(
        "insufficient permissions for raw sockets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {binary_path}"
    )))
}

/// Raw ICMP socket; receives full IP datagrams including the header, which
/// is where the reply IP-ID lives.
pub fn create_raw_icmp_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    Ok(socket)
}

/// Raw socket with `IP_HDRINCL`: the caller crafts the IPv4 header, giving
/// control over the probe's own IP-ID.
pub fn create_header_included_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_header_included_v4(true)?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// UDP socket bound to a given source port, used for unreachable-port
/// probes. Source ports are partitioned per worker, so binding never races.
pub fn create_udp_probe_socket(src_port: u16) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(false)?;
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, src_port));
    socket.bind(&SockAddr::from(bind_addr))?;
    Ok(socket)
}

pub fn send_to(socket: &Socket, packet: &[u8], target: InetAddress) -> Result<usize> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(target), 0));
    Ok(socket.send_to(packet, &SockAddr::from(addr))?)
}

pub fn send_udp_to(
    socket: &Socket,
    payload: &[u8],
    target: InetAddress,
    dst_port: u16,
) -> Result<usize> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(target), dst_port));
    Ok(socket.send_to(payload, &SockAddr::from(addr))?)
}

/// Receive one datagram; returns the length and the source address.
pub fn recv_from(socket: &Socket, buffer: &mut [u8]) -> Result<(usize, InetAddress)> {
    let uninit_buf: &mut [MaybeUninit<u8>] = unsafe {
        std::slice::from_raw_parts_mut(buffer.as_mut_ptr() as *mut MaybeUninit<u8>, buffer.len())
    };
    let (len, addr) = socket.recv_from(uninit_buf)?;
    let ip = addr
        .as_socket_ipv4()
        .map(|s| InetAddress::from(*s.ip()))
        .ok_or_else(|| anyhow!("non-IPv4 source address"))?;
    Ok((len, ip))
}

/// Local IPv4 address the kernel would route toward `target`; fills the
/// source field of hand-built IP headers.
pub fn local_addr_towards(target: InetAddress) -> Ipv4Addr {
    let fallback = Ipv4Addr::UNSPECIFIED;
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return fallback;
    };
    if socket
        .connect(SocketAddrV4::new(Ipv4Addr::from(target), 53))
        .is_err()
    {
        return fallback;
    }
    match socket.local_addr() {
        Ok(SocketAddr::V4(addr)) => *addr.ip(),
        _ => fallback,
    }
}
