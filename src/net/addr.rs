use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A 32-bit IPv4 address with total order by integer value.
///
/// Route holes ("no response at this hop") are represented by the all-zero
/// address, see [`InetAddress::MISSING`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InetAddress(u32);

impl InetAddress {
    /// Marker for a missing route hop (0.0.0.0).
    pub const MISSING: InetAddress = InetAddress(0);

    pub fn new(value: u32) -> Self {
        InetAddress(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn octets(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn is_missing(self) -> bool {
        self.0 == 0
    }

    /// Mask down to the first `len` bits.
    pub fn prefix(self, len: u8) -> InetAddress {
        InetAddress(self.0 & prefix_mask(len))
    }

    /// True iff this address lies in `[prefix, prefix + 2^(32-len))`.
    pub fn is_within(self, prefix: InetAddress, len: u8) -> bool {
        self.prefix(len) == prefix.prefix(len)
    }

    /// Last address of the prefix block this address belongs to.
    pub fn block_end(self, len: u8) -> InetAddress {
        InetAddress(self.0 | !prefix_mask(len))
    }

    /// Top 20 bits, used as the subnet-map bucket key.
    pub fn top20(self) -> u32 {
        self.0 >> 12
    }
}

/// Netmask for a prefix length (0..=32).
pub fn prefix_mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - len.min(32))
    }
}

impl From<Ipv4Addr> for InetAddress {
    fn from(addr: Ipv4Addr) -> Self {
        InetAddress(u32::from(addr))
    }
}

impl From<InetAddress> for Ipv4Addr {
    fn from(addr: InetAddress) -> Self {
        Ipv4Addr::from(addr.0)
    }
}

impl fmt::Display for InetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv4Addr::from(self.0).fmt(f)
    }
}

impl FromStr for InetAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4Addr::from_str(s).map(InetAddress::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_order_by_integer_value() {
        assert!(ip("10.0.0.1") < ip("10.0.0.2"));
        assert!(ip("9.255.255.255") < ip("10.0.0.0"));
        assert!(ip("192.168.1.1") > ip("172.16.0.1"));
    }

    #[test]
    fn test_prefix_masking() {
        assert_eq!(ip("10.0.3.77").prefix(24), ip("10.0.3.0"));
        assert_eq!(ip("10.0.3.77").prefix(16), ip("10.0.0.0"));
        assert_eq!(ip("10.0.3.77").prefix(32), ip("10.0.3.77"));
        assert_eq!(ip("255.255.255.255").prefix(0), ip("0.0.0.0"));
    }

    #[test]
    fn test_containment() {
        assert!(ip("10.0.0.129").is_within(ip("10.0.0.0"), 24));
        assert!(ip("10.0.1.1").is_within(ip("10.0.0.0"), 23));
        assert!(!ip("10.0.2.1").is_within(ip("10.0.0.0"), 23));
        assert!(ip("10.0.0.255").is_within(ip("10.0.0.0"), 24));
        assert!(!ip("10.0.1.0").is_within(ip("10.0.0.0"), 24));
    }

    #[test]
    fn test_block_end() {
        assert_eq!(ip("10.0.0.7").block_end(24), ip("10.0.0.255"));
        assert_eq!(ip("10.0.0.7").block_end(30), ip("10.0.0.7"));
    }

    #[test]
    fn test_missing_marker() {
        assert!(InetAddress::MISSING.is_missing());
        assert!(ip("0.0.0.0").is_missing());
        assert!(!ip("0.0.0.1").is_missing());
    }

    #[test]
    fn test_top20_shared_by_24_block() {
        assert_eq!(ip("10.0.3.1").top20(), ip("10.0.3.254").top20());
        assert_ne!(ip("10.0.3.1").top20(), ip("10.0.16.1").top20());
    }

    #[test]
    fn test_display_roundtrip() {
        let a = ip("172.16.254.3");
        assert_eq!(a.to_string(), "172.16.254.3");
        assert_eq!(a.to_string().parse::<InetAddress>().unwrap(), a);
    }
}
