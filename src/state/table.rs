//! Shared per-IP probing state.
//!
//! The table maps every mentioned interface address to its probing record.
//! Entries are created on first mention (by the hint collector or the tree)
//! and are never deleted during a run. Each collector phase dispatches at
//! most one worker per address, so a worker holds the only writer to its
//! entry while a phase is running.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::net::InetAddress;

/// Classification of the IP-ID counter behavior observed on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpIdCounter {
    #[default]
    Unknown,
    /// Monotonic counter with a usable velocity; alias candidate via Ally-style tests.
    Healthy,
    /// Gaps too erratic to carry alias evidence.
    Random,
    /// The interface echoes the probe's own IP-ID back.
    Echo,
    /// Counter moves too fast for offset comparison to mean anything.
    Fast,
}

/// Velocity above which a counter is useless for offset comparison (ids/s).
pub const FAST_VELOCITY: f64 = 10_000.0;
/// A wrapped gap larger than this between consecutive samples means the
/// counter is not behaving like a monotonic 16-bit counter.
pub const RANDOM_GAP: u16 = 20_000;

/// One IP-ID observation, tagged with the collector's probe token.
#[derive(Debug, Clone, Copy)]
pub struct IpIdSample {
    pub token: u64,
    pub seen_at: Instant,
    pub ip_id: u16,
    /// True when the reply carried the probe's own IP-ID.
    pub echoed: bool,
}

/// Probing record for a single interface address.
#[derive(Debug, Clone)]
pub struct IpEntry {
    pub addr: InetAddress,
    /// TTL at which this interface was observed to respond.
    pub ttl: u8,
    /// IP-ID samples in collection order.
    pub samples: Vec<IpIdSample>,
    pub counter: IpIdCounter,
    /// Estimated [min, max] counter velocity in ids/s, for Healthy counters.
    pub velocity: Option<(f64, f64)>,
    pub hostname: Option<String>,
    /// The interface answered an ICMP timestamp request.
    pub replies_timestamp: bool,
    /// The interface answered a UDP probe with an ICMP port unreachable.
    pub udp_unreachable: bool,
    /// Source of the unreachable reply when it differs from the probed address.
    pub udp_reply_src: Option<InetAddress>,
}

impl IpEntry {
    pub fn new(addr: InetAddress, ttl: u8) -> Self {
        IpEntry {
            addr,
            ttl,
            samples: Vec::new(),
            counter: IpIdCounter::Unknown,
            velocity: None,
            hostname: None,
            replies_timestamp: false,
            udp_unreachable: false,
            udp_reply_src: None,
        }
    }

    pub fn record_sample(&mut self, token: u64, ip_id: u16, echoed: bool) {
        self.samples.push(IpIdSample {
            token,
            seen_at: Instant::now(),
            ip_id,
            echoed,
        });
    }

    /// Classify the counter from the collected samples and derive the
    /// velocity range used by alias resolution. Called once at the end of
    /// the IP-ID collection phase for this address.
    pub fn classify_counter(&mut self) {
        if self.samples.len() < 2 {
            self.counter = IpIdCounter::Unknown;
            return;
        }

        if self.samples.iter().all(|s| s.echoed) {
            self.counter = IpIdCounter::Echo;
            return;
        }

        let mut vmin = f64::MAX;
        let mut vmax: f64 = 0.0;
        for pair in self.samples.windows(2) {
            let gap = pair[1].ip_id.wrapping_sub(pair[0].ip_id);
            if gap > RANDOM_GAP {
                self.counter = IpIdCounter::Random;
                return;
            }
            let dt = pair[1]
                .seen_at
                .duration_since(pair[0].seen_at)
                .as_secs_f64();
            if dt <= 0.0 {
                continue;
            }
            let v = gap as f64 / dt;
            vmin = vmin.min(v);
            vmax = vmax.max(v);
        }

        if vmax == 0.0 || vmin == f64::MAX {
            self.counter = IpIdCounter::Unknown;
        } else if vmax > FAST_VELOCITY {
            self.counter = IpIdCounter::Fast;
        } else {
            self.counter = IpIdCounter::Healthy;
            self.velocity = Some((vmin, vmax));
        }
    }
}

/// Handle to a single table entry; cloned into probe workers.
pub type EntryHandle = Arc<RwLock<IpEntry>>;

/// Table of all interface addresses seen during a run.
#[derive(Default)]
pub struct IpTable {
    entries: RwLock<HashMap<InetAddress, EntryHandle>>,
}

impl IpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, addr: InetAddress) -> Option<EntryHandle> {
        self.entries.read().get(&addr).cloned()
    }

    /// Return the entry for `addr`, creating it with the given TTL when absent.
    pub fn create(&self, addr: InetAddress, ttl: u8) -> EntryHandle {
        let mut entries = self.entries.write();
        entries
            .entry(addr)
            .or_insert_with(|| Arc::new(RwLock::new(IpEntry::new(addr, ttl))))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sorted copy of all addresses in the table.
    pub fn addresses(&self) -> Vec<InetAddress> {
        let mut addrs: Vec<InetAddress> = self.entries.read().keys().copied().collect();
        addrs.sort();
        addrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    fn sample(token: u64, base: Instant, offset_ms: u64, ip_id: u16, echoed: bool) -> IpIdSample {
        IpIdSample {
            token,
            seen_at: base + Duration::from_millis(offset_ms),
            ip_id,
            echoed,
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let table = IpTable::new();
        let a = table.create(ip("10.0.0.1"), 5);
        let b = table.create(ip("10.0.0.1"), 9);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.read().ttl, 5); // first creation wins
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_classify_healthy_counter() {
        let base = Instant::now();
        let mut entry = IpEntry::new(ip("10.0.0.1"), 5);
        // +100 ids per 100ms => 1000 ids/s
        entry.samples = vec![
            sample(1, base, 0, 100, false),
            sample(2, base, 100, 200, false),
            sample(3, base, 200, 300, false),
        ];
        entry.classify_counter();
        assert_eq!(entry.counter, IpIdCounter::Healthy);
        let (vmin, vmax) = entry.velocity.unwrap();
        assert!((vmin - 1000.0).abs() < 50.0);
        assert!((vmax - 1000.0).abs() < 50.0);
    }

    #[test]
    fn test_classify_healthy_across_wraparound() {
        let base = Instant::now();
        let mut entry = IpEntry::new(ip("10.0.0.1"), 5);
        entry.samples = vec![
            sample(1, base, 0, 65_500, false),
            sample(2, base, 100, 64, false), // wraps, gap = 100
        ];
        entry.classify_counter();
        assert_eq!(entry.counter, IpIdCounter::Healthy);
    }

    #[test]
    fn test_classify_echo_counter() {
        let base = Instant::now();
        let mut entry = IpEntry::new(ip("10.0.0.1"), 5);
        entry.samples = vec![
            sample(1, base, 0, 7, true),
            sample(2, base, 100, 8, true),
        ];
        entry.classify_counter();
        assert_eq!(entry.counter, IpIdCounter::Echo);
    }

    #[test]
    fn test_classify_random_counter() {
        let base = Instant::now();
        let mut entry = IpEntry::new(ip("10.0.0.1"), 5);
        entry.samples = vec![
            sample(1, base, 0, 100, false),
            sample(2, base, 100, 40_000, false),
            sample(3, base, 200, 12, false),
        ];
        entry.classify_counter();
        assert_eq!(entry.counter, IpIdCounter::Random);
    }

    #[test]
    fn test_classify_fast_counter() {
        let base = Instant::now();
        let mut entry = IpEntry::new(ip("10.0.0.1"), 5);
        // 15000 ids in 1s
        entry.samples = vec![
            sample(1, base, 0, 0, false),
            sample(2, base, 500, 7_500, false),
            sample(3, base, 1000, 15_000, false),
        ];
        entry.classify_counter();
        assert_eq!(entry.counter, IpIdCounter::Fast);
    }

    #[test]
    fn test_single_sample_is_unknown() {
        let base = Instant::now();
        let mut entry = IpEntry::new(ip("10.0.0.1"), 5);
        entry.samples = vec![sample(1, base, 0, 100, false)];
        entry.classify_counter();
        assert_eq!(entry.counter, IpIdCounter::Unknown);
    }
}
