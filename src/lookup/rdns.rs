use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::net::InetAddress;

/// DNS cache entry
struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// Reverse DNS lookup with caching. Negative results are cached too, so an
/// unresponsive resolver is asked once per address.
pub struct DnsLookup {
    resolver: TokioAsyncResolver,
    cache: RwLock<HashMap<InetAddress, CacheEntry>>,
    cache_ttl: Duration,
}

impl DnsLookup {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3600), // 1 hour
        }
    }

    /// Lookup reverse DNS for an address, using the cache.
    pub async fn reverse_lookup(&self, ip: InetAddress) -> Option<String> {
        // Check cache first
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.get(&ip) {
                if entry.cached_at.elapsed() < self.cache_ttl {
                    return entry.hostname.clone();
                }
            }
        }

        let addr = IpAddr::V4(ip.into());
        let hostname = match self.resolver.reverse_lookup(addr).await {
            Ok(lookup) => lookup.iter().next().map(|name| {
                let s = name.to_string();
                // Remove trailing dot
                s.trim_end_matches('.').to_string()
            }),
            Err(_) => None,
        };

        // Cache result
        {
            let mut cache = self.cache.write();
            cache.insert(
                ip,
                CacheEntry {
                    hostname: hostname.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        hostname
    }
}

impl Default for DnsLookup {
    fn default() -> Self {
        Self::new()
    }
}
