//! Sorted subnet collection with containment-aware merging.
//!
//! Sites are kept sorted by (prefix, prefix length). A new site that is
//! covered by a registered one is not inserted; its interfaces are folded
//! into the registered site. A new site that covers registered ones absorbs
//! them. The set therefore never holds two sites where one strictly
//! contains the other.

use crate::net::InetAddress;
use crate::subnet::site::{SubnetSite, SubnetStatus};

/// Outcome of [`SubnetSet::add_site`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// Same /32 block already registered.
    KnownSubnet,
    /// The new site is covered by a registered one; interfaces merged there.
    SmallerSubnet,
    /// The new site absorbed one or more registered sites.
    BiggerSubnet,
    /// Inserted as-is.
    NewSubnet,
}

#[derive(Default)]
pub struct SubnetSet {
    sites: Vec<SubnetSite>,
}

impl SubnetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[SubnetSite] {
        &self.sites
    }

    fn insertion_index(&self, ss: &SubnetSite) -> usize {
        self.sites
            .partition_point(|s| (s.prefix(), s.prefix_len()) < (ss.prefix(), ss.prefix_len()))
    }

    /// Add a site, merging by containment.
    pub fn add_site(&mut self, mut ss: SubnetSite) -> UpdateResult {
        // Covered by an existing site? Containment is checked from the
        // insertion point outward: a covering site sorts at or before the
        // insertion point (at it only for an identical block).
        let idx = self.insertion_index(&ss);
        let upper = (idx + 1).min(self.sites.len());
        for existing in self.sites[..upper].iter_mut().rev() {
            if existing.covers(&ss) {
                if ss.prefix_len() == 32 && existing.same_block(&ss) {
                    return UpdateResult::KnownSubnet;
                }
                existing.absorb_interfaces(&ss);
                return UpdateResult::SmallerSubnet;
            }
            // Sites sorted before ss whose block ends before ss starts can
            // be skipped, and so can everything before them.
            if existing.upper_border() < ss.prefix() {
                break;
            }
        }

        // Absorb existing sites strictly contained in the new one. They sort
        // at or after the insertion point.
        let mut absorbed_any = false;
        let mut i = idx;
        while i < self.sites.len() {
            if ss.encompasses(&self.sites[i]) {
                let absorbed = self.sites.remove(i);
                ss.absorb_interfaces(&absorbed);
                absorbed_any = true;
            } else if self.sites[i].prefix() > ss.upper_border() {
                break;
            } else {
                i += 1;
            }
        }

        let idx = self.insertion_index(&ss);
        self.sites.insert(idx, ss);
        if absorbed_any {
            UpdateResult::BiggerSubnet
        } else {
            UpdateResult::NewSubnet
        }
    }

    /// Add without merging or sorting; pair with [`SubnetSet::sort_set`]
    /// when bulk loading.
    pub fn add_site_no_merging(&mut self, ss: SubnetSite) {
        self.sites.push(ss);
    }

    pub fn sort_set(&mut self) {
        self.sites
            .sort_by_key(|s| (s.prefix(), s.prefix_len()));
    }

    /// First site whose block covers `ip`.
    pub fn get_subnet_containing(&self, ip: InetAddress) -> Option<&SubnetSite> {
        self.sites.iter().find(|s| s.contains(ip))
    }

    /// As above, additionally requiring an exact pivot-TTL match.
    pub fn get_subnet_containing_with_ttl(
        &self,
        ip: InetAddress,
        ttl: u8,
    ) -> Option<&SubnetSite> {
        self.sites
            .iter()
            .find(|s| s.contains(ip) && s.pivot_ttl == ttl)
    }

    /// Site covering the whole of `ss` with the same pivot TTL, if any.
    pub fn is_subnet_encompassed(&self, ss: &SubnetSite) -> Option<&SubnetSite> {
        self.sites
            .iter()
            .find(|s| s.covers(ss) && !s.same_block(ss) && s.pivot_ttl == ss.pivot_ttl)
    }

    /// Test whether a hypothetical block `[lower, upper]` reached at `ttl`
    /// can live alongside the registered sites. Overlapping sites must share
    /// the TTL (±1 when `check_adjacent_ttl`); when `shadow_expansion` is
    /// set, overlapping an Accurate or Odd site disqualifies outright.
    pub fn is_compatible(
        &self,
        lower: InetAddress,
        upper: InetAddress,
        ttl: u8,
        check_adjacent_ttl: bool,
        shadow_expansion: bool,
    ) -> bool {
        for s in &self.sites {
            if !s.overlaps(lower, upper) {
                continue;
            }
            if shadow_expansion
                && matches!(s.status, SubnetStatus::Accurate | SubnetStatus::Odd)
            {
                return false;
            }
            let diff = (s.pivot_ttl as i16 - ttl as i16).abs();
            let allowed = if check_adjacent_ttl { 1 } else { 0 };
            if diff > allowed {
                return false;
            }
        }
        true
    }

    /// Remove and return the first Accurate/Odd/Shadow site; when
    /// `complete_route` is set, only sites whose route has no hole qualify.
    pub fn get_valid_subnet(&mut self, complete_route: bool) -> Option<SubnetSite> {
        let pos = self.sites.iter().position(|s| {
            matches!(
                s.status,
                SubnetStatus::Accurate | SubnetStatus::Odd | SubnetStatus::Shadow
            ) && (!complete_route || s.has_complete_route())
        })?;
        Some(self.sites.remove(pos))
    }

    /// Remove and return the first Shadow site.
    pub fn get_shadow_subnet(&mut self) -> Option<SubnetSite> {
        let pos = self
            .sites
            .iter()
            .position(|s| s.status == SubnetStatus::Shadow)?;
        Some(self.sites.remove(pos))
    }

    /// Sort by ascending route length, then ascending prefix.
    pub fn sort_by_route(&mut self) {
        self.sites
            .sort_by_key(|s| (s.route.len(), s.prefix(), s.prefix_len()));
    }

    /// Largest pivot TTL in the set.
    pub fn maximum_distance(&self) -> u8 {
        self.sites.iter().map(|s| s.pivot_ttl).max().unwrap_or(0)
    }

    /// Longest route in the set, used to size the tree's depth map.
    pub fn longest_route(&self) -> usize {
        self.sites.iter().map(|s| s.route.len()).max().unwrap_or(0)
    }

    /// Rewrite every route starting with exactly `old` to start with `new`
    /// instead; returns the number of rewritten sites.
    pub fn adapt_routes(&mut self, old: &[InetAddress], new: &[InetAddress]) -> usize {
        let mut count = 0;
        for s in self.sites.iter_mut() {
            if s.transplant_route(old, new) {
                count += 1;
            }
        }
        count
    }
}
