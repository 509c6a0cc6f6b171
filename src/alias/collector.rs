//! Four-phase alias-hint collection.
//!
//! For the interfaces of one neighborhood, the collector gathers, in strict
//! phase order: IP-ID samples, UDP unreachable-port replies, ICMP timestamp
//! replies, and reverse DNS names. Workers are tokio tasks held in a fixed
//! slot vector; a slot is joined before reuse, so at most `nb_slots`
//! workers run at once and a phase ends only when every started worker has
//! drained. Each worker owns its table entry for the duration of a phase.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::TopologyError;
use crate::net::InetAddress;
use crate::probe::ProbeDriver;
use crate::state::{EntryHandle, IpTable};

/// Source-port pool partitioned into per-slot bands for phases 2 and 3.
pub const LOWER_SRC_PORT: u16 = 39_152;
pub const UPPER_SRC_PORT: u16 = 65_535;
/// Presumably closed destination port for unreachable probes.
pub const UDP_DST_PORT: u16 = 33_434;

/// Delay between worker dispatches: short for light probes (phases 1 and
/// 4), long where a shared upstream router would otherwise be hammered
/// (phases 2 and 3).
const DISPATCH_DELAY_SHORT: Duration = Duration::from_millis(10);
const DISPATCH_DELAY_LONG: Duration = Duration::from_millis(100);

pub struct AliasHintCollector {
    table: Arc<IpTable>,
    driver: Arc<dyn ProbeDriver>,
    max_threads: u16,
    nb_ipids: u8,
    current_ttl: u8,
    token_counter: u64,
    ips_to_probe: Vec<InetAddress>,
    cancel: CancellationToken,
}

impl AliasHintCollector {
    /// `max_threads` must leave room for at least one IP-ID worker, i.e.
    /// `max_threads >= nb_ipids + 1`; configuration is validated upstream.
    pub fn new(
        table: Arc<IpTable>,
        driver: Arc<dyn ProbeDriver>,
        max_threads: u16,
        nb_ipids: u8,
        cancel: CancellationToken,
    ) -> Self {
        debug_assert!(max_threads >= nb_ipids as u16 + 1);
        AliasHintCollector {
            table,
            driver,
            max_threads,
            nb_ipids,
            current_ttl: 0,
            token_counter: 1,
            ips_to_probe: Vec::new(),
            cancel,
        }
    }

    /// TTL recorded on table entries created for this neighborhood.
    pub fn set_current_ttl(&mut self, ttl: u8) {
        self.current_ttl = ttl;
    }

    /// Queue addresses for the next [`AliasHintCollector::collect`] call.
    /// Duplicates are fine; they are removed at collection time.
    pub fn enqueue(&mut self, ips: impl IntoIterator<Item = InetAddress>) {
        self.ips_to_probe.extend(ips);
    }

    /// Next probe token. Tokens are strictly increasing and contiguous from
    /// 1 across the whole run; only the orchestrator increments them.
    pub fn probe_token(&mut self) -> u64 {
        let token = self.token_counter;
        self.token_counter += 1;
        token
    }

    /// Run the four phases over the queued addresses.
    pub async fn collect(&mut self) -> Result<(), TopologyError> {
        // Sort and deduplicate (the ingress of a neighborhood can be listed
        // both as a label and as a contra-pivot), and make sure every
        // address has a table entry at the neighborhood TTL.
        self.ips_to_probe.sort();
        self.ips_to_probe.dedup();
        let ips = std::mem::take(&mut self.ips_to_probe);
        if ips.is_empty() {
            return Ok(());
        }
        for &ip in &ips {
            self.table.create(ip, self.current_ttl);
        }

        let nb_ips = ips.len();
        let max_threads = self.max_threads as usize;

        // Phase 1: each worker collects nb_ipids samples, so a worker
        // stands for nb_ipids + 1 probe slots.
        let max_collectors = (max_threads / (self.nb_ipids as usize + 1)).max(1);
        let nb_slots = max_collectors.min(nb_ips);
        info!(ips = nb_ips, workers = nb_slots, "1. IP-ID collection");
        {
            let nb_ipids = self.nb_ipids as u64;
            let mut next_token = self.token_counter;
            let table = Arc::clone(&self.table);
            let driver = Arc::clone(&self.driver);
            let ttl = self.current_ttl;
            run_phase(&self.cancel, &ips, nb_slots, DISPATCH_DELAY_SHORT, |_, target| {
                let tokens = next_token..next_token + nb_ipids;
                next_token += nb_ipids;
                let entry = table.create(target, ttl);
                tokio::spawn(ip_id_worker(Arc::clone(&driver), entry, target, tokens))
            })
            .await?;
            self.token_counter = next_token;
        }

        // Phase 2: one worker per address; each slot works a disjoint
        // source-port band so concurrent workers never share ports.
        let nb_slots = max_threads.min(nb_ips);
        let band = ((UPPER_SRC_PORT - LOWER_SRC_PORT) as usize / max_threads).max(1) as u16;
        info!(ips = nb_ips, workers = nb_slots, "2. UDP unreachable port");
        {
            let table = Arc::clone(&self.table);
            let driver = Arc::clone(&self.driver);
            let ttl = self.current_ttl;
            run_phase(&self.cancel, &ips, nb_slots, DISPATCH_DELAY_LONG, |j, target| {
                let lo = LOWER_SRC_PORT + (j as u16) * band;
                let hi = lo + band - 1;
                let entry = table.create(target, ttl);
                tokio::spawn(udp_worker(Arc::clone(&driver), entry, target, (lo, hi)))
            })
            .await?;
        }

        // Phase 3: timestamp requests, same shape as phase 2.
        info!(ips = nb_ips, workers = nb_slots, "3. ICMP timestamp request");
        {
            let table = Arc::clone(&self.table);
            let driver = Arc::clone(&self.driver);
            let ttl = self.current_ttl;
            run_phase(&self.cancel, &ips, nb_slots, DISPATCH_DELAY_LONG, |_, target| {
                let entry = table.create(target, ttl);
                let sequence = (target.value() & 0xFFFF) as u16;
                tokio::spawn(tstamp_worker(Arc::clone(&driver), entry, target, sequence))
            })
            .await?;
        }

        // Phase 4: reverse DNS.
        info!(ips = nb_ips, workers = nb_slots, "4. reverse DNS");
        {
            let table = Arc::clone(&self.table);
            let driver = Arc::clone(&self.driver);
            let ttl = self.current_ttl;
            run_phase(&self.cancel, &ips, nb_slots, DISPATCH_DELAY_SHORT, |_, target| {
                let entry = table.create(target, ttl);
                tokio::spawn(rdns_worker(Arc::clone(&driver), entry, target))
            })
            .await?;
        }

        Ok(())
    }
}

/// Dispatch one worker per address over `nb_slots` recycled slots, pausing
/// `delay` between dispatches. Every started worker is joined before the
/// phase returns, also on cancellation.
async fn run_phase<F>(
    cancel: &CancellationToken,
    ips: &[InetAddress],
    nb_slots: usize,
    delay: Duration,
    mut spawn: F,
) -> Result<(), TopologyError>
where
    F: FnMut(usize, InetAddress) -> JoinHandle<()>,
{
    let mut slots: Vec<Option<JoinHandle<()>>> = (0..nb_slots).map(|_| None).collect();
    let mut j = 0;

    for &target in ips {
        if cancel.is_cancelled() {
            break;
        }
        if let Some(handle) = slots[j].take() {
            join_worker(handle).await?;
        }
        slots[j] = Some(spawn(j, target));
        j = (j + 1) % nb_slots;
        tokio::time::sleep(delay).await;
    }

    for slot in &mut slots {
        if let Some(handle) = slot.take() {
            join_worker(handle).await?;
        }
    }
    Ok(())
}

async fn join_worker(handle: JoinHandle<()>) -> Result<(), TopologyError> {
    handle
        .await
        .map_err(|e| TopologyError::ProbeFailure(format!("probe worker died: {e}")))
}

async fn ip_id_worker(
    driver: Arc<dyn ProbeDriver>,
    entry: EntryHandle,
    target: InetAddress,
    tokens: std::ops::Range<u64>,
) {
    for token in tokens {
        let sequence = (token & 0xFFFF) as u16;
        if let Some(result) = driver.ip_id_probe(target, sequence).await {
            entry.write().record_sample(token, result.ip_id, result.echoed);
        }
    }
    entry.write().classify_counter();
}

async fn udp_worker(
    driver: Arc<dyn ProbeDriver>,
    entry: EntryHandle,
    target: InetAddress,
    src_ports: (u16, u16),
) {
    if let Some(reply) = driver.udp_port_unreachable(target, src_ports).await {
        let mut e = entry.write();
        e.udp_unreachable = true;
        if reply.reply_from != target {
            e.udp_reply_src = Some(reply.reply_from);
        }
    }
}

async fn tstamp_worker(
    driver: Arc<dyn ProbeDriver>,
    entry: EntryHandle,
    target: InetAddress,
    sequence: u16,
) {
    if driver.timestamp_request(target, sequence).await.is_some() {
        entry.write().replies_timestamp = true;
    }
}

async fn rdns_worker(driver: Arc<dyn ProbeDriver>, entry: EntryHandle, target: InetAddress) {
    if let Some(hostname) = driver.reverse_lookup(target).await {
        entry.write().hostname = Some(hostname);
    }
}
