use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod alias;
mod cli;
mod config;
mod errors;
mod export;
mod lookup;
mod net;
mod probe;
mod state;
mod subnet;
mod tree;

use alias::{AliasHintCollector, AliasResolver, Router, UDP_DST_PORT};
use cli::Args;
use config::Config;
use errors::TopologyError;
use export::{RunSummary, write_aliases, write_bipartite, write_subnets, write_summary};
use probe::{ProbeDriver, RawSockDriver, check_permissions};
use state::IpTable;
use subnet::{SubnetSet, parse_subnet_records};
use tree::NetworkTree;

#[tokio::main]
async fn main() {
    // Initialise logging (RUST_LOG=debug etc.)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<TopologyError>()
            .map(|t| t.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    let started_at = Utc::now();
    let config = Config::from(&args);

    // Load and merge the measured subnets.
    let input = std::fs::read_to_string(&args.subnet_file)
        .map_err(TopologyError::from)
        .with_context(|| format!("Failed to read subnet file: {}", args.subnet_file))?;
    let records = parse_subnet_records(&input)?;
    let subnets_read = records.len();
    info!(subnets = subnets_read, "parsed subnet records");

    let mut set = SubnetSet::new();
    for ss in records {
        set.add_site(ss);
    }

    // Grow the tree: complete routes first, grafting what does not fit,
    // then repaired incomplete routes.
    let mut tree = NetworkTree::new(set.longest_route());
    set.sort_by_route();
    let mut subnets_skipped = 0usize;

    while let Some(ss) = set.get_valid_subnet(true) {
        if tree.is_empty() || tree.fitting_route(&ss) {
            tree.insert(ss);
        } else if let Some((old, new)) = tree.find_transplantation(&ss) {
            let mut ss = ss;
            ss.transplant_route(&old, &new);
            let adapted = set.adapt_routes(&old, &new);
            info!(subnet = %ss, adapted, "transplanted route onto the trunk");
            tree.insert(ss);
        } else {
            let err = TopologyError::InconsistentRoute(ss.to_string());
            warn!("{err}; subnet skipped");
            subnets_skipped += 1;
        }
    }

    while let Some(mut ss) = set.get_valid_subnet(false) {
        let repaired = tree.repair_route(&mut ss);
        if repaired > 0 {
            info!(subnet = %ss, repaired, "filled route holes from the tree");
        }
        if ss.route.is_empty() {
            let err = TopologyError::InconsistentRoute(format!("{ss} has no route"));
            warn!("{err}; subnet skipped");
            subnets_skipped += 1;
            continue;
        }
        tree.insert(ss);
    }
    let repaired = tree.repair_all_routes();
    if repaired > 0 {
        info!(repaired, "repaired stored routes");
    }

    let statistics = tree.statistics();
    info!(
        neighborhoods = statistics.neighborhoods,
        only_subnets = statistics.only_subnet_children,
        complete_linkage = statistics.complete_linkage,
        partial_linkage = statistics.partial_linkage,
        labels_covered = statistics.labels_in_subnets,
        "tree statistics"
    );

    // Alias hints and resolution.
    let table = Arc::new(IpTable::new());
    if !config.no_probe {
        check_permissions()?;

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            cancel_clone.cancel();
        });

        let driver: Arc<dyn ProbeDriver> =
            Arc::new(RawSockDriver::new(config.timeout, UDP_DST_PORT));
        let mut collector = AliasHintCollector::new(
            Arc::clone(&table),
            driver,
            config.max_threads,
            config.nb_ipids,
            cancel.clone(),
        );

        for (_, ttl, ips) in tree.alias_candidates() {
            if cancel.is_cancelled() {
                warn!("probing interrupted");
                break;
            }
            collector.set_current_ttl(ttl);
            collector.enqueue(ips);
            collector.collect().await?;
        }

        let resolver = AliasResolver::new(&table);
        tree.infer_routers(&resolver);
    }

    // Reports.
    let prefix = args.output.as_deref().unwrap_or(args.subnet_file.as_str());

    let sites: Vec<_> = tree.subnets().map(|(_, ss)| ss).collect();
    write_subnets(sites, report_file(&format!("{prefix}.subnets"))?)?;

    let routers: Vec<&Router> = tree
        .internal_nodes()
        .into_iter()
        .flat_map(|id| tree.routers_of(id))
        .collect();
    write_aliases(routers.iter().copied(), report_file(&format!("{prefix}.aliases"))?)?;

    let graph = tree.to_bipartite();
    write_bipartite(&graph, report_file(&format!("{prefix}.bip"))?)?;

    info!(
        subnets = tree.subnet_count(),
        routers = routers.len(),
        edges = graph.edges.len(),
        "reports written to {prefix}.{{subnets,aliases,bip}}"
    );

    if args.json {
        let summary = RunSummary {
            started_at,
            subnets_read,
            subnets_in_tree: tree.subnet_count(),
            subnets_skipped,
            tree_depth: tree.max_depth(),
            statistics,
            routers: routers.len(),
            probed_addresses: table.len(),
        };
        write_summary(&summary, std::io::stdout())?;
    }

    Ok(())
}

fn report_file(path: &str) -> Result<impl Write> {
    let file =
        File::create(path).with_context(|| format!("Failed to create report file: {path}"))?;
    Ok(BufWriter::new(file))
}
