use clap::Parser;
use std::time::Duration;

/// Infer the internal topology of a routed IPv4 network from measured
/// subnets: containment-aware subnet set, neighborhood tree, alias-resolved
/// routers and a bipartite router/subnet graph.
#[derive(Parser, Debug, Clone)]
#[command(name = "canopy")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subnet record file (prefix, status, pivot TTL, interfaces, route)
    pub subnet_file: String,

    /// Maximum concurrent probing threads
    #[arg(short = 't', long = "max-threads", default_value = "256")]
    pub max_threads: u16,

    /// IP-ID samples collected per interface
    #[arg(long = "ipids", default_value = "4")]
    pub nb_ipids: u8,

    /// Per-probe timeout in seconds
    #[arg(long = "timeout", default_value = "2.5")]
    pub timeout: f64,

    /// Output file prefix (writes <prefix>.subnets, <prefix>.aliases,
    /// <prefix>.bip); defaults to the input file name
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Build the tree and print statistics without any probing
    #[arg(long = "no-probe")]
    pub no_probe: bool,

    /// Print a JSON run summary to stdout
    #[arg(long = "json")]
    pub json: bool,
}

impl Args {
    /// Get the per-probe timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("Max threads must be at least 1".into());
        }

        const MAX_SAFE_THREADS: u16 = 1024;
        if self.max_threads > MAX_SAFE_THREADS {
            return Err(format!("Max threads cannot exceed {}", MAX_SAFE_THREADS));
        }

        if self.nb_ipids == 0 {
            return Err("IP-ID sample count must be at least 1".into());
        }

        // One collector stands for nb_ipids + 1 probe slots; a thread
        // budget below that can schedule nothing.
        if (self.max_threads as u32) < self.nb_ipids as u32 + 1 {
            return Err(format!(
                "Max threads ({}) must be at least ipids + 1 ({})",
                self.max_threads,
                self.nb_ipids as u32 + 1
            ));
        }

        if self.timeout <= 0.0 {
            return Err("Timeout must be positive".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(max_threads: u16, nb_ipids: u8) -> Args {
        Args {
            subnet_file: "subnets.txt".into(),
            max_threads,
            nb_ipids,
            timeout: 2.5,
            output: None,
            no_probe: false,
            json: false,
        }
    }

    #[test]
    fn test_thread_budget_must_fit_one_collector() {
        assert!(args(5, 4).validate().is_ok());
        assert!(args(4, 4).validate().is_err());
        assert!(args(0, 4).validate().is_err());
    }

    #[test]
    fn test_timeout_must_be_positive() {
        let mut a = args(8, 4);
        a.timeout = 0.0;
        assert!(a.validate().is_err());
    }
}
