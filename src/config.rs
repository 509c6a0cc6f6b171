use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cli::Args;

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum concurrent probing threads
    pub max_threads: u16,
    /// IP-ID samples per interface
    pub nb_ipids: u8,
    /// Per-probe timeout
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Skip probing phases entirely
    pub no_probe: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_threads: 256,
            nb_ipids: 4,
            timeout: Duration::from_secs_f64(2.5),
            no_probe: false,
        }
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            max_threads: args.max_threads,
            nb_ipids: args.nb_ipids,
            timeout: args.timeout_duration(),
            no_probe: args.no_probe,
        }
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
