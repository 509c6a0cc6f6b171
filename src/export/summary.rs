use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::tree::TreeStatistics;

/// Machine-readable run summary, emitted with `--json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub subnets_read: usize,
    pub subnets_in_tree: usize,
    pub subnets_skipped: usize,
    pub tree_depth: usize,
    pub statistics: TreeStatistics,
    pub routers: usize,
    pub probed_addresses: usize,
}

pub fn write_summary<W: Write>(summary: &RunSummary, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes() {
        let summary = RunSummary {
            started_at: Utc::now(),
            subnets_read: 10,
            subnets_in_tree: 9,
            subnets_skipped: 1,
            tree_depth: 6,
            statistics: TreeStatistics::default(),
            routers: 4,
            probed_addresses: 23,
        };
        let mut buf = Vec::new();
        write_summary(&summary, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"subnets_read\": 10"));
        assert!(text.contains("\"neighborhoods\": 0"));
    }
}
