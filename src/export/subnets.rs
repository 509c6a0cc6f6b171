use anyhow::Result;
use std::io::Write;

use crate::subnet::SubnetSite;

/// Write subnet records, one block per subnet, in the same format the
/// parser reads back.
pub fn write_subnets<'a, W: Write>(
    sites: impl IntoIterator<Item = &'a SubnetSite>,
    mut writer: W,
) -> Result<()> {
    for ss in sites {
        writeln!(writer, "{}/{} {} {}", ss.prefix(), ss.prefix_len(), ss.status, ss.pivot_ttl)?;
        writeln!(writer, "interfaces:")?;
        for itf in ss.interfaces() {
            writeln!(writer, "{} {}", itf.ip, itf.ttl)?;
        }
        writeln!(writer, "route:")?;
        let hops: Vec<String> = ss.route.iter().map(|h| h.to_string()).collect();
        writeln!(writer, "{}", hops.join(" "))?;
        writeln!(writer)?;
    }
    Ok(())
}
