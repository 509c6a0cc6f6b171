use anyhow::Result;
use std::io::Write;

use crate::tree::BipartiteGraph;

/// Write the bipartite graph: the router and subnet sides, then the edge
/// list. Load-balanced edges carry their hop label as a third field.
pub fn write_bipartite<W: Write>(graph: &BipartiteGraph, mut writer: W) -> Result<()> {
    writeln!(writer, "routers:")?;
    for router in &graph.routers {
        writeln!(writer, "{}", router.name())?;
    }
    writeln!(writer, "subnets:")?;
    for subnet in &graph.subnets {
        writeln!(writer, "{}", subnet.name())?;
    }
    writeln!(writer, "edges:")?;
    for edge in &graph.edges {
        let router = format!("R{}", edge.router);
        let subnet = graph.subnets[edge.subnet].name();
        match edge.label {
            Some(label) => writeln!(writer, "{router} {subnet} {label}")?,
            None => writeln!(writer, "{router} {subnet}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::InetAddress;
    use crate::tree::{BipartiteEdge, BipartiteRouter, BipartiteSubnet};

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_sections_and_edge_labels() {
        let graph = BipartiteGraph {
            routers: vec![BipartiteRouter {
                id: 1,
                interfaces: vec![ip("10.0.0.1")],
            }],
            subnets: vec![BipartiteSubnet {
                prefix: ip("10.0.0.0"),
                prefix_len: 24,
            }],
            edges: vec![
                BipartiteEdge { router: 1, subnet: 0, label: None },
                BipartiteEdge { router: 1, subnet: 0, label: Some(ip("2.0.0.1")) },
            ],
        };

        let mut buf = Vec::new();
        write_bipartite(&graph, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "routers:\nR1\nsubnets:\n10.0.0.0/24\nedges:\nR1 10.0.0.0/24\nR1 10.0.0.0/24 2.0.0.1\n"
        );
    }
}
