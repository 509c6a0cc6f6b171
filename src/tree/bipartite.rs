//! Bipartite projection of the tree: routers on one side, subnets on the
//! other, an edge wherever a router interface lies inside a subnet or a
//! neighborhood's ingress router gives access to a child subnet.

use std::collections::HashSet;

use crate::net::InetAddress;
use crate::tree::{NetworkTree, NodeType};

/// A router endpoint of the bipartite graph. `id` is 1-based and rendered
/// as `R<id>`.
#[derive(Debug, Clone)]
pub struct BipartiteRouter {
    pub id: usize,
    pub interfaces: Vec<InetAddress>,
}

impl BipartiteRouter {
    pub fn name(&self) -> String {
        format!("R{}", self.id)
    }
}

/// A subnet endpoint, rendered by its CIDR string.
#[derive(Debug, Clone)]
pub struct BipartiteSubnet {
    pub prefix: InetAddress,
    pub prefix_len: u8,
}

impl BipartiteSubnet {
    pub fn name(&self) -> String {
        format!("{}/{}", self.prefix, self.prefix_len)
    }
}

/// An edge between a router and a subnet. Load-balanced neighborhood links
/// carry the hop label that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BipartiteEdge {
    pub router: usize,
    pub subnet: usize,
    pub label: Option<InetAddress>,
}

#[derive(Debug, Default)]
pub struct BipartiteGraph {
    pub routers: Vec<BipartiteRouter>,
    pub subnets: Vec<BipartiteSubnet>,
    pub edges: Vec<BipartiteEdge>,
}

impl NetworkTree {
    /// Project the tree onto a bipartite router/subnet graph. Call after
    /// [`NetworkTree::infer_routers`].
    pub fn to_bipartite(&self) -> BipartiteGraph {
        let mut graph = BipartiteGraph::default();

        // Subnet side, in arena order.
        let mut subnet_index = std::collections::HashMap::new();
        for (sid, ss) in self.subnets() {
            subnet_index.insert(sid, graph.subnets.len());
            graph.subnets.push(BipartiteSubnet {
                prefix: ss.prefix(),
                prefix_len: ss.prefix_len(),
            });
        }

        // Router side: every inferred router of every neighborhood, in
        // depth-first order, with the owning node remembered for the
        // ingress-linkage edges.
        let mut routers_of_node = Vec::new();
        for node_id in self.internal_nodes() {
            let mut ids = Vec::new();
            for router in self.routers_of(node_id) {
                let id = graph.routers.len() + 1;
                ids.push(id);
                graph.routers.push(BipartiteRouter {
                    id,
                    interfaces: router.interfaces().iter().map(|i| i.ip).collect(),
                });
            }
            routers_of_node.push((node_id, ids));
        }

        let mut seen: HashSet<BipartiteEdge> = HashSet::new();
        let mut push_edge = |edges: &mut Vec<BipartiteEdge>, edge: BipartiteEdge| {
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        };

        // Interface containment: a router touches every subnet one of its
        // interfaces belongs to.
        for router in &graph.routers {
            for (idx, subnet) in graph.subnets.iter().enumerate() {
                let touches = router
                    .interfaces
                    .iter()
                    .any(|&ip| ip.is_within(subnet.prefix, subnet.prefix_len));
                if touches {
                    push_edge(
                        &mut graph.edges,
                        BipartiteEdge {
                            router: router.id,
                            subnet: idx,
                            label: None,
                        },
                    );
                }
            }
        }

        // Ingress linkage: for each neighborhood, the router holding a hop
        // label gives access to the node's child subnets. HEDERA labels are
        // emitted per label.
        for (node_id, router_ids) in &routers_of_node {
            let node = self.node(*node_id);
            let load_balanced = node.kind == NodeType::Hedera;
            for label in node.concrete_labels() {
                let Some(&router_id) = router_ids
                    .iter()
                    .find(|&&rid| graph.routers[rid - 1].interfaces.contains(&label))
                else {
                    continue;
                };
                for &child in &node.children {
                    let Some(sid) = self.node(child).subnet else {
                        continue;
                    };
                    let Some(&subnet_idx) = subnet_index.get(&sid) else {
                        continue;
                    };
                    push_edge(
                        &mut graph.edges,
                        BipartiteEdge {
                            router: router_id,
                            subnet: subnet_idx,
                            label: load_balanced.then_some(label),
                        },
                    );
                }
            }
        }

        graph
    }
}
