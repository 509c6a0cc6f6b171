use crate::alias::Router;
use crate::net::InetAddress;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Index of a subnet in the tree's subnet arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubnetId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Root,
    /// A neighborhood: a region where every device is one hop away.
    Internal,
    /// Leaf pointing at a measured subnet.
    Subnet,
    /// An internal node whose incoming routes disagree at this depth
    /// because of load balancing; carries more than one label.
    Hedera,
}

/// Arena-allocated tree node. Internal and hedera nodes carry the hop
/// labels observed at their depth and, after alias resolution, the inferred
/// routers of the neighborhood.
#[derive(Debug)]
pub struct TreeNode {
    pub kind: NodeType,
    pub depth: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Responding hop addresses at this depth; may hold the missing marker.
    pub labels: Vec<InetAddress>,
    /// Set for leaves only.
    pub subnet: Option<SubnetId>,
    /// Routers inferred for this neighborhood.
    pub routers: Vec<Router>,
}

impl TreeNode {
    pub fn root() -> Self {
        TreeNode {
            kind: NodeType::Root,
            depth: 0,
            parent: None,
            children: Vec::new(),
            labels: Vec::new(),
            subnet: None,
            routers: Vec::new(),
        }
    }

    pub fn internal(label: InetAddress, depth: usize, parent: NodeId) -> Self {
        TreeNode {
            kind: NodeType::Internal,
            depth,
            parent: Some(parent),
            children: Vec::new(),
            labels: vec![label],
            subnet: None,
            routers: Vec::new(),
        }
    }

    pub fn leaf(subnet: SubnetId, depth: usize, parent: NodeId) -> Self {
        TreeNode {
            kind: NodeType::Subnet,
            depth,
            parent: Some(parent),
            children: Vec::new(),
            labels: Vec::new(),
            subnet: Some(subnet),
            routers: Vec::new(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, NodeType::Internal | NodeType::Hedera)
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeType::Subnet
    }

    pub fn has_label(&self, label: InetAddress) -> bool {
        self.labels.contains(&label)
    }

    /// Add a label, promoting the node to HEDERA once it carries more than
    /// one distinct concrete label.
    pub fn add_label(&mut self, label: InetAddress) {
        if self.has_label(label) {
            return;
        }
        self.labels.push(label);
        if self.kind == NodeType::Internal
            && self.labels.iter().filter(|l| !l.is_missing()).count() > 1
        {
            self.kind = NodeType::Hedera;
        }
    }

    /// Labels that name real interfaces (missing markers filtered out).
    pub fn concrete_labels(&self) -> impl Iterator<Item = InetAddress> + '_ {
        self.labels.iter().copied().filter(|l| !l.is_missing())
    }
}
