//! The neighborhood tree.
//!
//! Subnets hang as leaves under a chain of internal nodes, one per route
//! hop; an internal node stands for a neighborhood (every device reachable
//! within one hop). Load-balanced routes to the same subnet are fused into
//! HEDERA nodes carrying several labels, so the structure is a near-tree.
//!
//! Nodes and subnets live in arenas addressed by [`NodeId`] / [`SubnetId`];
//! leaves hold subnet identifiers rather than back-pointers, and detaching a
//! leaf is an index detach.

pub mod bipartite;
pub mod node;

pub use bipartite::*;
pub use node::*;

use std::collections::HashMap;
use tracing::warn;

use crate::alias::resolver::AliasResolver;
use crate::net::InetAddress;
use crate::subnet::{SubnetSet, SubnetSite};

/// Fixed five-slot statistics over the tree's neighborhoods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TreeStatistics {
    /// Total internal (neighborhood) nodes.
    pub neighborhoods: usize,
    /// Neighborhoods with only subnet children.
    pub only_subnet_children: usize,
    /// Neighborhoods where every child neighborhood's ingress label appears
    /// in a child subnet.
    pub complete_linkage: usize,
    /// Neighborhoods with at most two unlinked child labels.
    pub partial_linkage: usize,
    /// Neighborhoods whose every label lies within a measured subnet.
    pub labels_in_subnets: usize,
}

pub struct NetworkTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
    /// depth -> nodes at that depth; every live non-root node is registered.
    depth_map: Vec<Vec<NodeId>>,
    subnets: Vec<Option<SubnetSite>>,
    /// top-20-bit bucket -> subnets of the tree whose block intersects it.
    subnet_map: HashMap<u32, Vec<SubnetId>>,
    leaf_of: HashMap<SubnetId, NodeId>,
    max_depth: usize,
}

impl NetworkTree {
    /// `max_depth` is the length of the longest route expected; the depth
    /// map grows on demand if an insertion exceeds it.
    pub fn new(max_depth: usize) -> Self {
        let root = TreeNode::root();
        NetworkTree {
            nodes: vec![root],
            root: NodeId(0),
            depth_map: vec![Vec::new(); max_depth + 2],
            subnets: Vec::new(),
            subnet_map: HashMap::new(),
            leaf_of: HashMap::new(),
            max_depth,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn subnet(&self, id: SubnetId) -> Option<&SubnetSite> {
        self.subnets.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[self.root.0].children.is_empty()
    }

    pub fn subnet_count(&self) -> usize {
        self.subnets.iter().filter(|s| s.is_some()).count()
    }

    /// Live subnets in arena order.
    pub fn subnets(&self) -> impl Iterator<Item = (SubnetId, &SubnetSite)> {
        self.subnets
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SubnetId(i), s)))
    }

    pub fn nodes_at_depth(&self, depth: usize) -> &[NodeId] {
        self.depth_map
            .get(depth)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    // ------------------------------------------------------------------
    // Insertion

    /// Insert a subnet by walking its route from depth 1, creating internal
    /// nodes for unseen hops and fusing load-balanced branches.
    pub fn insert(&mut self, ss: SubnetSite) -> SubnetId {
        let route = ss.route.clone();

        // A twin (same block already in the tree) means this is an
        // alternative route observed under load balancing: its branch is
        // followed and divergent labels are fused into it.
        let twin_path = match self.find_twin(&ss) {
            Some(twin) => self.branch_path(twin),
            None => Vec::new(),
        };

        let mut cur = self.root;
        for (i, &hop) in route.iter().enumerate() {
            let depth = i + 1;
            let expected = twin_path.get(i).copied();
            cur = self.descend(cur, hop, depth, expected);
        }

        let sid = self.register_subnet(ss);
        let leaf_depth = route.len() + 1;
        let leaf = self.alloc_node(TreeNode::leaf(sid, leaf_depth, cur));
        self.nodes[cur.0].children.push(leaf);
        self.register_depth(leaf, leaf_depth);
        self.leaf_of.insert(sid, leaf);
        sid
    }

    fn descend(
        &mut self,
        cur: NodeId,
        hop: InetAddress,
        depth: usize,
        expected: Option<NodeId>,
    ) -> NodeId {
        if hop.is_missing() {
            if let Some(t) = expected {
                if self.nodes[t.0].parent == Some(cur) {
                    return t;
                }
            }
            // Descend into an existing internal child when one exists; the
            // label gets repaired later from richer routes.
            let existing = self.nodes[cur.0]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c.0].is_internal());
            return match existing {
                Some(c) => c,
                None => self.new_internal(cur, hop, depth),
            };
        }

        let matches: Vec<NodeId> = self.nodes[cur.0]
            .children
            .iter()
            .copied()
            .filter(|&c| self.nodes[c.0].is_internal() && self.nodes[c.0].has_label(hop))
            .collect();

        if let Some(t) = expected {
            if self.nodes[t.0].parent == Some(cur) {
                if !self.nodes[t.0].has_label(hop) {
                    // The twin's branch goes through a different hop at this
                    // depth: load balancing. Fuse, absorbing any sibling the
                    // alternative label already matched.
                    for &m in &matches {
                        if m != t {
                            self.merge_nodes(t, m);
                        }
                    }
                    self.nodes[t.0].add_label(hop);
                }
                return t;
            }
        }

        match matches.len() {
            0 => self.new_internal(cur, hop, depth),
            1 => matches[0],
            _ => {
                // Alternative labels of this hop already match distinct
                // children: promote them into a single HEDERA.
                let target = matches[0];
                for &m in &matches[1..] {
                    self.merge_nodes(target, m);
                }
                target
            }
        }
    }

    fn new_internal(&mut self, parent: NodeId, label: InetAddress, depth: usize) -> NodeId {
        let id = self.alloc_node(TreeNode::internal(label, depth, parent));
        self.nodes[parent.0].children.push(id);
        self.register_depth(id, depth);
        id
    }

    /// Fuse `other` into `target`: union of label sets, children redirected,
    /// `other` unregistered. `target` becomes a HEDERA when it ends up with
    /// several concrete labels.
    fn merge_nodes(&mut self, target: NodeId, other: NodeId) {
        debug_assert_ne!(target, other);
        let labels = std::mem::take(&mut self.nodes[other.0].labels);
        let children = std::mem::take(&mut self.nodes[other.0].children);
        let routers = std::mem::take(&mut self.nodes[other.0].routers);
        for label in labels {
            self.nodes[target.0].add_label(label);
        }
        for child in children {
            self.nodes[child.0].parent = Some(target);
            self.nodes[target.0].children.push(child);
            if let Some(sid) = self.nodes[child.0].subnet {
                self.leaf_of.insert(sid, child);
            }
        }
        self.nodes[target.0].routers.extend(routers);
        self.detach(other);
    }

    /// Remove a node from its parent's child list and from the depth map.
    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
        let depth = self.nodes[id.0].depth;
        if let Some(level) = self.depth_map.get_mut(depth) {
            level.retain(|&n| n != id);
        }
    }

    fn alloc_node(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn register_depth(&mut self, id: NodeId, depth: usize) {
        if depth >= self.depth_map.len() {
            self.depth_map.resize(depth + 1, Vec::new());
            self.max_depth = self.max_depth.max(depth);
        }
        self.depth_map[depth].push(id);
    }

    fn register_subnet(&mut self, ss: SubnetSite) -> SubnetId {
        let sid = SubnetId(self.subnets.len());
        for bucket in subnet_buckets(&ss) {
            self.subnet_map.entry(bucket).or_default().push(sid);
        }
        self.subnets.push(Some(ss));
        sid
    }

    fn find_twin(&self, ss: &SubnetSite) -> Option<SubnetId> {
        let bucket = ss.prefix().top20();
        self.subnet_map.get(&bucket)?.iter().copied().find(|&sid| {
            self.subnet(sid)
                .is_some_and(|existing| existing.same_block(ss))
        })
    }

    /// Internal nodes on the branch above a subnet's leaf, top-down
    /// (index i = node at depth i + 1).
    fn branch_path(&self, sid: SubnetId) -> Vec<NodeId> {
        let Some(&leaf) = self.leaf_of.get(&sid) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut cur = self.nodes[leaf.0].parent;
        while let Some(id) = cur {
            if id == self.root {
                break;
            }
            path.push(id);
            cur = self.nodes[id.0].parent;
        }
        path.reverse();
        path
    }

    // ------------------------------------------------------------------
    // Lookup

    /// First subnet of the tree whose block covers `needle`.
    pub fn get_subnet_containing(&self, needle: InetAddress) -> Option<&SubnetSite> {
        let bucket = needle.top20();
        self.subnet_map
            .get(&bucket)?
            .iter()
            .filter_map(|&sid| self.subnet(sid))
            .find(|s| s.contains(needle))
    }

    // ------------------------------------------------------------------
    // Route repair

    /// Fill the missing hops of a not-yet-inserted route from unambiguous
    /// internal nodes along the corresponding branch. Returns the number of
    /// repaired hops.
    pub fn repair_route(&self, ss: &mut SubnetSite) -> usize {
        let mut repaired = 0;
        let mut cur = self.root;
        for i in 0..ss.route.len() {
            let hop = ss.route[i];
            let next = if hop.is_missing() {
                let internals: Vec<NodeId> = self.nodes[cur.0]
                    .children
                    .iter()
                    .copied()
                    .filter(|&c| self.nodes[c.0].is_internal())
                    .collect();
                if internals.len() != 1 {
                    break;
                }
                let only = internals[0];
                let labels: Vec<InetAddress> =
                    self.nodes[only.0].concrete_labels().collect();
                if labels.len() == 1 {
                    ss.route[i] = labels[0];
                    repaired += 1;
                }
                Some(only)
            } else {
                self.nodes[cur.0]
                    .children
                    .iter()
                    .copied()
                    .find(|&c| self.nodes[c.0].is_internal() && self.nodes[c.0].has_label(hop))
            };
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
        repaired
    }

    /// Repair the stored routes of every inserted subnet from the labels of
    /// the internal nodes on its own branch. Returns the number of repaired
    /// hops across all subnets.
    pub fn repair_all_routes(&mut self) -> usize {
        let mut repaired = 0;
        let sids: Vec<SubnetId> = self.leaf_of.keys().copied().collect();
        for sid in sids {
            // Resolve per-depth unambiguous labels before borrowing the
            // subnet mutably.
            let fills: Vec<Option<InetAddress>> = self
                .branch_path(sid)
                .iter()
                .map(|&node| {
                    let labels: Vec<InetAddress> =
                        self.nodes[node.0].concrete_labels().collect();
                    (labels.len() == 1).then(|| labels[0])
                })
                .collect();
            let Some(ss) = self.subnets[sid.0].as_mut() else {
                continue;
            };
            for (i, hop) in ss.route.iter_mut().enumerate() {
                if !hop.is_missing() {
                    continue;
                }
                if let Some(Some(label)) = fills.get(i) {
                    *hop = *label;
                    repaired += 1;
                }
            }
        }
        repaired
    }

    // ------------------------------------------------------------------
    // Pruning and leaf removal

    /// Walk upward from `start`, removing childless internal nodes without
    /// accumulated data. Stops at the first ancestor keeping a child, or at
    /// the root.
    fn prune_from(&mut self, start: NodeId) {
        let mut cur = start;
        while cur != self.root {
            let node = &self.nodes[cur.0];
            if !node.children.is_empty()
                || node.kind == NodeType::Subnet
                || !node.routers.is_empty()
            {
                break;
            }
            let parent = node.parent.expect("non-root node has a parent");
            self.detach(cur);
            cur = parent;
        }
    }

    /// Detach every leaf's subnet into `sink`, pruning emptied branches.
    pub fn nullify_leaves(&mut self, sink: &mut SubnetSet) {
        let leaves: Vec<(SubnetId, NodeId)> =
            self.leaf_of.iter().map(|(&s, &n)| (s, n)).collect();
        for (sid, leaf) in leaves {
            if let Some(ss) = self.subnets[sid.0].take() {
                sink.add_site(ss);
            }
            let parent = self.nodes[leaf.0].parent;
            self.detach(leaf);
            self.leaf_of.remove(&sid);
            if let Some(parent) = parent {
                self.prune_from(parent);
            }
        }
        self.subnet_map.clear();
    }

    // ------------------------------------------------------------------
    // Trunk and grafting

    /// Labels of the main trunk: the unique-child prefix path from the
    /// root, one label set per depth starting at depth 1.
    pub fn trunk_labels(&self) -> Vec<Vec<InetAddress>> {
        let mut trunk = Vec::new();
        let mut cur = self.root;
        loop {
            let children = &self.nodes[cur.0].children;
            if children.len() != 1 {
                break;
            }
            let only = children[0];
            if !self.nodes[only.0].is_internal() {
                break;
            }
            trunk.push(self.nodes[only.0].labels.clone());
            cur = only;
        }
        trunk
    }

    pub fn trunk_size(&self) -> usize {
        self.trunk_labels().len()
    }

    /// True when some trunk node still carries the missing marker.
    pub fn has_incomplete_trunk(&self) -> bool {
        self.trunk_labels()
            .iter()
            .any(|labels| labels.iter().any(|l| l.is_missing()))
    }

    /// True iff the route is consistent with the trunk labels: at every
    /// depth inside the trunk the hop is either a hole or one of the trunk
    /// node's labels.
    pub fn fitting_route(&self, ss: &SubnetSite) -> bool {
        let trunk = self.trunk_labels();
        ss.route
            .iter()
            .zip(trunk.iter())
            .all(|(hop, labels)| hop.is_missing() || labels.contains(hop))
    }

    /// Search the trunk for the longest label run matching a slice of the
    /// route; on success returns `(old_prefix, new_prefix)` such that
    /// rewriting `old_prefix` into `new_prefix` transplants the route onto
    /// the trunk.
    pub fn find_transplantation(
        &self,
        ss: &SubnetSite,
    ) -> Option<(Vec<InetAddress>, Vec<InetAddress>)> {
        let trunk = self.trunk_labels();
        if trunk.is_empty() || ss.route.is_empty() {
            return None;
        }
        let route = &ss.route;
        let longest = trunk.len().min(route.len());
        for m in (1..=longest).rev() {
            for s in 0..=(route.len() - m) {
                for t in 0..=(trunk.len() - m) {
                    let matched = (0..m).all(|i| {
                        !route[s + i].is_missing() && trunk[t + i].contains(&route[s + i])
                    });
                    if !matched {
                        continue;
                    }
                    if s == 0 {
                        // Nothing before the matched run to rewrite.
                        continue;
                    }
                    let old: Vec<InetAddress> = route[..s].to_vec();
                    let new: Vec<InetAddress> = trunk[..t]
                        .iter()
                        .filter_map(|labels| {
                            labels.iter().copied().find(|l| !l.is_missing())
                        })
                        .collect();
                    if new.len() != t {
                        // A hole inside the replacement prefix: unusable.
                        continue;
                    }
                    if old == new {
                        continue;
                    }
                    return Some((old, new));
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Alias-resolution support

    /// Interface candidates per neighborhood: the node's concrete labels
    /// plus the ingress (contra-pivot) interfaces of its child subnets.
    /// The accompanying TTL is the node's depth.
    pub fn alias_candidates(&self) -> Vec<(NodeId, u8, Vec<InetAddress>)> {
        let mut out = Vec::new();
        self.walk_internals(self.root, &mut |tree, id| {
            let node = &tree.nodes[id.0];
            let mut candidates: Vec<InetAddress> = node.concrete_labels().collect();
            for &child in &node.children {
                if let Some(sid) = tree.nodes[child.0].subnet {
                    if let Some(ss) = tree.subnet(sid) {
                        candidates.extend(ss.ingress_interfaces());
                    }
                }
            }
            candidates.sort();
            candidates.dedup();
            if !candidates.is_empty() {
                out.push((id, node.depth as u8, candidates));
            }
        });
        out
    }

    /// Run alias resolution for every neighborhood, attaching the inferred
    /// routers to their internal node.
    pub fn infer_routers(&mut self, resolver: &AliasResolver<'_>) {
        for (id, _, candidates) in self.alias_candidates() {
            let routers = resolver.resolve_neighborhood(&candidates);
            self.nodes[id.0].routers = routers;
        }
    }

    pub fn routers_of(&self, id: NodeId) -> &[crate::alias::Router] {
        &self.nodes[id.0].routers
    }

    pub fn attach_router(&mut self, id: NodeId, router: crate::alias::Router) {
        self.nodes[id.0].routers.push(router);
    }

    /// Internal nodes in depth-first pre-order.
    pub fn internal_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_internals(self.root, &mut |_, id| out.push(id));
        out
    }

    fn walk_internals(&self, cur: NodeId, visit: &mut impl FnMut(&Self, NodeId)) {
        if self.nodes[cur.0].is_internal() {
            visit(self, cur);
        }
        let children = self.nodes[cur.0].children.clone();
        for child in children {
            self.walk_internals(child, visit);
        }
    }

    // ------------------------------------------------------------------
    // Statistics

    pub fn statistics(&self) -> TreeStatistics {
        let mut stats = TreeStatistics::default();
        self.walk_internals(self.root, &mut |tree, id| {
            let node = &tree.nodes[id.0];
            stats.neighborhoods += 1;

            let child_subnets: Vec<&SubnetSite> = node
                .children
                .iter()
                .filter_map(|&c| tree.nodes[c.0].subnet)
                .filter_map(|sid| tree.subnet(sid))
                .collect();
            let child_internals: Vec<NodeId> = node
                .children
                .iter()
                .copied()
                .filter(|&c| tree.nodes[c.0].is_internal())
                .collect();

            if child_internals.is_empty() && !node.children.is_empty() {
                stats.only_subnet_children += 1;
            }

            // Linkage: each child neighborhood's ingress label should be an
            // interface of one of this neighborhood's subnets.
            let mut unlinked = 0usize;
            for &child in &child_internals {
                for label in tree.nodes[child.0].concrete_labels() {
                    let linked = child_subnets.iter().any(|s| s.has_interface(label));
                    if !linked {
                        unlinked += 1;
                    }
                }
            }
            if unlinked == 0 {
                stats.complete_linkage += 1;
            }
            if unlinked <= 2 {
                stats.partial_linkage += 1;
            }

            let all_covered = node
                .concrete_labels()
                .all(|label| tree.get_subnet_containing(label).is_some());
            if node.concrete_labels().next().is_some() && all_covered {
                stats.labels_in_subnets += 1;
            }
        });
        stats
    }
}

/// Buckets a subnet registers under: one per covered top-20-bit block.
fn subnet_buckets(ss: &SubnetSite) -> Vec<u32> {
    let first = ss.prefix().top20();
    let last = ss.upper_border().top20();
    if last < first {
        warn!(subnet = %ss, "subnet block wraps the address space; indexing first bucket only");
        return vec![first];
    }
    (first..=last).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnet::{SubnetInterface, SubnetStatus};

    fn ip(s: &str) -> InetAddress {
        s.parse().unwrap()
    }

    fn site_with_route(prefix: &str, len: u8, ttl: u8, route: &[&str]) -> SubnetSite {
        // The prefix address itself stands in as the pivot interface.
        let iface = SubnetInterface {
            ip: ip(prefix).prefix(len),
            ttl,
        };
        SubnetSite::new(
            ip(prefix),
            len,
            SubnetStatus::Accurate,
            ttl,
            vec![iface],
            route.iter().map(|h| ip(h)).collect(),
        )
        .unwrap()
    }

    fn child_labels(tree: &NetworkTree, id: NodeId) -> Vec<Vec<InetAddress>> {
        tree.node(id)
            .children
            .iter()
            .filter(|&&c| tree.node(c).is_internal())
            .map(|&c| tree.node(c).labels.clone())
            .collect()
    }

    #[test]
    fn test_insert_builds_branch() {
        let mut tree = NetworkTree::new(3);
        let ss = site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1", "3.0.0.1"]);
        let sid = tree.insert(ss);

        // The inserted subnet is reachable by following its route hops.
        let mut cur = tree.root();
        for hop in ["1.0.0.1", "2.0.0.1", "3.0.0.1"] {
            let next = tree
                .node(cur)
                .children
                .iter()
                .copied()
                .find(|&c| tree.node(c).has_label(ip(hop)))
                .expect("hop node exists");
            cur = next;
        }
        let leaf = tree.node(cur).children[0];
        assert_eq!(tree.node(leaf).subnet, Some(sid));
        assert_eq!(tree.nodes_at_depth(1).len(), 1);
        assert_eq!(tree.nodes_at_depth(3).len(), 1);
    }

    #[test]
    fn test_shared_prefix_reused() {
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 3, &["1.0.0.1", "2.0.0.1"]));
        tree.insert(site_with_route("10.0.1.0", 24, 3, &["1.0.0.1", "2.0.0.2"]));

        // One node at depth 1, two at depth 2.
        assert_eq!(tree.nodes_at_depth(1).len(), 1);
        assert_eq!(tree.nodes_at_depth(2).len(), 2);
    }

    #[test]
    fn test_load_balancing_fusion_into_hedera() {
        // Same subnet measured along [A, B] and [A, C]: B and C fuse.
        let mut tree = NetworkTree::new(2);
        tree.insert(site_with_route("10.0.0.0", 24, 3, &["1.0.0.1", "2.0.0.1"]));
        tree.insert(site_with_route("10.0.0.0", 24, 3, &["1.0.0.1", "2.0.0.2"]));

        let root_children = &tree.node(tree.root()).children;
        assert_eq!(root_children.len(), 1);
        let a = root_children[0];
        assert_eq!(tree.node(a).labels, vec![ip("1.0.0.1")]);

        let a_children = &tree.node(a).children;
        assert_eq!(a_children.len(), 1);
        let hedera = a_children[0];
        assert_eq!(tree.node(hedera).kind, NodeType::Hedera);
        assert!(tree.node(hedera).has_label(ip("2.0.0.1")));
        assert!(tree.node(hedera).has_label(ip("2.0.0.2")));

        // One subnet leaf per insertion.
        let leaves: Vec<_> = tree
            .node(hedera)
            .children
            .iter()
            .filter(|&&c| tree.node(c).is_leaf())
            .collect();
        assert_eq!(leaves.len(), 2);
    }

    #[test]
    fn test_fusion_absorbs_existing_sibling() {
        // A->B and A->C exist as separate branches; re-measuring the first
        // subnet through C proves B and C equivalent.
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1", "3.0.0.1"]));
        tree.insert(site_with_route("10.0.9.0", 24, 4, &["1.0.0.1", "2.0.0.2", "3.0.0.9"]));
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.2", "3.0.0.1"]));

        let a = tree.node(tree.root()).children[0];
        let merged = child_labels(&tree, a);
        assert_eq!(merged.len(), 1, "B and C fused under A");
        assert!(merged[0].contains(&ip("2.0.0.1")));
        assert!(merged[0].contains(&ip("2.0.0.2")));

        let hedera = tree.node(a).children[0];
        // Both deeper branches now hang under the hedera.
        let deeper = child_labels(&tree, hedera);
        assert_eq!(deeper.len(), 2);
    }

    #[test]
    fn test_missing_hop_descends_into_existing_branch() {
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1", "3.0.0.1"]));
        tree.insert(site_with_route("10.0.1.0", 24, 4, &["1.0.0.1", "0.0.0.0", "3.0.0.1"]));

        // No second node created at depth 2.
        assert_eq!(tree.nodes_at_depth(2).len(), 1);
        assert_eq!(tree.subnet_count(), 2);
    }

    #[test]
    fn test_repair_route_from_branch_labels() {
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1", "3.0.0.1"]));

        let mut ss = site_with_route("10.0.1.0", 24, 4, &["1.0.0.1", "0.0.0.0", "3.0.0.1"]);
        assert_eq!(tree.repair_route(&mut ss), 1);
        assert_eq!(
            ss.route,
            vec![ip("1.0.0.1"), ip("2.0.0.1"), ip("3.0.0.1")]
        );
    }

    #[test]
    fn test_repair_all_routes_after_insertion() {
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1", "3.0.0.1"]));
        let sid = tree.insert(site_with_route("10.0.1.0", 24, 4, &["1.0.0.1", "0.0.0.0", "3.0.0.1"]));

        assert_eq!(tree.repair_all_routes(), 1);
        let repaired = tree.subnet(sid).unwrap();
        assert_eq!(
            repaired.route,
            vec![ip("1.0.0.1"), ip("2.0.0.1"), ip("3.0.0.1")]
        );
    }

    #[test]
    fn test_trunk_and_fitting_route() {
        let mut tree = NetworkTree::new(4);
        tree.insert(site_with_route("10.0.0.0", 24, 5, &["1.0.0.1", "2.0.0.1", "3.0.0.1"]));

        let trunk = tree.trunk_labels();
        assert_eq!(trunk.len(), 3);
        assert_eq!(tree.trunk_size(), 3);
        assert_eq!(trunk[0], vec![ip("1.0.0.1")]);
        assert!(!tree.has_incomplete_trunk());

        let fitting = site_with_route("10.0.1.0", 24, 5, &["1.0.0.1", "2.0.0.1", "3.0.0.9"]);
        assert!(tree.fitting_route(&fitting));
        let unfitting = site_with_route("10.0.1.0", 24, 5, &["9.0.0.1", "2.0.0.1"]);
        assert!(!tree.fitting_route(&unfitting));
    }

    #[test]
    fn test_find_transplantation() {
        // Trunk [A, B, C]; route [A', B, C, X].
        let mut tree = NetworkTree::new(4);
        tree.insert(site_with_route(
            "10.0.0.0",
            24,
            5,
            &["1.0.0.1", "2.0.0.1", "3.0.0.1", "4.0.0.1"],
        ));
        // Trunk is only unique-child prefix: depth 1..4 here.
        let ss = site_with_route(
            "10.0.1.0",
            24,
            5,
            &["9.0.0.1", "2.0.0.1", "3.0.0.1", "4.0.0.9"],
        );
        let (old, new) = tree.find_transplantation(&ss).expect("transplantation found");
        assert_eq!(old, vec![ip("9.0.0.1")]);
        assert_eq!(new, vec![ip("1.0.0.1")]);
    }

    #[test]
    fn test_transplantation_none_when_fitting() {
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1"]));
        let ss = site_with_route("10.0.1.0", 24, 4, &["1.0.0.1", "2.0.0.1"]);
        assert!(tree.fitting_route(&ss));
        assert!(tree.find_transplantation(&ss).is_none());
    }

    #[test]
    fn test_nullify_leaves_returns_subnets_and_prunes() {
        let mut tree = NetworkTree::new(3);
        tree.insert(site_with_route("10.0.0.0", 24, 4, &["1.0.0.1", "2.0.0.1"]));
        tree.insert(site_with_route("10.0.1.0", 24, 4, &["1.0.0.1", "2.0.0.2"]));

        let mut sink = SubnetSet::new();
        tree.nullify_leaves(&mut sink);

        assert_eq!(sink.len(), 2);
        assert_eq!(tree.subnet_count(), 0);
        assert!(tree.is_empty());
        for depth in 1..=3 {
            assert!(tree.nodes_at_depth(depth).is_empty());
        }
    }

    #[test]
    fn test_statistics() {
        let mut tree = NetworkTree::new(3);
        // Neighborhood at depth 2 has the deeper neighborhood's label
        // 3.0.0.1 listed as an interface of its child subnet.
        let parent_subnet = SubnetSite::new(
            ip("3.0.0.0"),
            24,
            SubnetStatus::Accurate,
            3,
            vec![
                SubnetInterface { ip: ip("3.0.0.1"), ttl: 2 },
                SubnetInterface { ip: ip("3.0.0.7"), ttl: 3 },
            ],
            vec![ip("1.0.0.1"), ip("2.0.0.1")],
        )
        .unwrap();
        tree.insert(parent_subnet);
        tree.insert(site_with_route(
            "10.0.0.0",
            24,
            4,
            &["1.0.0.1", "2.0.0.1", "3.0.0.1"],
        ));

        let stats = tree.statistics();
        assert_eq!(stats.neighborhoods, 3);
        // Deepest neighborhood has only a subnet child.
        assert!(stats.only_subnet_children >= 1);
        // The depth-2 neighborhood links its child neighborhood completely.
        assert!(stats.complete_linkage >= 1);
        assert!(stats.partial_linkage >= stats.complete_linkage);
    }

    #[test]
    fn test_get_subnet_containing() {
        let mut tree = NetworkTree::new(2);
        tree.insert(site_with_route("10.0.0.0", 24, 3, &["1.0.0.1", "2.0.0.1"]));
        assert!(tree.get_subnet_containing(ip("10.0.0.200")).is_some());
        assert!(tree.get_subnet_containing(ip("10.0.1.200")).is_none());
    }
}
