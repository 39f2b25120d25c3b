//! Points-to Graph
//!
//! Representative node → set of object nodes. The graph is created empty by
//! the populator and filled by the solver, which always addresses it through
//! merge representatives.

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::node::NodeId;
use crate::features::points_to::infrastructure::sparse_bitmap::PointsToSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PointsToGraph {
    points_to: FxHashMap<NodeId, PointsToSet>,
}

/// Statistics about the points-to graph
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_points_to_size: usize,
}

impl PointsToGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Points-to Set Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Add an object to a node's points-to set
    ///
    /// Returns true if the set changed (for worklist propagation)
    #[inline]
    pub fn add(&mut self, node: NodeId, object: NodeId) -> bool {
        self.points_to.entry(node).or_default().insert(object)
    }

    /// pts(node) ∪= set. Returns true if the set changed.
    pub fn add_all(&mut self, node: NodeId, set: &PointsToSet) -> bool {
        if set.is_empty() {
            return false;
        }
        self.points_to.entry(node).or_default().union_with(set)
    }

    /// pts(dst) ∪= pts(src). Returns true if dst changed.
    pub fn copy(&mut self, dst: NodeId, src: NodeId) -> bool {
        if dst == src {
            return false;
        }
        let Some(source) = self.points_to.get(&src).cloned() else {
            return false;
        };
        self.add_all(dst, &source)
    }

    /// Fold `from`'s set into `into` after the two nodes were merged
    pub fn merge(&mut self, into: NodeId, from: NodeId) -> bool {
        if into == from {
            return false;
        }
        match self.points_to.remove(&from) {
            Some(set) => self.add_all(into, &set),
            None => false,
        }
    }

    #[inline]
    pub fn get(&self, node: NodeId) -> Option<&PointsToSet> {
        self.points_to.get(&node)
    }

    pub fn points_to(&self, node: NodeId, object: NodeId) -> bool {
        self.get(node).is_some_and(|set| set.contains(object))
    }

    /// Two nodes may alias when their points-to sets intersect
    pub fn may_alias(&self, a: NodeId, b: NodeId) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(sa), Some(sb)) => sa.intersects(sb),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.points_to.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_to.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PointsToSet)> {
        self.points_to.iter().map(|(&node, set)| (node, set))
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            total_nodes: self.points_to.len(),
            ..GraphStats::default()
        };
        for set in self.points_to.values() {
            let size = set.len();
            stats.total_edges += size;
            stats.max_points_to_size = stats.max_points_to_size.max(size);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_alias() {
        let mut graph = PointsToGraph::new();
        assert!(graph.add(10, 20));
        assert!(!graph.add(10, 20));
        graph.add(11, 20);
        graph.add(12, 21);

        assert!(graph.points_to(10, 20));
        assert!(graph.may_alias(10, 11));
        assert!(!graph.may_alias(10, 12));
        assert!(!graph.may_alias(10, 99));
    }

    #[test]
    fn test_copy_and_merge() {
        let mut graph = PointsToGraph::new();
        graph.add(1, 100);
        graph.add(2, 200);

        assert!(graph.copy(3, 1));
        assert!(!graph.copy(3, 1));
        assert!(graph.merge(3, 2));
        assert!(graph.get(2).is_none());

        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_edges, 3);
        assert_eq!(stats.max_points_to_size, 2);
    }
}
