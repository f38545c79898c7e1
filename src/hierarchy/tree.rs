use std::collections::{HashMap, HashSet};

use crate::model::edge::{EmployeeId, SupervisorEdge};
use crate::model::node::EmployeeNode;

/// Fold a subtree edge list into a tree rooted at `root_id`.
///
/// Children keep the order in which their edges appear in `edges`. The root
/// is always present, so an employee with no reports yields a childless node.
/// Edges that do not hang below `root_id` are ignored, and an employee that
/// is reached twice is only placed the first time.
///
/// Works with an explicit stack, so hierarchy depth is bounded by memory
/// rather than by the thread's call stack.
pub fn build_tree(root_id: EmployeeId, edges: &[SupervisorEdge]) -> EmployeeNode {
    let mut reports: HashMap<EmployeeId, Vec<EmployeeId>> = HashMap::new();
    for edge in edges {
        reports
            .entry(edge.supervisor_id)
            .or_default()
            .push(edge.subordinate_id);
    }

    // Pre-order walk: every placed employee appears after its supervisor.
    let mut placed = HashSet::from([root_id]);
    let mut order = Vec::new();
    let mut kept: HashMap<EmployeeId, Vec<EmployeeId>> = HashMap::new();
    let mut stack = vec![root_id];

    while let Some(id) = stack.pop() {
        order.push(id);
        let Some(children) = reports.get(&id) else {
            continue;
        };
        let children: Vec<EmployeeId> = children
            .iter()
            .copied()
            .filter(|&child| placed.insert(child))
            .collect();
        stack.extend(children.iter().rev());
        kept.insert(id, children);
    }

    // Assemble bottom-up so each node's children are finished before it.
    let mut built: HashMap<EmployeeId, EmployeeNode> = HashMap::new();
    for &id in order.iter().rev() {
        let mut node = EmployeeNode::new(id);
        if let Some(children) = kept.remove(&id) {
            node.children = children
                .into_iter()
                .filter_map(|child| built.remove(&child))
                .collect();
        }
        built.insert(id, node);
    }

    built
        .remove(&root_id)
        .unwrap_or_else(|| EmployeeNode::new(root_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::edge::NewEdge;

    fn edges(pairs: &[(EmployeeId, EmployeeId)]) -> Vec<SupervisorEdge> {
        pairs
            .iter()
            .map(|&(sup, sub)| NewEdge::new(sup, sub).into_edge())
            .collect()
    }

    #[test]
    fn test_leaf_root_is_seeded() {
        let tree = build_tree(9, &[]);
        assert_eq!(tree, EmployeeNode::new(9));
    }

    #[test]
    fn test_children_follow_edge_order() {
        let tree = build_tree(1, &edges(&[(1, 3), (1, 2), (3, 7)]));
        assert_eq!(tree.child_ids(), vec![3, 2]);
        assert_eq!(tree.children[0].child_ids(), vec![7]);
        assert!(tree.children[1].is_leaf());
    }

    #[test]
    fn test_corrupt_cycle_terminates() {
        let tree = build_tree(1, &edges(&[(1, 2), (2, 3), (3, 1)]));
        assert_eq!(tree.size(), 3);
        assert!(tree.find(3).unwrap().is_leaf());
    }

    #[test]
    fn test_shared_report_is_placed_once() {
        // 4 listed under both 2 and 3; only the first placement counts.
        let tree = build_tree(1, &edges(&[(1, 2), (1, 3), (2, 4), (3, 4)]));
        assert_eq!(tree.size(), 4);
        assert_eq!(tree.find(2).unwrap().child_ids(), vec![4]);
        assert!(tree.find(3).unwrap().is_leaf());
    }

    #[test]
    fn test_deep_chain_does_not_exhaust_stack() {
        let depth = 50_000;
        let chain: Vec<_> = (0..depth).map(|i| (i, i + 1)).collect();
        let tree = build_tree(0, &edges(&chain));

        assert_eq!(tree.depth(), depth as usize);
        assert_eq!(tree.size(), depth as usize + 1);
        assert!(tree.find(depth).unwrap().is_leaf());
    }
}
