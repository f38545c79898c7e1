use serde::{Deserialize, Serialize};

use crate::model::edge::EmployeeId;

/// A node in a materialized reporting tree.
///
/// Built fresh from the edge set on every query and owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeNode {
    pub id: EmployeeId,
    /// Direct reports, in the order the subtree query returned their edges.
    pub children: Vec<EmployeeNode>,
}

impl EmployeeNode {
    pub fn new(id: EmployeeId) -> Self {
        Self {
            id,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Ids of the direct reports.
    pub fn child_ids(&self) -> Vec<EmployeeId> {
        self.children.iter().map(|c| c.id).collect()
    }

    /// Find a node anywhere in this tree, depth first.
    pub fn find(&self, id: EmployeeId) -> Option<&EmployeeNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.id == id {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Number of nodes in the tree, root included.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Length of the longest root-to-leaf path, counted in edges.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0)];
        while let Some((node, level)) = stack.pop() {
            deepest = deepest.max(level);
            stack.extend(node.children.iter().map(|child| (child, level + 1)));
        }
        deepest
    }

    /// Render as JSON, with the same shape as the `Serialize` derive.
    ///
    /// The derive recurses once per level; this walks an explicit stack so
    /// arbitrarily deep hierarchies can be returned over HTTP.
    pub fn to_json(&self) -> String {
        enum Step<'a> {
            Open(&'a EmployeeNode),
            Separator,
            Close,
        }

        let mut out = String::new();
        let mut stack = vec![Step::Open(self)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(node) => {
                    out.push_str("{\"id\":");
                    out.push_str(&node.id.to_string());
                    out.push_str(",\"children\":[");
                    stack.push(Step::Close);
                    for (index, child) in node.children.iter().enumerate().rev() {
                        stack.push(Step::Open(child));
                        if index > 0 {
                            stack.push(Step::Separator);
                        }
                    }
                }
                Step::Separator => out.push(','),
                Step::Close => out.push_str("]}"),
            }
        }
        out
    }
}

impl Drop for EmployeeNode {
    // Flatten before dropping so deep trees don't recurse in drop glue.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}
