use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{OrgError, OrgResult};
use crate::model::edge::{EmployeeId, NewEdge, SupervisorEdge};
use crate::model::node::EmployeeNode;
use crate::store::edges::EdgeStore;
use crate::store::membership::MembershipOracle;

pub mod tree;

pub use tree::build_tree;

// ---------------------------------------------------------------------------
// EdgeInsertion: outcome of an add-edge request
// ---------------------------------------------------------------------------

/// Why an edge was or was not added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EdgeInsertion {
    /// The edge was persisted.
    Added { edge: SupervisorEdge },
    /// Supervisor and employee are the same person.
    SelfSupervision,
    /// The employee already reports to someone.
    AlreadySupervised { supervisor_id: EmployeeId },
    /// One of the two employees is already below the other.
    WouldCreateCycle,
}

impl EdgeInsertion {
    pub fn is_added(&self) -> bool {
        matches!(self, EdgeInsertion::Added { .. })
    }

    /// Stable machine-readable code for rejections.
    pub fn code(&self) -> &'static str {
        match self {
            EdgeInsertion::Added { .. } => "ADDED",
            EdgeInsertion::SelfSupervision => "SELF_SUPERVISION",
            EdgeInsertion::AlreadySupervised { .. } => "ALREADY_SUPERVISED",
            EdgeInsertion::WouldCreateCycle => "WOULD_CREATE_CYCLE",
        }
    }
}

// ---------------------------------------------------------------------------
// HierarchyManager
// ---------------------------------------------------------------------------

/// Maintains the supervisor forest on top of an [`EdgeStore`].
///
/// Reads go straight to the store. Mutations hold `writes` across their
/// check-then-act sequence so two adds through one manager cannot both pass
/// a stale cycle check; the store's single-parent constraint backs this up
/// for writers outside the process.
pub struct HierarchyManager {
    edges: Arc<dyn EdgeStore>,
    membership: Arc<dyn MembershipOracle>,
    writes: Mutex<()>,
}

impl HierarchyManager {
    pub fn new(edges: Arc<dyn EdgeStore>, membership: Arc<dyn MembershipOracle>) -> Self {
        Self {
            edges,
            membership,
            writes: Mutex::new(()),
        }
    }

    /// Direct-report edges of an employee.
    pub async fn get_subordinates(&self, employee_id: EmployeeId) -> OrgResult<Vec<SupervisorEdge>> {
        self.edges.find_by_supervisor(employee_id).await
    }

    /// The supervisor of an employee, or `None` for a forest root.
    pub async fn get_supervisor(&self, employee_id: EmployeeId) -> OrgResult<Option<EmployeeId>> {
        self.edges.find_supervisor_of(employee_id).await
    }

    /// Every edge below an employee.
    pub async fn get_subtree(&self, employee_id: EmployeeId) -> OrgResult<Vec<SupervisorEdge>> {
        self.edges.find_descendants(employee_id).await
    }

    /// Materialize the reporting tree rooted at an employee.
    pub async fn build_employee_tree(&self, employee_id: EmployeeId) -> OrgResult<EmployeeNode> {
        let subtree = self.edges.find_descendants(employee_id).await?;
        Ok(build_tree(employee_id, &subtree))
    }

    /// Supervisors from the direct one up to the root of the employee's tree.
    pub async fn chain_of_command(&self, employee_id: EmployeeId) -> OrgResult<Vec<EmployeeId>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([employee_id]);
        let mut current = employee_id;

        while let Some(supervisor) = self.edges.find_supervisor_of(current).await? {
            if !seen.insert(supervisor) {
                break;
            }
            chain.push(supervisor);
            current = supervisor;
        }

        Ok(chain)
    }

    /// Whether the employee is part of any reporting edge.
    pub async fn in_hierarchy(&self, employee_id: EmployeeId) -> OrgResult<bool> {
        self.edges.exists_involving(employee_id).await
    }

    /// Whether the employee belongs to the given company.
    pub async fn employee_exists(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool> {
        self.membership.exists(company, employee_id).await
    }

    /// Add `supervisor_id -> employee_id`, reporting why it was refused.
    ///
    /// Nothing is written unless the result is [`EdgeInsertion::Added`].
    pub async fn try_add_edge(
        &self,
        supervisor_id: EmployeeId,
        employee_id: EmployeeId,
    ) -> OrgResult<EdgeInsertion> {
        if supervisor_id == employee_id {
            debug!(employee_id, "rejecting self-supervision");
            return Ok(EdgeInsertion::SelfSupervision);
        }

        let _guard = self.writes.lock().await;

        if let Some(existing) = self.edges.find_supervisor_of(employee_id).await? {
            debug!(employee_id, supervisor_id = existing, "employee already has a supervisor");
            return Ok(EdgeInsertion::AlreadySupervised {
                supervisor_id: existing,
            });
        }

        if self.is_below(supervisor_id, employee_id).await?
            || self.is_below(employee_id, supervisor_id).await?
        {
            debug!(supervisor_id, employee_id, "edge would create a cycle");
            return Ok(EdgeInsertion::WouldCreateCycle);
        }

        match self.edges.save(NewEdge::new(supervisor_id, employee_id)).await {
            Ok(edge) => {
                info!(supervisor_id, employee_id, edge_id = %edge.id, "edge added");
                Ok(EdgeInsertion::Added { edge })
            }
            Err(OrgError::AlreadySupervised { supervisor_id, .. }) => {
                debug!(employee_id, supervisor_id, "store refused second supervisor");
                Ok(EdgeInsertion::AlreadySupervised { supervisor_id })
            }
            Err(err) => Err(err),
        }
    }

    /// Add `supervisor_id -> employee_id`; `false` on any rule violation.
    pub async fn add_employee_supervisor_edge(
        &self,
        supervisor_id: EmployeeId,
        employee_id: EmployeeId,
    ) -> OrgResult<bool> {
        Ok(self.try_add_edge(supervisor_id, employee_id).await?.is_added())
    }

    /// Detach an employee from their supervisor. The employee's own reports
    /// stay attached to them. `false` if there was no supervisor.
    pub async fn remove_employee_supervisor_edge(&self, employee_id: EmployeeId) -> OrgResult<bool> {
        let _guard = self.writes.lock().await;

        let Some(supervisor_id) = self.edges.find_supervisor_of(employee_id).await? else {
            debug!(employee_id, "employee has no supervisor");
            return Ok(false);
        };

        let edge = self
            .edges
            .find_by_supervisor(supervisor_id)
            .await?
            .into_iter()
            .find(|edge| edge.subordinate_id == employee_id);

        match edge {
            Some(edge) => {
                self.edges.delete(&edge).await?;
                info!(supervisor_id, employee_id, edge_id = %edge.id, "edge removed");
                Ok(true)
            }
            None => {
                debug!(supervisor_id, employee_id, "supervisor edge vanished before removal");
                Ok(false)
            }
        }
    }

    /// Whether `employee_id` is a subordinate somewhere in `root_id`'s subtree.
    async fn is_below(&self, employee_id: EmployeeId, root_id: EmployeeId) -> OrgResult<bool> {
        let subtree = self.edges.find_descendants(root_id).await?;
        Ok(subtree.iter().any(|edge| edge.subordinate_id == employee_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::edges::InMemoryEdgeStore;
    use crate::store::membership::{InMemoryMembership, MockMembershipOracle};

    fn manager() -> (HierarchyManager, Arc<InMemoryEdgeStore>) {
        let edges = Arc::new(InMemoryEdgeStore::new());
        let manager = HierarchyManager::new(edges.clone(), Arc::new(InMemoryMembership::new()));
        (manager, edges)
    }

    async fn manager_with(
        pairs: &[(EmployeeId, EmployeeId)],
    ) -> (HierarchyManager, Arc<InMemoryEdgeStore>) {
        let (manager, edges) = manager();
        for &(sup, sub) in pairs {
            assert!(manager.add_employee_supervisor_edge(sup, sub).await.unwrap());
        }
        (manager, edges)
    }

    async fn snapshot(edges: &InMemoryEdgeStore) -> Vec<(EmployeeId, EmployeeId)> {
        let mut pairs: Vec<_> = edges
            .all_edges()
            .await
            .into_iter()
            .map(|e| (e.supervisor_id, e.subordinate_id))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    #[tokio::test]
    async fn test_add_succeeds_on_empty_hierarchy() {
        let (manager, _) = manager();
        assert!(manager.add_employee_supervisor_edge(1, 2).await.unwrap());

        assert_eq!(manager.get_supervisor(2).await.unwrap(), Some(1));
        let subordinates = manager.get_subordinates(1).await.unwrap();
        assert_eq!(subordinates.len(), 1);
        assert_eq!(subordinates[0].supervisor_id, 1);
        assert_eq!(subordinates[0].subordinate_id, 2);
    }

    #[tokio::test]
    async fn test_add_rejects_existing_supervisor() {
        let (manager, edges) = manager_with(&[(1, 2)]).await;
        let before = snapshot(&edges).await;

        assert!(!manager.add_employee_supervisor_edge(3, 2).await.unwrap());
        assert_eq!(
            manager.try_add_edge(3, 2).await.unwrap(),
            EdgeInsertion::AlreadySupervised { supervisor_id: 1 }
        );
        assert_eq!(snapshot(&edges).await, before);
    }

    #[tokio::test]
    async fn test_add_rejects_direct_cycle() {
        let (manager, edges) = manager_with(&[(1, 2)]).await;
        assert!(!manager.add_employee_supervisor_edge(2, 1).await.unwrap());
        assert_eq!(
            manager.try_add_edge(2, 1).await.unwrap(),
            EdgeInsertion::WouldCreateCycle
        );
        assert_eq!(snapshot(&edges).await, vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_add_rejects_indirect_cycle() {
        let (manager, edges) = manager_with(&[(1, 2), (2, 3)]).await;
        assert!(!manager.add_employee_supervisor_edge(3, 1).await.unwrap());
        assert_eq!(snapshot(&edges).await, vec![(1, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_add_rejects_self_supervision() {
        let (manager, edges) = manager();
        assert_eq!(
            manager.try_add_edge(4, 4).await.unwrap(),
            EdgeInsertion::SelfSupervision
        );
        assert!(snapshot(&edges).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_round_trip() {
        let (manager, _) = manager_with(&[(1, 2)]).await;
        assert!(manager.remove_employee_supervisor_edge(2).await.unwrap());
        assert_eq!(manager.get_supervisor(2).await.unwrap(), None);
        assert!(manager.get_subordinates(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_without_supervisor_is_noop() {
        let (manager, edges) = manager_with(&[(1, 2)]).await;
        assert!(!manager.remove_employee_supervisor_edge(1).await.unwrap());
        assert!(!manager.remove_employee_supervisor_edge(99).await.unwrap());
        assert_eq!(snapshot(&edges).await, vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_remove_keeps_subtree_as_new_root() {
        let (manager, _) = manager_with(&[(1, 2), (2, 3), (2, 4)]).await;
        assert!(manager.remove_employee_supervisor_edge(2).await.unwrap());

        let tree = manager.build_employee_tree(2).await.unwrap();
        assert_eq!(tree.child_ids(), vec![3, 4]);
        assert_eq!(manager.get_supervisor(2).await.unwrap(), None);
        assert!(manager.build_employee_tree(1).await.unwrap().is_leaf());

        // Re-attaching elsewhere is remove-then-add.
        assert!(manager.add_employee_supervisor_edge(4, 1).await.unwrap());
        assert_eq!(manager.chain_of_command(1).await.unwrap(), vec![4, 2]);
    }

    #[tokio::test]
    async fn test_tree_materialization_shape() {
        let (manager, _) = manager_with(&[(1, 2), (1, 3), (2, 4), (2, 5), (3, 6)]).await;
        let root = manager.build_employee_tree(1).await.unwrap();

        assert_eq!(root.id, 1);
        assert_eq!(root.child_ids(), vec![2, 3]);
        assert_eq!(root.find(2).unwrap().child_ids(), vec![4, 5]);
        assert_eq!(root.find(3).unwrap().child_ids(), vec![6]);
        for leaf in [4, 5, 6] {
            assert!(root.find(leaf).unwrap().is_leaf());
        }
    }

    #[tokio::test]
    async fn test_tree_of_leaf_is_root_only() {
        let (manager, _) = manager_with(&[(1, 2)]).await;
        assert_eq!(manager.build_employee_tree(2).await.unwrap(), EmployeeNode::new(2));
        assert_eq!(manager.build_employee_tree(77).await.unwrap(), EmployeeNode::new(77));
    }

    #[tokio::test]
    async fn test_tree_of_deep_chain() {
        let (manager, edges) = manager();
        let depth = 50_000;
        for id in 0..depth {
            edges.save(NewEdge::new(id, id + 1)).await.unwrap();
        }

        let tree = manager.build_employee_tree(0).await.unwrap();
        assert_eq!(tree.depth(), depth as usize);
        assert!(tree.find(depth).unwrap().is_leaf());
        assert_eq!(manager.chain_of_command(depth).await.unwrap().len(), depth as usize);
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let (manager, _) = manager_with(&[(1, 2), (1, 3), (3, 4)]).await;

        assert_eq!(
            manager.get_subordinates(1).await.unwrap(),
            manager.get_subordinates(1).await.unwrap()
        );
        assert_eq!(
            manager.get_supervisor(4).await.unwrap(),
            manager.get_supervisor(4).await.unwrap()
        );
        assert_eq!(
            manager.get_subtree(1).await.unwrap(),
            manager.get_subtree(1).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_chain_of_command() {
        let (manager, _) = manager_with(&[(1, 2), (2, 3), (3, 4)]).await;
        assert_eq!(manager.chain_of_command(4).await.unwrap(), vec![3, 2, 1]);
        assert!(manager.chain_of_command(1).await.unwrap().is_empty());
        assert!(manager.in_hierarchy(4).await.unwrap());
        assert!(!manager.in_hierarchy(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_every_pairing_keeps_a_forest() {
        let (manager, edges) = manager();
        for sup in 1..=6 {
            for sub in (1..=6).rev() {
                manager.add_employee_supervisor_edge(sup, sub).await.unwrap();
            }
        }

        let pairs = snapshot(&edges).await;
        let mut parents = HashSet::new();
        for &(_, sub) in &pairs {
            assert!(parents.insert(sub), "employee {} has two supervisors", sub);
        }
        for id in 1..=6 {
            let chain = manager.chain_of_command(id).await.unwrap();
            assert!(!chain.contains(&id), "employee {} supervises themself", id);
        }
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_single_parent() {
        let (manager, edges) = manager();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (10..20)
            .map(|sup| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.add_employee_supervisor_edge(sup, 1).await })
            })
            .collect();

        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                added += 1;
            }
        }
        assert_eq!(added, 1);
        assert_eq!(snapshot(&edges).await.len(), 1);
    }

    #[tokio::test]
    async fn test_employee_exists_delegates_to_membership() {
        let mut membership = MockMembershipOracle::new();
        membership
            .expect_exists()
            .times(2)
            .returning(|company, employee_id| Ok(company == "acme" && employee_id == 7));

        let manager = HierarchyManager::new(Arc::new(InMemoryEdgeStore::new()), Arc::new(membership));
        assert!(manager.employee_exists("acme", 7).await.unwrap());
        assert!(!manager.employee_exists("globex", 7).await.unwrap());
    }
}
