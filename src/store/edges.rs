use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{is_unique_violation, OrgDatabase};
use crate::error::{OrgError, OrgResult};
use crate::model::edge::{EdgeId, EmployeeId, NewEdge, SupervisorEdge};

// ---------------------------------------------------------------------------
// EdgeStore trait: persistence for supervisor -> subordinate edges
// ---------------------------------------------------------------------------

/// Storage backend for the reporting edges of every company.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Direct-report edges of a supervisor, in insertion order.
    async fn find_by_supervisor(&self, supervisor_id: EmployeeId)
        -> OrgResult<Vec<SupervisorEdge>>;

    /// The supervisor of an employee, if any.
    async fn find_supervisor_of(&self, employee_id: EmployeeId) -> OrgResult<Option<EmployeeId>>;

    /// Whether the employee is on either end of any edge.
    async fn exists_involving(&self, employee_id: EmployeeId) -> OrgResult<bool>;

    /// Persist a new edge, assigning its identity.
    async fn save(&self, edge: NewEdge) -> OrgResult<SupervisorEdge>;

    /// Delete a previously saved edge.
    async fn delete(&self, edge: &SupervisorEdge) -> OrgResult<()>;

    /// Total number of edges.
    async fn edge_count(&self) -> OrgResult<usize>;

    /// Every edge reachable from `employee_id` by following supervisor ->
    /// subordinate links, breadth first.
    ///
    /// The default walks `find_by_supervisor` one level at a time. Each
    /// subordinate is expanded once even if the stored edges are corrupt.
    async fn find_descendants(&self, employee_id: EmployeeId) -> OrgResult<Vec<SupervisorEdge>> {
        let mut result = Vec::new();
        let mut expanded: HashSet<EmployeeId> = HashSet::new();
        let mut queue: VecDeque<EmployeeId> = VecDeque::new();

        queue.push_back(employee_id);
        expanded.insert(employee_id);

        while let Some(current) = queue.pop_front() {
            for edge in self.find_by_supervisor(current).await? {
                if expanded.insert(edge.subordinate_id) {
                    queue.push_back(edge.subordinate_id);
                }
                result.push(edge);
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// SurrealDB Edge Store
// ---------------------------------------------------------------------------

/// Row layout of the `reports_to` table.
#[derive(Debug, Serialize, Deserialize)]
struct EdgeRow {
    edge_id: String,
    supervisor_id: EmployeeId,
    subordinate_id: EmployeeId,
    created_at: String,
    seq: i64,
}

impl EdgeRow {
    fn from_edge(edge: &SupervisorEdge, seq: i64) -> Self {
        Self {
            edge_id: edge.id.to_string(),
            supervisor_id: edge.supervisor_id,
            subordinate_id: edge.subordinate_id,
            created_at: edge.created_at.to_rfc3339(),
            seq,
        }
    }

    fn into_edge(self) -> OrgResult<SupervisorEdge> {
        let id = Uuid::parse_str(&self.edge_id)
            .map_err(|e| OrgError::Storage(format!("Invalid edge id '{}': {}", self.edge_id, e)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| OrgError::Storage(format!("Invalid edge timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(SupervisorEdge {
            id,
            supervisor_id: self.supervisor_id,
            subordinate_id: self.subordinate_id,
            created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct MaxSeqRow {
    max_seq: Option<i64>,
}

/// SurrealDB-backed edge store. Descendants use the trait's level-by-level
/// walk over the indexed `supervisor_id` field.
#[derive(Clone)]
pub struct SurrealEdgeStore {
    db: Arc<OrgDatabase>,
    next_seq: Arc<AtomicI64>,
}

impl SurrealEdgeStore {
    /// Open the edge store, continuing the insertion sequence after the
    /// highest one already stored.
    pub async fn open(db: Arc<OrgDatabase>) -> OrgResult<Self> {
        let mut response = db
            .inner()
            .query("SELECT math::max(seq) AS max_seq FROM reports_to GROUP ALL")
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to read edge sequence: {}", e)))?;

        let rows: Vec<MaxSeqRow> = response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse edge sequence: {}", e)))?;

        let next = rows
            .first()
            .and_then(|row| row.max_seq)
            .map_or(0, |max| max + 1);

        Ok(Self {
            db,
            next_seq: Arc::new(AtomicI64::new(next)),
        })
    }
}

#[async_trait]
impl EdgeStore for SurrealEdgeStore {
    async fn find_by_supervisor(
        &self,
        supervisor_id: EmployeeId,
    ) -> OrgResult<Vec<SupervisorEdge>> {
        let mut response = self
            .db
            .inner()
            .query("SELECT * FROM reports_to WHERE supervisor_id = $supervisor_id ORDER BY seq ASC")
            .bind(("supervisor_id", supervisor_id))
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to query subordinates: {}", e)))?;

        let rows: Vec<EdgeRow> = response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse edge results: {}", e)))?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    async fn find_supervisor_of(&self, employee_id: EmployeeId) -> OrgResult<Option<EmployeeId>> {
        let mut response = self
            .db
            .inner()
            .query("SELECT VALUE supervisor_id FROM reports_to WHERE subordinate_id = $employee_id")
            .bind(("employee_id", employee_id))
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to query supervisor: {}", e)))?;

        let supervisors: Vec<EmployeeId> = response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse supervisor: {}", e)))?;

        Ok(supervisors.into_iter().next())
    }

    async fn exists_involving(&self, employee_id: EmployeeId) -> OrgResult<bool> {
        let mut response = self
            .db
            .inner()
            .query(
                "SELECT VALUE edge_id FROM reports_to \
                 WHERE supervisor_id = $employee_id OR subordinate_id = $employee_id LIMIT 1",
            )
            .bind(("employee_id", employee_id))
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to query edges: {}", e)))?;

        let ids: Vec<String> = response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse edge ids: {}", e)))?;

        Ok(!ids.is_empty())
    }

    async fn save(&self, edge: NewEdge) -> OrgResult<SupervisorEdge> {
        let edge = edge.into_edge();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let row = EdgeRow::from_edge(&edge, seq);

        let created = self
            .db
            .inner()
            .query("CREATE reports_to CONTENT $row")
            .bind(("row", row))
            .await
            .and_then(|response| response.check());

        match created {
            Ok(_) => Ok(edge),
            // Another writer attached this employee first.
            Err(e) if is_unique_violation(&e) => {
                match self.find_supervisor_of(edge.subordinate_id).await? {
                    Some(supervisor_id) => Err(OrgError::AlreadySupervised {
                        employee_id: edge.subordinate_id,
                        supervisor_id,
                    }),
                    None => Err(OrgError::Storage(format!("Failed to create edge: {}", e))),
                }
            }
            Err(e) => Err(OrgError::Storage(format!("Failed to create edge: {}", e))),
        }
    }

    async fn delete(&self, edge: &SupervisorEdge) -> OrgResult<()> {
        self.db
            .inner()
            .query("DELETE reports_to WHERE edge_id = $edge_id")
            .bind(("edge_id", edge.id.to_string()))
            .await
            .and_then(|response| response.check())
            .map_err(|e| OrgError::Storage(format!("Failed to delete edge: {}", e)))?;
        Ok(())
    }

    async fn edge_count(&self) -> OrgResult<usize> {
        let mut response = self
            .db
            .inner()
            .query("SELECT count() FROM reports_to GROUP ALL")
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to count edges: {}", e)))?;

        let counts: Vec<CountRow> = response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse edge count: {}", e)))?;

        Ok(counts.first().map(|c| c.count as usize).unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// InMemoryEdgeStore: for testing and the default deployment
// ---------------------------------------------------------------------------

/// In-memory edge store using adjacency lists.
///
/// `outbound` keeps each supervisor's edge ids in insertion order; `inbound`
/// maps a subordinate to its single edge. Locks are always taken in the order
/// edges, outbound, inbound.
pub struct InMemoryEdgeStore {
    edges: RwLock<HashMap<EdgeId, SupervisorEdge>>,
    outbound: RwLock<HashMap<EmployeeId, Vec<EdgeId>>>,
    inbound: RwLock<HashMap<EmployeeId, EdgeId>>,
}

impl InMemoryEdgeStore {
    pub fn new() -> Self {
        Self {
            edges: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
            inbound: RwLock::new(HashMap::new()),
        }
    }

    /// All edges, unordered.
    pub async fn all_edges(&self) -> Vec<SupervisorEdge> {
        let edges = self.edges.read().await;
        edges.values().cloned().collect()
    }
}

impl Default for InMemoryEdgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EdgeStore for InMemoryEdgeStore {
    async fn find_by_supervisor(
        &self,
        supervisor_id: EmployeeId,
    ) -> OrgResult<Vec<SupervisorEdge>> {
        let edges = self.edges.read().await;
        let outbound = self.outbound.read().await;

        let results = outbound
            .get(&supervisor_id)
            .map(|ids| ids.iter().filter_map(|id| edges.get(id).cloned()).collect())
            .unwrap_or_default();

        Ok(results)
    }

    async fn find_supervisor_of(&self, employee_id: EmployeeId) -> OrgResult<Option<EmployeeId>> {
        let edges = self.edges.read().await;
        let inbound = self.inbound.read().await;

        Ok(inbound
            .get(&employee_id)
            .and_then(|id| edges.get(id))
            .map(|edge| edge.supervisor_id))
    }

    async fn exists_involving(&self, employee_id: EmployeeId) -> OrgResult<bool> {
        let outbound = self.outbound.read().await;
        let inbound = self.inbound.read().await;

        let supervises = outbound
            .get(&employee_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false);

        Ok(supervises || inbound.contains_key(&employee_id))
    }

    async fn save(&self, edge: NewEdge) -> OrgResult<SupervisorEdge> {
        let mut edges = self.edges.write().await;
        let mut outbound = self.outbound.write().await;
        let mut inbound = self.inbound.write().await;

        if let Some(existing) = inbound.get(&edge.subordinate_id).and_then(|id| edges.get(id)) {
            return Err(OrgError::AlreadySupervised {
                employee_id: edge.subordinate_id,
                supervisor_id: existing.supervisor_id,
            });
        }

        let edge = edge.into_edge();
        outbound.entry(edge.supervisor_id).or_default().push(edge.id);
        inbound.insert(edge.subordinate_id, edge.id);
        edges.insert(edge.id, edge.clone());

        Ok(edge)
    }

    async fn delete(&self, edge: &SupervisorEdge) -> OrgResult<()> {
        let mut edges = self.edges.write().await;
        let mut outbound = self.outbound.write().await;
        let mut inbound = self.inbound.write().await;

        let removed = edges.remove(&edge.id).ok_or(OrgError::EdgeNotFound(edge.id))?;

        if let Some(list) = outbound.get_mut(&removed.supervisor_id) {
            list.retain(|id| id != &removed.id);
            if list.is_empty() {
                outbound.remove(&removed.supervisor_id);
            }
        }
        if inbound.get(&removed.subordinate_id) == Some(&removed.id) {
            inbound.remove(&removed.subordinate_id);
        }

        Ok(())
    }

    async fn edge_count(&self) -> OrgResult<usize> {
        let edges = self.edges.read().await;
        Ok(edges.len())
    }

    async fn find_descendants(&self, employee_id: EmployeeId) -> OrgResult<Vec<SupervisorEdge>> {
        let edges = self.edges.read().await;
        let outbound = self.outbound.read().await;

        let mut result = Vec::new();
        let mut expanded: HashSet<EmployeeId> = HashSet::new();
        let mut queue: VecDeque<EmployeeId> = VecDeque::new();

        queue.push_back(employee_id);
        expanded.insert(employee_id);

        while let Some(current) = queue.pop_front() {
            let Some(edge_ids) = outbound.get(&current) else {
                continue;
            };
            for edge_id in edge_ids {
                if let Some(edge) = edges.get(edge_id) {
                    if expanded.insert(edge.subordinate_id) {
                        queue.push_back(edge.subordinate_id);
                    }
                    result.push(edge.clone());
                }
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> InMemoryEdgeStore {
        let store = InMemoryEdgeStore::new();
        for (sup, sub) in [(1, 2), (1, 3), (2, 4), (2, 5), (3, 6)] {
            store.save(NewEdge::new(sup, sub)).await.unwrap();
        }
        store
    }

    fn pairs(edges: &[SupervisorEdge]) -> Vec<(EmployeeId, EmployeeId)> {
        edges
            .iter()
            .map(|e| (e.supervisor_id, e.subordinate_id))
            .collect()
    }

    #[tokio::test]
    async fn test_find_by_supervisor_keeps_insertion_order() {
        let store = make_store().await;
        let edges = store.find_by_supervisor(1).await.unwrap();
        assert_eq!(pairs(&edges), vec![(1, 2), (1, 3)]);
        assert!(store.find_by_supervisor(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_supervisor_of() {
        let store = make_store().await;
        assert_eq!(store.find_supervisor_of(5).await.unwrap(), Some(2));
        assert_eq!(store.find_supervisor_of(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_descendants_breadth_first() {
        let store = make_store().await;
        let edges = store.find_descendants(1).await.unwrap();
        assert_eq!(pairs(&edges), vec![(1, 2), (1, 3), (2, 4), (2, 5), (3, 6)]);

        let edges = store.find_descendants(2).await.unwrap();
        assert_eq!(pairs(&edges), vec![(2, 4), (2, 5)]);

        assert!(store.find_descendants(6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exists_involving() {
        let store = make_store().await;
        assert!(store.exists_involving(1).await.unwrap());
        assert!(store.exists_involving(6).await.unwrap());
        assert!(!store.exists_involving(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_second_supervisor() {
        let store = make_store().await;
        let err = store.save(NewEdge::new(3, 4)).await.unwrap_err();
        assert!(matches!(
            err,
            OrgError::AlreadySupervised {
                employee_id: 4,
                supervisor_id: 2
            }
        ));
        assert_eq!(store.edge_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delete_detaches_edge() {
        let store = make_store().await;
        let edge = store
            .find_by_supervisor(2)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.subordinate_id == 4)
            .unwrap();

        store.delete(&edge).await.unwrap();

        assert_eq!(store.find_supervisor_of(4).await.unwrap(), None);
        assert_eq!(pairs(&store.find_by_supervisor(2).await.unwrap()), vec![(2, 5)]);
        assert!(!store.exists_involving(4).await.unwrap());
        assert!(matches!(
            store.delete(&edge).await,
            Err(OrgError::EdgeNotFound(id)) if id == edge.id
        ));
    }

    #[tokio::test]
    async fn test_surreal_store_round_trip() {
        let db = Arc::new(OrgDatabase::new_memory().await.unwrap());
        let store = SurrealEdgeStore::open(db).await.unwrap();

        let first = store.save(NewEdge::new(1, 2)).await.unwrap();
        store.save(NewEdge::new(1, 3)).await.unwrap();
        store.save(NewEdge::new(3, 4)).await.unwrap();

        let direct = store.find_by_supervisor(1).await.unwrap();
        assert_eq!(pairs(&direct), vec![(1, 2), (1, 3)]);
        assert_eq!(direct[0], first);

        assert_eq!(store.find_supervisor_of(4).await.unwrap(), Some(3));
        assert_eq!(
            pairs(&store.find_descendants(1).await.unwrap()),
            vec![(1, 2), (1, 3), (3, 4)]
        );
        assert!(store.exists_involving(4).await.unwrap());
        assert_eq!(store.edge_count().await.unwrap(), 3);

        store.delete(&first).await.unwrap();
        assert_eq!(store.find_supervisor_of(2).await.unwrap(), None);
        assert_eq!(store.edge_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_surreal_store_unique_subordinate() {
        let db = Arc::new(OrgDatabase::new_memory().await.unwrap());
        let store = SurrealEdgeStore::open(db).await.unwrap();

        store.save(NewEdge::new(1, 2)).await.unwrap();
        let err = store.save(NewEdge::new(3, 2)).await.unwrap_err();
        assert!(matches!(
            err,
            OrgError::AlreadySupervised {
                employee_id: 2,
                supervisor_id: 1
            }
        ));
        assert_eq!(store.find_supervisor_of(2).await.unwrap(), Some(1));
        assert_eq!(store.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_surreal_sequence_resumes_after_reopen() {
        let db = Arc::new(OrgDatabase::new_memory().await.unwrap());

        let first = SurrealEdgeStore::open(db.clone()).await.unwrap();
        first.save(NewEdge::new(1, 5)).await.unwrap();
        first.save(NewEdge::new(1, 3)).await.unwrap();

        let second = SurrealEdgeStore::open(db).await.unwrap();
        assert_eq!(second.next_seq.load(Ordering::SeqCst), 2);
        second.save(NewEdge::new(1, 2)).await.unwrap();

        let edges = second.find_by_supervisor(1).await.unwrap();
        assert_eq!(pairs(&edges), vec![(1, 5), (1, 3), (1, 2)]);
    }

    #[tokio::test]
    async fn test_manager_reports_store_level_conflict() {
        use crate::hierarchy::{EdgeInsertion, HierarchyManager};
        use crate::store::membership::InMemoryMembership;

        let db = Arc::new(OrgDatabase::new_memory().await.unwrap());
        let ours = Arc::new(SurrealEdgeStore::open(db.clone()).await.unwrap());
        let manager = HierarchyManager::new(ours.clone(), Arc::new(InMemoryMembership::new()));

        // A writer in another process attaches 2 between our check and insert.
        let theirs = SurrealEdgeStore::open(db).await.unwrap();
        theirs.save(NewEdge::new(9, 2)).await.unwrap();

        let err = ours.save(NewEdge::new(1, 2)).await.unwrap_err();
        assert!(matches!(err, OrgError::AlreadySupervised { supervisor_id: 9, .. }));
        assert_eq!(
            manager.try_add_edge(1, 2).await.unwrap(),
            EdgeInsertion::AlreadySupervised { supervisor_id: 9 }
        );
    }
}
