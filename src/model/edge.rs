use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Integer employee identifier, unique across companies.
pub type EmployeeId = i64;

/// Store-assigned identity of a supervisor edge.
pub type EdgeId = Uuid;

// ---------------------------------------------------------------------------
// SupervisorEdge: one "reports to" relationship
// ---------------------------------------------------------------------------

/// A directed edge from a supervisor to one direct report.
///
/// Edges are never updated in place. Moving an employee under a different
/// supervisor means removing the old edge and adding a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorEdge {
    /// Identity assigned by the store on save.
    pub id: EdgeId,
    /// The supervising employee (edge goes FROM this employee).
    pub supervisor_id: EmployeeId,
    /// The direct report (edge goes TO this employee).
    pub subordinate_id: EmployeeId,
    /// When the store accepted the edge.
    pub created_at: DateTime<Utc>,
}

/// An edge that has not been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEdge {
    pub supervisor_id: EmployeeId,
    pub subordinate_id: EmployeeId,
}

impl NewEdge {
    pub fn new(supervisor_id: EmployeeId, subordinate_id: EmployeeId) -> Self {
        Self {
            supervisor_id,
            subordinate_id,
        }
    }

    /// Assign an identity and creation timestamp.
    pub fn into_edge(self) -> SupervisorEdge {
        SupervisorEdge {
            id: Uuid::new_v4(),
            supervisor_id: self.supervisor_id,
            subordinate_id: self.subordinate_id,
            created_at: Utc::now(),
        }
    }
}
