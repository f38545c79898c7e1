use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::{is_unique_violation, OrgDatabase};
use crate::error::{OrgError, OrgResult};
use crate::model::edge::EmployeeId;

/// Answers which company an employee belongs to.
///
/// Every hierarchy request is gated on `exists` for the calling company
/// before the hierarchy manager runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Whether the employee belongs to the given company.
    async fn exists(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool>;

    /// Add an employee to a company. Returns false if the employee already
    /// belongs to any company.
    async fn enroll(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool>;

    /// Employee ids of a company, ascending.
    async fn members(&self, company: &str) -> OrgResult<Vec<EmployeeId>>;
}

// ---------------------------------------------------------------------------
// InMemoryMembership
// ---------------------------------------------------------------------------

/// In-memory employee -> company table.
#[derive(Default)]
pub struct InMemoryMembership {
    companies: RwLock<BTreeMap<EmployeeId, String>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MembershipOracle for InMemoryMembership {
    async fn exists(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool> {
        let companies = self.companies.read().await;
        Ok(companies.get(&employee_id).map(String::as_str) == Some(company))
    }

    async fn enroll(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool> {
        let mut companies = self.companies.write().await;
        if companies.contains_key(&employee_id) {
            return Ok(false);
        }
        companies.insert(employee_id, company.to_string());
        Ok(true)
    }

    async fn members(&self, company: &str) -> OrgResult<Vec<EmployeeId>> {
        let companies = self.companies.read().await;
        Ok(companies
            .iter()
            .filter(|(_, c)| c.as_str() == company)
            .map(|(id, _)| *id)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SurrealMembership
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct MemberRow {
    company: String,
    employee_id: EmployeeId,
}

/// SurrealDB-backed membership table (`company_employee`).
#[derive(Clone)]
pub struct SurrealMembership {
    db: Arc<OrgDatabase>,
}

impl SurrealMembership {
    pub fn new(db: Arc<OrgDatabase>) -> Self {
        Self { db }
    }

    /// Write the membership row. The unique index on `employee_id` refuses a
    /// second row for an employee enrolled by a concurrent writer.
    async fn insert(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool> {
        let row = MemberRow {
            company: company.to_string(),
            employee_id,
        };
        let created = self
            .db
            .inner()
            .query("CREATE company_employee CONTENT $row")
            .bind(("row", row))
            .await
            .and_then(|response| response.check());

        match created {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(OrgError::Storage(format!("Failed to enroll employee: {}", e))),
        }
    }

    async fn companies_of(&self, employee_id: EmployeeId) -> OrgResult<Vec<String>> {
        let mut response = self
            .db
            .inner()
            .query("SELECT VALUE company FROM company_employee WHERE employee_id = $employee_id")
            .bind(("employee_id", employee_id))
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to query membership: {}", e)))?;

        response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse membership: {}", e)))
    }
}

#[async_trait]
impl MembershipOracle for SurrealMembership {
    async fn exists(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool> {
        let companies = self.companies_of(employee_id).await?;
        Ok(companies.iter().any(|c| c == company))
    }

    async fn enroll(&self, company: &str, employee_id: EmployeeId) -> OrgResult<bool> {
        if !self.companies_of(employee_id).await?.is_empty() {
            return Ok(false);
        }
        self.insert(company, employee_id).await
    }

    async fn members(&self, company: &str) -> OrgResult<Vec<EmployeeId>> {
        let mut response = self
            .db
            .inner()
            .query("SELECT VALUE employee_id FROM company_employee WHERE company = $company")
            .bind(("company", company.to_string()))
            .await
            .map_err(|e| OrgError::Storage(format!("Failed to query members: {}", e)))?;

        let mut ids: Vec<EmployeeId> = response
            .take(0)
            .map_err(|e| OrgError::Storage(format!("Failed to parse members: {}", e)))?;
        ids.sort_unstable();
        Ok(ids)
    }
}
