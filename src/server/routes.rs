use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::error::OrgError;
use crate::hierarchy::EdgeInsertion;
use crate::model::edge::EmployeeId;
use crate::server::AppState;

/// Header naming the company a request acts for.
pub const COMPANY_HEADER: &str = "x-company";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "CONFLICT",
            message: message.into(),
        }
    }
}

impl From<OrgError> for ApiError {
    fn from(err: OrgError) -> Self {
        error!(error = %err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code,
        });
        (self.status, body).into_response()
    }
}

/// The company named by the `x-company` header.
#[derive(Debug, Clone)]
pub struct Company(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Company
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(COMPANY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Company(value.to_string()))
            .ok_or_else(|| {
                ApiError::bad_request("MISSING_COMPANY", format!("missing {COMPANY_HEADER} header"))
            })
    }
}

async fn require_employee(
    state: &AppState,
    company: &Company,
    employee_id: EmployeeId,
) -> Result<(), ApiError> {
    if state.hierarchy.employee_exists(&company.0, employee_id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found(format!(
            "Employee with ID {employee_id} not found"
        )))
    }
}

pub async fn get_subordinates(
    State(state): State<AppState>,
    company: Company,
    Path(employee_id): Path<EmployeeId>,
) -> Result<impl IntoResponse, ApiError> {
    require_employee(&state, &company, employee_id).await?;
    let edges = state.hierarchy.get_subordinates(employee_id).await?;
    Ok(Json(edges))
}

pub async fn get_supervisor(
    State(state): State<AppState>,
    company: Company,
    Path(employee_id): Path<EmployeeId>,
) -> Result<impl IntoResponse, ApiError> {
    require_employee(&state, &company, employee_id).await?;
    match state.hierarchy.get_supervisor(employee_id).await? {
        Some(supervisor_id) => Ok(Json(supervisor_id)),
        None => Err(ApiError::bad_request(
            "NO_SUPERVISOR",
            format!("Supervisor for Employee with ID {employee_id} doesn't exist"),
        )),
    }
}

pub async fn get_tree(
    State(state): State<AppState>,
    company: Company,
    Path(employee_id): Path<EmployeeId>,
) -> Result<impl IntoResponse, ApiError> {
    require_employee(&state, &company, employee_id).await?;
    let tree = state.hierarchy.build_employee_tree(employee_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], tree.to_json()))
}

pub async fn get_chain_of_command(
    State(state): State<AppState>,
    company: Company,
    Path(employee_id): Path<EmployeeId>,
) -> Result<impl IntoResponse, ApiError> {
    require_employee(&state, &company, employee_id).await?;
    let chain = state.hierarchy.chain_of_command(employee_id).await?;
    Ok(Json(chain))
}

pub async fn add_edge(
    State(state): State<AppState>,
    company: Company,
    Path((supervisor_id, employee_id)): Path<(EmployeeId, EmployeeId)>,
) -> Result<impl IntoResponse, ApiError> {
    let supervisor_exists = state
        .hierarchy
        .employee_exists(&company.0, supervisor_id)
        .await?;
    let employee_exists = state
        .hierarchy
        .employee_exists(&company.0, employee_id)
        .await?;
    if !supervisor_exists || !employee_exists {
        return Err(ApiError::not_found(
            "Either supervisor or employee doesn't exist.",
        ));
    }

    let outcome = state.hierarchy.try_add_edge(supervisor_id, employee_id).await?;
    match rejection_message(&outcome, employee_id) {
        None => Ok(Json(outcome)),
        Some(message) => Err(ApiError::bad_request(outcome.code(), message)),
    }
}

fn rejection_message(outcome: &EdgeInsertion, employee_id: EmployeeId) -> Option<String> {
    match outcome {
        EdgeInsertion::Added { .. } => None,
        EdgeInsertion::SelfSupervision => {
            Some("An employee cannot supervise themself.".to_string())
        }
        EdgeInsertion::AlreadySupervised { supervisor_id } => Some(format!(
            "Employee {employee_id} already reports to {supervisor_id}."
        )),
        EdgeInsertion::WouldCreateCycle => {
            Some("Adding this edge would create a cycle.".to_string())
        }
    }
}

pub async fn remove_edge(
    State(state): State<AppState>,
    company: Company,
    Path(employee_id): Path<EmployeeId>,
) -> Result<impl IntoResponse, ApiError> {
    require_employee(&state, &company, employee_id).await?;
    if state.hierarchy.remove_employee_supervisor_edge(employee_id).await? {
        Ok(Json(json!({ "removed": true, "employee_id": employee_id })))
    } else {
        Err(ApiError::bad_request(
            "NO_SUPERVISOR",
            "Operation failed: Employee has no supervisor.",
        ))
    }
}

pub async fn enroll_employee(
    State(state): State<AppState>,
    company: Company,
    Path(employee_id): Path<EmployeeId>,
) -> Result<impl IntoResponse, ApiError> {
    if state.membership.enroll(&company.0, employee_id).await? {
        Ok(Json(json!({ "company": company.0, "employee_id": employee_id })))
    } else {
        Err(ApiError::conflict(format!(
            "Employee {employee_id} already belongs to a company"
        )))
    }
}

pub async fn list_employees(
    State(state): State<AppState>,
    company: Company,
) -> Result<impl IntoResponse, ApiError> {
    let ids = state.membership.members(&company.0).await?;
    Ok(Json(ids))
}
