use thiserror::Error;

use crate::model::EmployeeId;

/// Central error type for orgchart operations.
///
/// Business-rule rejections are reported as `EdgeInsertion` values by the
/// hierarchy manager. `AlreadySupervised` is how a store refuses a second
/// supervisor for one employee; the manager turns it back into an outcome.
/// The remaining variants are infrastructure failures.
#[derive(Error, Debug)]
pub enum OrgError {
    #[error("Employee {employee_id} already reports to {supervisor_id}")]
    AlreadySupervised {
        employee_id: EmployeeId,
        supervisor_id: EmployeeId,
    },

    #[error("Edge not found: {0}")]
    EdgeNotFound(uuid::Uuid),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for orgchart results.
pub type OrgResult<T> = Result<T, OrgError>;
