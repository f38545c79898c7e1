pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod server;
pub mod store;

pub use config::{AppConfig, LoggingConfig, ServerConfig, StorageBackend, StorageConfig};
pub use db::{DatabaseConfig, DatabaseEndpoint, OrgDatabase};
pub use error::{OrgError, OrgResult};
pub use hierarchy::{EdgeInsertion, HierarchyManager};
pub use model::*;
