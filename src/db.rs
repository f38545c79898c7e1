use anyhow::Result;
use std::sync::Arc;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::config::StorageConfig;

/// A wrapper around a SurrealDB connection with the orgchart schema applied.
#[derive(Clone)]
pub struct OrgDatabase {
    db: Arc<Surreal<Any>>,
}

impl OrgDatabase {
    /// Create a new in-memory database instance.
    pub async fn new_memory() -> Result<Self> {
        DatabaseConfig::memory().connect().await
    }

    async fn open(config: &DatabaseConfig) -> Result<Self> {
        let db = match &config.endpoint {
            DatabaseEndpoint::Memory => connect("memory").await?,
            DatabaseEndpoint::Remote {
                url,
                username,
                password,
            } => {
                let db = connect(url.as_str()).await?;
                db.signin(Root {
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await?;
                db
            }
        };

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        let db = Arc::new(db);
        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    /// Define tables and indexes. Safe to run against an existing database.
    async fn init_schema(db: &Surreal<Any>) -> Result<()> {
        db.query("DEFINE TABLE IF NOT EXISTS reports_to SCHEMALESS")
            .await?
            .check()?;
        db.query("DEFINE INDEX IF NOT EXISTS reports_to_supervisor ON TABLE reports_to FIELDS supervisor_id")
            .await?
            .check()?;
        // One supervisor per employee, enforced below the manager as well.
        db.query("DEFINE INDEX IF NOT EXISTS reports_to_subordinate ON TABLE reports_to FIELDS subordinate_id UNIQUE")
            .await?
            .check()?;

        db.query("DEFINE TABLE IF NOT EXISTS company_employee SCHEMALESS")
            .await?
            .check()?;
        db.query("DEFINE INDEX IF NOT EXISTS company_employee_company ON TABLE company_employee FIELDS company")
            .await?
            .check()?;
        db.query("DEFINE INDEX IF NOT EXISTS company_employee_employee ON TABLE company_employee FIELDS employee_id UNIQUE")
            .await?
            .check()?;

        Ok(())
    }

    /// Get a reference to the underlying SurrealDB instance.
    pub fn inner(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Check if the database is reachable.
    pub async fn health(&self) -> Result<bool> {
        let _ = self.db.version().await?;
        Ok(true)
    }
}

/// Whether a query failed because a `UNIQUE` index already holds the value.
///
/// Embedded and remote engines surface this differently, so match on the
/// rendered message.
pub(crate) fn is_unique_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}

/// Database connection options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub endpoint: DatabaseEndpoint,
    pub namespace: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: DatabaseEndpoint::Memory,
            namespace: "orgchart".to_string(),
            database: "orgchart".to_string(),
        }
    }
}

/// Database endpoint types.
#[derive(Debug, Clone)]
pub enum DatabaseEndpoint {
    /// In-memory database (for testing and single-node demos).
    Memory,
    /// Remote SurrealDB server.
    Remote {
        url: String,
        username: String,
        password: String,
    },
}

impl DatabaseConfig {
    /// Create a new configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Connect to the database with this configuration.
    pub async fn connect(&self) -> Result<OrgDatabase> {
        OrgDatabase::open(self).await
    }
}

impl From<&StorageConfig> for DatabaseConfig {
    fn from(storage: &StorageConfig) -> Self {
        let endpoint = if storage.endpoint == "memory" {
            DatabaseEndpoint::Memory
        } else {
            DatabaseEndpoint::Remote {
                url: storage.endpoint.clone(),
                username: storage.username.clone(),
                password: storage.password.clone(),
            }
        };
        Self {
            endpoint,
            namespace: storage.namespace.clone(),
            database: storage.database.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database() {
        let db = OrgDatabase::new_memory().await.unwrap();
        assert!(db.health().await.unwrap());
    }

    #[test]
    fn test_storage_config_maps_memory_endpoint() {
        let storage = StorageConfig::default();
        let config = DatabaseConfig::from(&storage);
        assert!(matches!(config.endpoint, DatabaseEndpoint::Memory));
        assert_eq!(config.namespace, "orgchart");
    }

    #[test]
    fn test_storage_config_maps_remote_endpoint() {
        let storage = StorageConfig {
            endpoint: "ws://db.internal:8000".to_string(),
            username: "svc".to_string(),
            ..StorageConfig::default()
        };
        match DatabaseConfig::from(&storage).endpoint {
            DatabaseEndpoint::Remote { url, username, .. } => {
                assert_eq!(url, "ws://db.internal:8000");
                assert_eq!(username, "svc");
            }
            DatabaseEndpoint::Memory => panic!("expected a remote endpoint"),
        }
    }
}
