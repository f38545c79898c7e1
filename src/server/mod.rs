use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{AppConfig, ServerConfig, StorageBackend};
use crate::db::{DatabaseConfig, OrgDatabase};
use crate::error::{OrgError, OrgResult};
use crate::hierarchy::HierarchyManager;
use crate::store::{
    EdgeStore, InMemoryEdgeStore, InMemoryMembership, MembershipOracle, SurrealEdgeStore,
    SurrealMembership,
};

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub hierarchy: Arc<HierarchyManager>,
    pub membership: Arc<dyn MembershipOracle>,
    /// Set when the stores live in SurrealDB; `/health` pings it.
    pub database: Option<Arc<OrgDatabase>>,
}

impl AppState {
    pub fn new(edges: Arc<dyn EdgeStore>, membership: Arc<dyn MembershipOracle>) -> Self {
        Self {
            hierarchy: Arc::new(HierarchyManager::new(edges, membership.clone())),
            membership,
            database: None,
        }
    }

    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryEdgeStore::new()),
            Arc::new(InMemoryMembership::new()),
        )
    }

    /// Build the stores named by the storage configuration.
    pub async fn from_config(config: &AppConfig) -> OrgResult<Self> {
        match config.storage.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::Surreal => {
                let db = DatabaseConfig::from(&config.storage)
                    .connect()
                    .await
                    .map_err(|err| OrgError::Storage(format!("failed to open database: {err}")))?;
                let db: Arc<OrgDatabase> = Arc::new(db);
                let edges = SurrealEdgeStore::open(db.clone()).await?;
                Ok(Self {
                    database: Some(db.clone()),
                    ..Self::new(Arc::new(edges), Arc::new(SurrealMembership::new(db)))
                })
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/employee-hierarchy/subordinates/:employee_id",
            get(routes::get_subordinates),
        )
        .route(
            "/api/employee-hierarchy/supervisor/:employee_id",
            get(routes::get_supervisor),
        )
        .route(
            "/api/employee-hierarchy/tree/:employee_id",
            get(routes::get_tree),
        )
        .route(
            "/api/employee-hierarchy/chain/:employee_id",
            get(routes::get_chain_of_command),
        )
        .route(
            "/api/employee-hierarchy/edges/:supervisor_id/:employee_id",
            post(routes::add_edge),
        )
        .route(
            "/api/employee-hierarchy/edges/:employee_id",
            delete(routes::remove_edge),
        )
        .route("/api/company/employees", get(routes::list_employees))
        .route(
            "/api/company/employees/:employee_id",
            post(routes::enroll_employee),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn run_http_server(server: &ServerConfig, state: AppState) -> OrgResult<()> {
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|err| OrgError::ConfigError(format!("invalid server address: {err}")))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .await
        .map_err(|err| OrgError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> Result<&'static str, StatusCode> {
    let Some(db) = &state.database else {
        return Ok("ok");
    };
    match db.health().await {
        Ok(_) => Ok("ok"),
        Err(err) => {
            warn!(error = %err, "database health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
