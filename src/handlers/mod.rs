// handlers/mod.rs - HTTP surface over the orchestration engine
//
// POST /api/hotspots/:id/{start,stop,restart}  → 202 {task_id}
// GET  /api/hotspots/:id/{status,verify,diagnostics,task_status}
// GET  /api/tasks/:task_id
// GET  /health

pub mod hotspots;
pub mod tasks;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::DatabaseManager;
use crate::services::StatusService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub status: StatusService,
    /// Present when hotspots live in Postgres; checked by /health
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(status: StatusService, pool: Option<PgPool>) -> Self {
        Self { status, pool }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(hotspot_routes())
        .route("/api/tasks/:task_id", get(tasks::get))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn hotspot_routes() -> Router<AppState> {
    Router::new()
        .route("/api/hotspots/:id/start", post(hotspots::start))
        .route("/api/hotspots/:id/stop", post(hotspots::stop))
        .route("/api/hotspots/:id/restart", post(hotspots::restart))
        .route("/api/hotspots/:id/status", get(hotspots::status))
        .route("/api/hotspots/:id/verify", get(hotspots::verify))
        .route("/api/hotspots/:id/diagnostics", get(hotspots::diagnostics))
        .route("/api/hotspots/:id/task_status", get(hotspots::task_status))
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Hotspot Orchestrator",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "control": "POST /api/hotspots/:id/{start,stop,restart}",
                "status": "GET /api/hotspots/:id/{status,verify,diagnostics,task_status}",
                "tasks": "GET /api/tasks/:task_id",
                "health": "GET /health"
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let database = match &state.pool {
        None => "memory",
        Some(pool) => match DatabaseManager::health_check(pool).await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::error!("Health check failed: {}", e);
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "success": false,
                        "error": "Database connection failed",
                        "error_code": "DATABASE_UNAVAILABLE",
                        "data": { "status": "error", "timestamp": now, "database": "error" }
                    })),
                );
            }
        },
    };

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": { "status": "ok", "timestamp": now, "database": database }
        })),
    )
}
