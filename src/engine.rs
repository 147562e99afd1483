use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::{DatabaseManager, HotspotStore, PgHotspotStore};
use crate::handlers::AppState;
use crate::services::StatusService;
use crate::system::{CommandRunner, SystemCommandRunner};
use crate::tasks::{Orchestrator, TaskQueue};

/// Fully wired orchestration engine: store, host runner, queue and status service
#[derive(Clone)]
pub struct Engine {
    pub status: StatusService,
    pub pool: Option<PgPool>,
}

impl Engine {
    /// Postgres-backed store and the real host command runner
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = DatabaseManager::pool(&config.database)
            .await
            .context("failed to connect to the hotspot database")?;
        let store = PgHotspotStore::new(config.database.hotspot_table.clone(), pool.clone())?;
        let runner = SystemCommandRunner::new(config.commands.escalation.clone());

        let mut engine = Self::with_parts(Arc::new(store), Arc::new(runner), config);
        engine.pool = Some(pool);
        Ok(engine)
    }

    pub fn with_parts(store: Arc<dyn HotspotStore>, runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(store, runner, config));
        let queue = TaskQueue::new(orchestrator, config);
        Self {
            status: StatusService::new(queue),
            pool: None,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        self.status.queue()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        self.queue().orchestrator()
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.status.clone(), self.pool.clone())
    }
}
