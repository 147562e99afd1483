#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use hotspot_orchestrator::config::AppConfig;
use hotspot_orchestrator::database::{Hotspot, HotspotStore, MemoryHotspotStore};
use hotspot_orchestrator::testing::{test_config, ScriptedRunner};
use hotspot_orchestrator::Engine;

/// Engine wired to an in-memory store and a scripted host, with every
/// artifact path under a scratch directory
pub struct Harness {
    pub dir: TempDir,
    pub runner: Arc<ScriptedRunner>,
    pub store: MemoryHotspotStore,
    pub config: AppConfig,
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create scratch dir")?;
        let mut config = test_config(dir.path());
        adjust(&mut config);

        let runner = Arc::new(ScriptedRunner::new());
        let store = MemoryHotspotStore::new();
        let engine = Engine::with_parts(Arc::new(store.clone()), runner.clone(), &config);

        Ok(Self { dir, runner, store, config, engine })
    }

    pub async fn add(&self, hotspot: Hotspot) {
        self.store.insert(hotspot).await;
    }

    pub async fn hotspot(&self, id: i32) -> Result<Hotspot> {
        self.store
            .get(id)
            .await?
            .with_context(|| format!("hotspot {} missing from store", id))
    }

    /// Exact command lines recorded by the scripted host
    pub fn exact_calls(&self, line: &str) -> usize {
        self.runner.command_lines().iter().filter(|c| c.as_str() == line).count()
    }
}
