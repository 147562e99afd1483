use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Held while one pipeline attempt acts on a hotspot
pub type HotspotLease = OwnedMutexGuard<()>;

/// Per-hotspot mutual exclusion. Pipelines for different hotspots run in
/// parallel; pipelines for the same hotspot take turns.
#[derive(Clone, Default)]
pub struct HotspotLeases {
    locks: Arc<RwLock<HashMap<i32, Arc<Mutex<()>>>>>,
}

impl HotspotLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lease on `hotspot_id`
    pub async fn acquire(&self, hotspot_id: i32) -> HotspotLease {
        let lock = self.lock_for(hotspot_id).await;
        if let Ok(guard) = lock.clone().try_lock_owned() {
            return guard;
        }
        tracing::debug!("Waiting for lease on hotspot {}", hotspot_id);
        lock.lock_owned().await
    }

    /// True if some pipeline currently holds the lease
    pub async fn is_held(&self, hotspot_id: i32) -> bool {
        match self.locks.read().await.get(&hotspot_id) {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }

    async fn lock_for(&self, hotspot_id: i32) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&hotspot_id) {
            return lock.clone();
        }
        self.locks
            .write()
            .await
            .entry(hotspot_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
