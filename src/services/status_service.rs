use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::Hotspot;
use crate::hotspot::OrchestrationError;
use crate::tasks::{TaskPoll, TaskQueue};
use crate::types::HotspotAction;

/// Observed state of a hotspot as returned by a status probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub hotspot_id: i32,
    pub ssid: String,
    pub is_running: bool,
    /// Stored flag after any correction
    pub is_active: bool,
    pub corrected: bool,
    pub interface: Option<String>,
    pub current_task_id: Option<Uuid>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub hotspot_id: i32,
    /// Stored flag before the check
    pub was_running: bool,
    pub is_running: bool,
    pub corrected: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub hotspot_id: i32,
    pub unit_name: String,
    pub unit_loaded: bool,
    pub unit_status: String,
    pub processes: Vec<String>,
    pub interface: Option<String>,
    pub interface_info: Option<String>,
    pub env_file: Option<String>,
    pub is_running: bool,
    pub serves_ssid: bool,
    pub checked_at: DateTime<Utc>,
}

/// Synchronous read path over the orchestration engine plus the lifecycle
/// hooks the CRUD layer calls on create and delete
#[derive(Clone)]
pub struct StatusService {
    queue: TaskQueue,
}

impl StatusService {
    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Observe the hotspot and bring the stored flag in line with what is seen
    pub async fn probe(&self, hotspot_id: i32) -> Result<StatusReport, OrchestrationError> {
        let hotspot = self.load(hotspot_id).await?;
        let orchestrator = self.queue.orchestrator();

        let is_running = orchestrator.verifier().is_running(hotspot_id).await;
        let corrected = self.heal(&hotspot, is_running).await;
        let interface = orchestrator
            .materializer()
            .read_env_file(hotspot_id)
            .await
            .and_then(|env| env.interface().map(str::to_string));

        Ok(StatusReport {
            hotspot_id,
            ssid: hotspot.ssid,
            is_running,
            is_active: if corrected { is_running } else { hotspot.is_active },
            corrected,
            interface,
            current_task_id: hotspot.current_task_id,
            checked_at: Utc::now(),
        })
    }

    /// Explicit reconciliation, reporting whether the stored flag was wrong
    pub async fn verify(&self, hotspot_id: i32) -> Result<VerifyReport, OrchestrationError> {
        let hotspot = self.load(hotspot_id).await?;
        let was_running = hotspot.is_active;
        let is_running = self.queue.orchestrator().verifier().is_running(hotspot_id).await;
        let corrected = self.heal(&hotspot, is_running).await;

        let message = if corrected {
            format!("Status corrected from {} to {}", state_word(was_running), state_word(is_running))
        } else if was_running != is_running {
            format!("Hotspot is {} but the stored status could not be updated", state_word(is_running))
        } else {
            format!("Status verified: {}", state_word(is_running))
        };

        Ok(VerifyReport {
            hotspot_id,
            was_running,
            is_running,
            corrected,
            message,
        })
    }

    pub async fn diagnostics(&self, hotspot_id: i32) -> Result<Diagnostics, OrchestrationError> {
        let hotspot = self.load(hotspot_id).await?;
        let orchestrator = self.queue.orchestrator();
        let verifier = orchestrator.verifier();
        let materializer = orchestrator.materializer();
        let marker = Hotspot::process_marker(hotspot_id);

        let (unit_loaded, unit_status, hostapd, dnsmasq, env, is_running, serves_ssid) = futures::join!(
            materializer.unit_loaded(hotspot_id),
            verifier.unit_status_text(hotspot_id),
            verifier.matching_processes("hostapd", &marker),
            verifier.matching_processes("dnsmasq", &marker),
            materializer.read_env_file(hotspot_id),
            verifier.is_running(hotspot_id),
            verifier.serves_ssid(&hotspot),
        );

        let interface = env.as_ref().and_then(|e| e.interface().map(str::to_string));
        let interface_info = match &interface {
            Some(iface) => verifier.interface_details(iface).await,
            None => None,
        };

        Ok(Diagnostics {
            hotspot_id,
            unit_name: Hotspot::unit_name(hotspot_id),
            unit_loaded,
            unit_status,
            processes: hostapd.into_iter().chain(dnsmasq).collect(),
            interface,
            interface_info,
            env_file: env.map(|_| materializer.env_path(hotspot_id).display().to_string()),
            is_running,
            serves_ssid,
            checked_at: Utc::now(),
        })
    }

    /// Poll a task, defaulting to the hotspot's current one. `Ok(None)` when
    /// there is no such task (or it has expired).
    pub async fn task_status(
        &self,
        hotspot_id: i32,
        task_id: Option<Uuid>,
    ) -> Result<Option<TaskPoll>, OrchestrationError> {
        let task_id = match task_id {
            Some(id) => id,
            None => match self.load(hotspot_id).await?.current_task_id {
                Some(id) => id,
                None => return Ok(None),
            },
        };
        Ok(self.queue.poll(task_id).await)
    }

    /// A new hotspot starts out inactive and gets a start task
    pub async fn hotspot_created(&self, hotspot_id: i32) -> Result<Uuid, OrchestrationError> {
        self.queue
            .orchestrator()
            .store()
            .set_active(hotspot_id, false)
            .await?;
        Ok(self.queue.enqueue(hotspot_id, HotspotAction::Start).await)
    }

    /// Best-effort stop for a deleted hotspot. The stop runs from the id and
    /// the materialized env file, so the row may already be gone; deletion
    /// proceeds whatever the outcome.
    pub async fn hotspot_deleted(&self, hotspot_id: i32) -> Uuid {
        tracing::info!("Hotspot {} deleted, scheduling stop", hotspot_id);
        self.queue.enqueue(hotspot_id, HotspotAction::Stop).await
    }

    async fn load(&self, hotspot_id: i32) -> Result<Hotspot, OrchestrationError> {
        self.queue
            .orchestrator()
            .store()
            .get(hotspot_id)
            .await?
            .ok_or(OrchestrationError::HotspotNotFound(hotspot_id))
    }

    /// Returns true if the stored flag was changed
    async fn heal(&self, hotspot: &Hotspot, is_running: bool) -> bool {
        if hotspot.is_active == is_running {
            return false;
        }
        tracing::info!(
            "Hotspot {} stored as {} but observed {}, correcting",
            hotspot.id,
            state_word(hotspot.is_active),
            state_word(is_running)
        );
        match self
            .queue
            .orchestrator()
            .store()
            .set_active(hotspot.id, is_running)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not correct status of hotspot {}: {}", hotspot.id, e);
                false
            }
        }
    }
}

fn state_word(running: bool) -> &'static str {
    if running {
        "running"
    } else {
        "stopped"
    }
}
