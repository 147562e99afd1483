use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::{Hotspot, HotspotStore};
use crate::hotspot::{
    ConfigMaterializer, HotspotLeases, Interface, InterfaceDiscoverer, OrchestrationError,
    ProcessController, StatusVerifier,
};
use crate::system::CommandRunner;
use crate::tasks::backoff::RetryPolicy;
use crate::tasks::state::{Stage, TaskObserver, TaskResult, TaskState};
use crate::types::HotspotAction;

/// Sequences discovery, materialization, control and verification for one
/// hotspot action, with retries. Owns every host-facing component.
pub struct Orchestrator {
    store: Arc<dyn HotspotStore>,
    discoverer: InterfaceDiscoverer,
    materializer: Arc<ConfigMaterializer>,
    verifier: Arc<StatusVerifier>,
    controller: ProcessController,
    leases: HotspotLeases,
    policy: RetryPolicy,
    verify_attempts: u32,
    verify_step: Duration,
    time_limit: Duration,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn HotspotStore>, runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        let materializer = Arc::new(ConfigMaterializer::new(runner.clone(), config));
        let verifier = Arc::new(StatusVerifier::new(runner.clone(), materializer.clone(), config));
        let controller = ProcessController::new(runner.clone(), materializer.clone(), verifier.clone(), config);

        Self {
            store,
            discoverer: InterfaceDiscoverer::new(runner, config),
            materializer,
            verifier,
            controller,
            leases: HotspotLeases::new(),
            policy: RetryPolicy::from_config(&config.orchestration),
            verify_attempts: config.orchestration.verify_attempts.max(1),
            verify_step: config.orchestration.verify_step(),
            time_limit: config.orchestration.task_time_limit(),
        }
    }

    pub fn store(&self) -> &Arc<dyn HotspotStore> {
        &self.store
    }

    pub fn discoverer(&self) -> &InterfaceDiscoverer {
        &self.discoverer
    }

    pub fn materializer(&self) -> &Arc<ConfigMaterializer> {
        &self.materializer
    }

    pub fn verifier(&self) -> &Arc<StatusVerifier> {
        &self.verifier
    }

    pub fn controller(&self) -> &ProcessController {
        &self.controller
    }

    pub fn leases(&self) -> &HotspotLeases {
        &self.leases
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a task to its terminal result. With `slots`, each attempt holds a
    /// worker permit that is given back while waiting out the backoff.
    pub async fn run_task(
        &self,
        task_id: Uuid,
        hotspot_id: i32,
        action: HotspotAction,
        observer: &dyn TaskObserver,
        slots: Option<&Semaphore>,
    ) -> TaskResult {
        let span = tracing::info_span!("orchestration", %task_id, hotspot_id, %action);
        self.run_task_inner(task_id, hotspot_id, action, observer, slots)
            .instrument(span)
            .await
    }

    async fn run_task_inner(
        &self,
        task_id: Uuid,
        hotspot_id: i32,
        action: HotspotAction,
        observer: &dyn TaskObserver,
        slots: Option<&Semaphore>,
    ) -> TaskResult {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = {
                let _permit = match slots {
                    Some(slots) => slots.acquire().await.ok(),
                    None => None,
                };
                let _lease = self.leases.acquire(hotspot_id).await;
                tracing::info!(
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Starting attempt"
                );
                match timeout(
                    self.time_limit,
                    self.run_attempt(task_id, hotspot_id, action, attempt, observer),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(OrchestrationError::TaskTimeLimitExceeded(self.time_limit)),
                }
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(output) => {
                    tracing::info!(attempt, elapsed_ms, "Task succeeded");
                    observer.on_transition(task_id, TaskState::Succeeded, attempt, None).await;
                    return TaskResult {
                        task_id,
                        hotspot_id,
                        action,
                        success: true,
                        output,
                        error: None,
                        error_code: None,
                        duration_ms: elapsed_ms,
                        attempts: attempt,
                    };
                }
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        attempt,
                        elapsed_ms,
                        error_code = err.code(),
                        "Attempt failed, retrying in {}s: {}",
                        delay.as_secs(),
                        err
                    );
                    observer.on_transition(task_id, TaskState::Queued, attempt, Some(&err)).await;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(attempt, elapsed_ms, error_code = err.code(), "Task failed: {}", err);
                    self.record_failure(hotspot_id, action).await;
                    observer.on_transition(task_id, TaskState::Failed, attempt, Some(&err)).await;
                    return TaskResult {
                        task_id,
                        hotspot_id,
                        action,
                        success: false,
                        output: String::new(),
                        error: Some(err.to_string()),
                        error_code: Some(err.code().to_string()),
                        duration_ms: started.elapsed().as_millis() as u64,
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        task_id: Uuid,
        hotspot_id: i32,
        action: HotspotAction,
        attempt: u32,
        observer: &dyn TaskObserver,
    ) -> Result<String, OrchestrationError> {
        let started = Instant::now();
        // A stop only needs the id and the materialized env file, so it still
        // runs for a row the CRUD layer has already deleted
        let hotspot = self.store.get(hotspot_id).await?;
        if hotspot.is_none() && action.brings_up() {
            return Err(OrchestrationError::HotspotNotFound(hotspot_id));
        }

        let mut interface = None;
        let mut output = String::new();
        let mut stop_failure = None;

        for stage in Stage::for_action(action) {
            observer.on_transition(task_id, stage.state(), attempt, None).await;
            tracing::info!(
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Entering {:?}",
                stage.state()
            );

            match stage {
                Stage::Prepare => {
                    let hotspot = hotspot
                        .as_ref()
                        .ok_or(OrchestrationError::HotspotNotFound(hotspot_id))?;
                    interface = Some(self.prepare(hotspot).await?);
                }
                Stage::Execute => match self.controller.execute(action, hotspot_id).await {
                    Ok(outcome) => output = outcome.stdout.trim().to_string(),
                    // A failed or hung stop still gets the forced stop below
                    Err(err) if action == HotspotAction::Stop => {
                        tracing::warn!("Stop of hotspot {} failed, checking for leftovers: {}", hotspot_id, err);
                        stop_failure = Some(err);
                    }
                    Err(err) => return Err(err),
                },
                Stage::Verify => match action {
                    HotspotAction::Start | HotspotAction::Restart => self.verify_running(hotspot_id).await?,
                    HotspotAction::Stop => {
                        self.verify_stopped(hotspot_id, hotspot.is_some(), interface.as_ref(), stop_failure.take())
                            .await?
                    }
                },
            }
        }

        Ok(output)
    }

    /// Rediscover an interface and bring the artifacts in line with the record
    async fn prepare(&self, hotspot: &Hotspot) -> Result<Interface, OrchestrationError> {
        let interface = self.discoverer.select_interface().await?;
        let env_path = self.materializer.generate_env_file(hotspot, &interface).await?;
        self.materializer.ensure_unit(hotspot, &env_path).await?;
        Ok(interface)
    }

    async fn verify_running(&self, hotspot_id: i32) -> Result<(), OrchestrationError> {
        let mut waited = Duration::ZERO;
        for n in 1..=self.verify_attempts {
            let step = self.verify_step * n;
            tokio::time::sleep(step).await;
            waited += step;

            if self.verifier.is_running(hotspot_id).await {
                self.store.set_active(hotspot_id, true).await?;
                tracing::info!("Hotspot {} verified running after {}s", hotspot_id, waited.as_secs());
                return Ok(());
            }
            tracing::debug!("Hotspot {} not running yet (check {}/{})", hotspot_id, n, self.verify_attempts);
        }
        Err(OrchestrationError::VerificationTimeout { waited })
    }

    /// Stopped means not observed running once the forced stop has had its
    /// chance. A failed stop command only surfaces when the hotspot is still up.
    async fn verify_stopped(
        &self,
        hotspot_id: i32,
        has_record: bool,
        interface: Option<&Interface>,
        stop_failure: Option<OrchestrationError>,
    ) -> Result<(), OrchestrationError> {
        let iface = match interface {
            Some(iface) => Some(iface.name.clone()),
            None => self
                .materializer
                .read_env_file(hotspot_id)
                .await
                .and_then(|env| env.interface().map(str::to_string)),
        };

        if !self.controller.ensure_stopped(hotspot_id, iface.as_deref()).await {
            return Err(stop_failure.unwrap_or_else(|| OrchestrationError::CommandFailed {
                stdout: String::new(),
                stderr: format!("hotspot {} still running after forced stop", hotspot_id),
                exit_code: None,
            }));
        }

        if has_record {
            self.store.set_active(hotspot_id, false).await?;
        } else {
            tracing::info!("Hotspot {} stopped; its record is already gone", hotspot_id);
        }
        Ok(())
    }

    /// A failed start leaves the hotspot recorded as down; a failed stop
    /// keeps the last observation
    async fn record_failure(&self, hotspot_id: i32, action: HotspotAction) {
        if !action.brings_up() {
            return;
        }
        if let Err(e) = self.store.set_active(hotspot_id, false).await {
            tracing::warn!("Could not mark hotspot {} inactive: {}", hotspot_id, e);
        }
    }
}
