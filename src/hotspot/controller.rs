use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, CommandConfig};
use crate::database::models::Hotspot;
use crate::hotspot::error::OrchestrationError;
use crate::hotspot::materializer::ConfigMaterializer;
use crate::hotspot::verifier::StatusVerifier;
use crate::system::{CommandOutput, CommandRunner, CommandSpec};
use crate::types::HotspotAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStrategy {
    /// `systemctl <action> hotspot_<id>.service`
    Unit,
    /// `<control_script> <action> <id>`
    Script,
    /// Nothing was invoked (already in the requested state)
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub strategy: ControlStrategy,
}

impl ControlOutcome {
    fn from_output(output: CommandOutput, strategy: ControlStrategy) -> Self {
        Self {
            success: output.is_success(),
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: output.timed_out,
            exit_code: output.exit_code,
            strategy,
        }
    }

    pub fn into_error(self) -> OrchestrationError {
        OrchestrationError::CommandFailed {
            stdout: self.stdout,
            stderr: if self.timed_out && self.stderr.is_empty() {
                "timed out".to_string()
            } else {
                self.stderr
            },
            exit_code: self.exit_code,
        }
    }
}

/// Issues privileged start/stop/restart operations for one hotspot
pub struct ProcessController {
    runner: Arc<dyn CommandRunner>,
    materializer: Arc<ConfigMaterializer>,
    verifier: Arc<StatusVerifier>,
    commands: CommandConfig,
    control_script: PathBuf,
}

impl ProcessController {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        materializer: Arc<ConfigMaterializer>,
        verifier: Arc<StatusVerifier>,
        config: &AppConfig,
    ) -> Self {
        Self {
            runner,
            materializer,
            verifier,
            commands: config.commands.clone(),
            control_script: config.paths.control_script.clone(),
        }
    }

    pub async fn execute(
        &self,
        action: HotspotAction,
        hotspot_id: i32,
    ) -> Result<ControlOutcome, OrchestrationError> {
        if action == HotspotAction::Start && self.verifier.is_running(hotspot_id).await {
            tracing::info!("Hotspot {} already running, nothing to start", hotspot_id);
            return Ok(ControlOutcome {
                success: true,
                stdout: "already running".to_string(),
                stderr: String::new(),
                timed_out: false,
                exit_code: None,
                strategy: ControlStrategy::Noop,
            });
        }

        let (spec, strategy) = self.control_spec(action, hotspot_id).await;
        tracing::info!("Executing {} for hotspot {} via {:?}", action, hotspot_id, strategy);

        let output = self.runner.run(&spec).await.map_err(|e| OrchestrationError::CommandFailed {
            stdout: String::new(),
            stderr: format!("failed to run '{}': {}", spec, e),
            exit_code: None,
        })?;
        let mut outcome = ControlOutcome::from_output(output, strategy);

        if outcome.timed_out && action == HotspotAction::Start {
            // Daemons often come up after the start command itself hangs
            tracing::warn!(
                "Start of hotspot {} timed out after {}s, re-checking",
                hotspot_id,
                spec.timeout.as_secs()
            );
            tokio::time::sleep(self.commands.start_grace()).await;
            if self.verifier.is_running(hotspot_id).await {
                tracing::info!("Hotspot {} is running despite the start timeout", hotspot_id);
                outcome.success = true;
            }
        }

        if outcome.success {
            Ok(outcome)
        } else {
            tracing::error!(
                "{} for hotspot {} failed (exit={:?}, timed_out={}): {}",
                action,
                hotspot_id,
                outcome.exit_code,
                outcome.timed_out,
                outcome.stderr.trim()
            );
            Err(outcome.into_error())
        }
    }

    /// Give a stopped hotspot `stop_grace` to wind down, then force-stop it
    /// once if it is still observed running. Returns whether it is stopped.
    pub async fn ensure_stopped(&self, hotspot_id: i32, interface: Option<&str>) -> bool {
        tokio::time::sleep(self.commands.stop_grace()).await;
        if !self.verifier.is_running(hotspot_id).await {
            return true;
        }

        tracing::warn!("Hotspot {} still running after stop, forcing", hotspot_id);
        self.force_stop(hotspot_id, interface).await;

        let stopped = !self.verifier.is_running(hotspot_id).await;
        if !stopped {
            tracing::error!("Hotspot {} still running after forced stop", hotspot_id);
        }
        stopped
    }

    async fn force_stop(&self, hotspot_id: i32, interface: Option<&str>) {
        let marker = Hotspot::process_marker(hotspot_id);
        let mut steps = vec![
            CommandSpec::new("pkill").args(["-f".to_string(), format!("hostapd.*{}([^0-9]|$)", marker)]),
            CommandSpec::new("pkill").args(["-f".to_string(), format!("dnsmasq.*{}([^0-9]|$)", marker)]),
        ];
        if let Some(iface) = interface {
            steps.push(CommandSpec::new("ip").args(["link", "set", iface, "down"]));
        }
        steps.push(
            CommandSpec::new("systemctl")
                .arg("stop")
                .arg(Hotspot::unit_name(hotspot_id)),
        );

        for spec in steps {
            let spec = spec.timeout(self.commands.control_timeout()).privileged();
            // Each step is best effort; pkill exits 1 when nothing matched
            match self.runner.run(&spec).await {
                Ok(out) if !out.is_success() => {
                    tracing::debug!("Force-stop step '{}' exit={:?}", spec, out.exit_code)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Force-stop step '{}' failed: {}", spec, e),
            }
        }
    }

    async fn control_spec(&self, action: HotspotAction, hotspot_id: i32) -> (CommandSpec, ControlStrategy) {
        let timeout = match action {
            HotspotAction::Start => self.commands.start_timeout(),
            HotspotAction::Stop | HotspotAction::Restart => self.commands.control_timeout(),
        };

        let (spec, strategy) = if self.materializer.unit_loaded(hotspot_id).await {
            (
                CommandSpec::new("systemctl")
                    .arg(action.as_str())
                    .arg(Hotspot::unit_name(hotspot_id)),
                ControlStrategy::Unit,
            )
        } else {
            (
                CommandSpec::new(self.control_script.display().to_string())
                    .arg(action.as_str())
                    .arg(hotspot_id.to_string()),
                ControlStrategy::Script,
            )
        };
        (spec.timeout(timeout).privileged(), strategy)
    }
}
