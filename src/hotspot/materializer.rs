use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, NetworkConfig, PathConfig};
use crate::database::models::{Hotspot, HotspotValidationError, MAX_SUBNET_HOTSPOT_ID};
use crate::hotspot::discovery::Interface;
use crate::hotspot::error::OrchestrationError;
use crate::system::{CommandOutput, CommandRunner, CommandSpec};

/// Per-hotspot /24 derived from the hotspot id: 192.168.<id>.0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetPlan {
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub dhcp_start: Ipv4Addr,
    pub dhcp_end: Ipv4Addr,
}

impl SubnetPlan {
    pub fn for_hotspot(id: i32) -> Result<Self, HotspotValidationError> {
        if !(1..=MAX_SUBNET_HOTSPOT_ID).contains(&id) {
            return Err(HotspotValidationError::IdOutOfSubnetRange(id));
        }
        let octet = id as u8;
        Ok(Self {
            gateway: Ipv4Addr::new(192, 168, octet, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            dhcp_start: Ipv4Addr::new(192, 168, octet, 10),
            dhcp_end: Ipv4Addr::new(192, 168, octet, 100),
        })
    }
}

/// Parsed contents of a materialized env file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    values: BTreeMap<String, String>,
}

impl EnvFile {
    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                (key.trim().to_string(), value.to_string())
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn interface(&self) -> Option<&str> {
        self.get("INTERFACE").filter(|v| !v.is_empty())
    }

    pub fn ssid(&self) -> Option<&str> {
        self.get("SSID")
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.get("PASSPHRASE")
    }

    pub fn channel(&self) -> Option<i32> {
        self.get("CHANNEL").and_then(|v| v.parse().ok())
    }
}

/// Renders hotspot declarations into the env file and systemd unit that the
/// AP control script and the service manager consume.
pub struct ConfigMaterializer {
    runner: Arc<dyn CommandRunner>,
    paths: PathConfig,
    network: NetworkConfig,
    probe_timeout: Duration,
    control_timeout: Duration,
    start_timeout: Duration,
}

impl ConfigMaterializer {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        Self {
            runner,
            paths: config.paths.clone(),
            network: config.network.clone(),
            probe_timeout: config.commands.probe_timeout(),
            control_timeout: config.commands.control_timeout(),
            start_timeout: config.commands.start_timeout(),
        }
    }

    pub fn env_path(&self, hotspot_id: i32) -> PathBuf {
        self.paths.env_dir.join(format!("hotspot_{}.env", hotspot_id))
    }

    pub fn unit_path(&self, hotspot_id: i32) -> PathBuf {
        self.paths.unit_dir.join(Hotspot::unit_name(hotspot_id))
    }

    /// Deterministic env file content for this hotspot on this interface
    pub fn render_env(&self, hotspot: &Hotspot, interface: &Interface) -> Result<String, OrchestrationError> {
        hotspot.validate()?;
        let subnet = SubnetPlan::for_hotspot(hotspot.id)?;
        let log_file = self.paths.log_dir.join(format!("hotspot_{}.log", hotspot.id));

        Ok(format!(
            r#"# Hotspot environment for hotspot {id}
ENABLE_LOG="1"
LOG_FILE="{log_file}"
INTERFACE="{interface}"
SSID="{ssid}"
PASSPHRASE="{passphrase}"
AP_IP="{gateway}"
NETMASK="{netmask}"
CHANNEL={channel}

# DHCP
DHCP_RANGE_START="{dhcp_start}"
DHCP_RANGE_END="{dhcp_end}"
DHCP_LEASE_TIME="{lease}"
INTERNET_IFACE="{uplink}"
"#,
            id = hotspot.id,
            log_file = log_file.display(),
            interface = interface.name,
            ssid = hotspot.ssid,
            passphrase = hotspot.password,
            gateway = subnet.gateway,
            netmask = subnet.netmask,
            channel = hotspot.channel(),
            dhcp_start = subnet.dhcp_start,
            dhcp_end = subnet.dhcp_end,
            lease = self.network.dhcp_lease_time,
            uplink = self.network.uplink_interface,
        ))
    }

    /// Write (or fully overwrite) the hotspot's env file and return its path
    pub async fn generate_env_file(
        &self,
        hotspot: &Hotspot,
        interface: &Interface,
    ) -> Result<PathBuf, OrchestrationError> {
        let content = self.render_env(hotspot, interface)?;
        let path = self.env_path(hotspot.id);

        tokio::fs::create_dir_all(&self.paths.env_dir)
            .await
            .map_err(|e| OrchestrationError::config(format!("create {}: {}", self.paths.env_dir.display(), e)))?;

        // Rename over the old file so readers never see a half-written one
        let staged = path.with_extension("env.tmp");
        tokio::fs::write(&staged, content)
            .await
            .map_err(|e| OrchestrationError::config(format!("write {}: {}", staged.display(), e)))?;
        tokio::fs::rename(&staged, &path)
            .await
            .map_err(|e| OrchestrationError::config(format!("rename to {}: {}", path.display(), e)))?;

        tracing::info!("Wrote env file for hotspot {} at {}", hotspot.id, path.display());
        Ok(path)
    }

    /// Read back the env file last materialized for a hotspot
    pub async fn read_env_file(&self, hotspot_id: i32) -> Option<EnvFile> {
        match tokio::fs::read_to_string(self.env_path(hotspot_id)).await {
            Ok(content) => Some(EnvFile::parse(&content)),
            Err(e) => {
                tracing::debug!("No readable env file for hotspot {}: {}", hotspot_id, e);
                None
            }
        }
    }

    pub fn render_unit(&self, hotspot: &Hotspot, env_path: &Path) -> String {
        let script = self.paths.control_script.display();
        format!(
            r#"[Unit]
Description=Hotspot Service for {ssid}
After=network.target
Requires=network.target

[Service]
Type=oneshot
RemainAfterExit=yes
EnvironmentFile={env}
ExecStart={script} start {id}
ExecStop={script} stop {id}
TimeoutStartSec={start_timeout}
TimeoutStopSec={stop_timeout}

[Install]
WantedBy=multi-user.target
"#,
            ssid = hotspot.ssid,
            env = env_path.display(),
            script = script,
            id = hotspot.id,
            start_timeout = self.start_timeout.as_secs(),
            stop_timeout = self.control_timeout.as_secs(),
        )
    }

    /// Whether systemd has the hotspot's unit loaded
    pub async fn unit_loaded(&self, hotspot_id: i32) -> bool {
        let spec = CommandSpec::new("systemctl")
            .args(["show", "-p", "LoadState", "--value"])
            .arg(Hotspot::unit_name(hotspot_id))
            .timeout(self.probe_timeout)
            .privileged();
        match self.runner.run(&spec).await {
            Ok(out) if out.is_success() => out.stdout.trim() == "loaded",
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("Could not query unit state for hotspot {}: {}", hotspot_id, e);
                false
            }
        }
    }

    /// Install the hotspot's unit and reload systemd. Skipped when an
    /// identical unit is already loaded, unless `force` is set.
    pub async fn generate_service_unit(
        &self,
        hotspot: &Hotspot,
        env_path: &Path,
        force: bool,
    ) -> Result<String, OrchestrationError> {
        let unit_name = Hotspot::unit_name(hotspot.id);
        let unit_path = self.unit_path(hotspot.id);
        let content = self.render_unit(hotspot, env_path);

        if !force && self.unit_loaded(hotspot.id).await {
            let existing = tokio::fs::read_to_string(&unit_path).await.ok();
            if existing.as_deref() == Some(content.as_str()) {
                tracing::debug!("Unit {} already installed and loaded", unit_name);
                return Ok(unit_name);
            }
        }

        tracing::info!("Generating systemd unit {} for hotspot {}", unit_name, hotspot.id);
        self.probe_unit_dir().await?;

        let staged = self.paths.env_dir.join(format!("{}.staged", unit_name));
        tokio::fs::create_dir_all(&self.paths.env_dir)
            .await
            .map_err(|e| OrchestrationError::config(format!("create {}: {}", self.paths.env_dir.display(), e)))?;
        tokio::fs::write(&staged, &content)
            .await
            .map_err(|e| OrchestrationError::config(format!("write {}: {}", staged.display(), e)))?;

        let install = self
            .privileged(
                CommandSpec::new("install")
                    .args(["-m", "644"])
                    .arg(staged.display().to_string())
                    .arg(unit_path.display().to_string()),
            )
            .await;
        let _ = tokio::fs::remove_file(&staged).await;

        if let Err(e) = install {
            // Never leave a partial unit behind
            let _ = self
                .privileged(CommandSpec::new("rm").arg("-f").arg(unit_path.display().to_string()))
                .await;
            return Err(e);
        }

        self.daemon_reload().await?;
        tracing::info!("Installed unit {} at {}", unit_name, unit_path.display());
        Ok(unit_name)
    }

    /// Guarantee a loaded, current unit exists before any unit control is issued
    pub async fn ensure_unit(&self, hotspot: &Hotspot, env_path: &Path) -> Result<String, OrchestrationError> {
        self.generate_service_unit(hotspot, env_path, false).await
    }

    /// Scratch write into the unit directory, so a missing privilege fails
    /// before anything real is touched
    async fn probe_unit_dir(&self) -> Result<(), OrchestrationError> {
        let probe = self.paths.unit_dir.join(".hotspot_probe");
        let spec = CommandSpec::new("touch")
            .arg(probe.display().to_string())
            .timeout(self.probe_timeout)
            .privileged();

        let out = self.runner.run(&spec).await.map_err(|e| {
            OrchestrationError::InsufficientPrivilege(format!("cannot run '{}': {}", spec, e))
        })?;
        if !out.is_success() {
            tracing::error!(
                "Permission probe on {} failed: {}",
                self.paths.unit_dir.display(),
                out.stderr.trim()
            );
            return Err(OrchestrationError::InsufficientPrivilege(format!(
                "cannot write to {}: {}",
                self.paths.unit_dir.display(),
                out.stderr.trim()
            )));
        }

        let _ = self
            .privileged(CommandSpec::new("rm").arg("-f").arg(probe.display().to_string()))
            .await;
        Ok(())
    }

    async fn daemon_reload(&self) -> Result<(), OrchestrationError> {
        self.privileged(CommandSpec::new("systemctl").arg("daemon-reload"))
            .await
            .map(|_| ())
    }

    async fn privileged(&self, spec: CommandSpec) -> Result<CommandOutput, OrchestrationError> {
        let spec = spec.timeout(self.control_timeout).privileged();
        let out = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| OrchestrationError::config(format!("'{}': {}", spec, e)))?;
        if !out.is_success() {
            return Err(OrchestrationError::config(format!(
                "'{}' failed (exit={:?}, timed_out={}): {}",
                spec,
                out.exit_code,
                out.timed_out,
                out.stderr.trim()
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, ScriptedRunner};

    fn wlan0() -> Interface {
        Interface { name: "wlan0".into(), ap_capable: true, ap_mode: false }
    }

    fn materializer(runner: Arc<ScriptedRunner>, root: &Path) -> ConfigMaterializer {
        ConfigMaterializer::new(runner, &test_config(root))
    }

    #[test]
    fn subnet_uses_id_as_third_octet() {
        let plan = SubnetPlan::for_hotspot(7).unwrap();
        assert_eq!(plan.gateway, Ipv4Addr::new(192, 168, 7, 1));
        assert_eq!(plan.dhcp_start, Ipv4Addr::new(192, 168, 7, 10));
        assert_eq!(plan.dhcp_end, Ipv4Addr::new(192, 168, 7, 100));
        assert!(SubnetPlan::for_hotspot(255).is_err());
    }

    #[test]
    fn env_parser_strips_quotes_and_comments() {
        let env = EnvFile::parse("# comment\nSSID=\"Cafe7\"\nCHANNEL=11\n\nINTERFACE=\"\"\n");
        assert_eq!(env.ssid(), Some("Cafe7"));
        assert_eq!(env.channel(), Some(11));
        assert_eq!(env.interface(), None);
    }

    #[tokio::test]
    async fn env_file_round_trips_declared_fields() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let m = materializer(runner, dir.path());
        let hotspot = Hotspot::new(7, 1, "Cafe7", "espresso-42").with_channel(11);

        let path = m.generate_env_file(&hotspot, &wlan0()).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("SSID=\"Cafe7\""));
        assert!(content.contains("CHANNEL=11"));
        assert!(content.contains("192.168.7.1"));

        let env = m.read_env_file(7).await.unwrap();
        assert_eq!(env.ssid(), Some("Cafe7"));
        assert_eq!(env.passphrase(), Some("espresso-42"));
        assert_eq!(env.channel(), Some(11));
        assert_eq!(env.interface(), Some("wlan0"));
    }

    #[tokio::test]
    async fn regenerating_env_file_leaves_no_stale_fields() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(Arc::new(ScriptedRunner::new()), dir.path());

        let first = Hotspot::new(3, 1, "OldName", "old-passphrase").with_channel(1);
        m.generate_env_file(&first, &wlan0()).await.unwrap();

        let second = Hotspot::new(3, 1, "NewName", "new-passphrase").with_channel(6);
        let other_iface = Interface { name: "wlo1".into(), ap_capable: true, ap_mode: false };
        let path = m.generate_env_file(&second, &other_iface).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!content.contains("OldName"));
        assert!(!content.contains("old-passphrase"));
        assert!(!content.contains("wlan0"));
        assert_eq!(content, m.render_env(&second, &other_iface).unwrap());
    }

    #[tokio::test]
    async fn invalid_hotspot_fails_config_generation() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(Arc::new(ScriptedRunner::new()), dir.path());
        let hotspot = Hotspot::new(300, 1, "TooFar", "password1");

        let err = m.generate_env_file(&hotspot, &wlan0()).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_GENERATION_FAILED");
        assert!(!m.env_path(300).exists());
    }

    #[tokio::test]
    async fn unit_generation_probes_installs_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("systemctl show", CommandOutput::success("not-found\n"));
        let m = materializer(runner.clone(), dir.path());
        let hotspot = Hotspot::new(5, 1, "Lobby", "password1");

        let env = m.generate_env_file(&hotspot, &wlan0()).await.unwrap();
        let unit = m.generate_service_unit(&hotspot, &env, false).await.unwrap();
        assert_eq!(unit, "hotspot_5.service");

        let calls = runner.command_lines();
        let touch = calls.iter().position(|c| c.starts_with("touch")).unwrap();
        let install = calls.iter().position(|c| c.starts_with("install -m 644")).unwrap();
        let reload = calls.iter().position(|c| c == "systemctl daemon-reload").unwrap();
        assert!(touch < install && install < reload);
    }

    #[tokio::test]
    async fn failed_permission_probe_is_insufficient_privilege() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("touch", CommandOutput::failure(1, "Permission denied"));
        let m = materializer(runner.clone(), dir.path());
        let hotspot = Hotspot::new(5, 1, "Lobby", "password1");

        let err = m
            .generate_service_unit(&hotspot, &m.env_path(5), true)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InsufficientPrivilege(_)));
        assert_eq!(runner.count("install"), 0);
        assert_eq!(runner.count("systemctl daemon-reload"), 0);
    }

    #[tokio::test]
    async fn loaded_identical_unit_is_not_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("systemctl show", CommandOutput::success("loaded\n"));
        let m = materializer(runner.clone(), dir.path());
        let hotspot = Hotspot::new(8, 1, "Lobby", "password1");

        let env_path = m.env_path(8);
        tokio::fs::create_dir_all(&m.paths.unit_dir).await.unwrap();
        tokio::fs::write(m.unit_path(8), m.render_unit(&hotspot, &env_path))
            .await
            .unwrap();

        m.ensure_unit(&hotspot, &env_path).await.unwrap();
        assert_eq!(runner.count("touch"), 0);
        assert_eq!(runner.count("systemctl daemon-reload"), 0);

        // forcing reinstalls regardless
        m.generate_service_unit(&hotspot, &env_path, true).await.unwrap();
        assert_eq!(runner.count("systemctl daemon-reload"), 1);
    }

    #[tokio::test]
    async fn failed_install_removes_partial_unit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("install", CommandOutput::failure(1, "No space left on device"));
        let m = materializer(runner.clone(), dir.path());
        let hotspot = Hotspot::new(9, 1, "Lobby", "password1");

        let err = m
            .generate_service_unit(&hotspot, &m.env_path(9), true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_GENERATION_FAILED");
        assert!(runner
            .command_lines()
            .iter()
            .any(|c| c.starts_with("rm -f") && c.ends_with("hotspot_9.service")));
        assert_eq!(runner.count("systemctl daemon-reload"), 0);
    }
}
