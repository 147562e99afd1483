use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::database::models::Hotspot;
use crate::hotspot::discovery::{is_ap_type, link_flags_up};
use crate::hotspot::materializer::ConfigMaterializer;
use crate::system::{CommandOutput, CommandRunner, CommandSpec};

/// Decides from OS-observable signals whether a hotspot is transmitting.
/// Never fails: anything it cannot observe counts as "not running".
pub struct StatusVerifier {
    runner: Arc<dyn CommandRunner>,
    materializer: Arc<ConfigMaterializer>,
    probe_timeout: Duration,
}

impl StatusVerifier {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        materializer: Arc<ConfigMaterializer>,
        config: &AppConfig,
    ) -> Self {
        Self {
            runner,
            materializer,
            probe_timeout: config.commands.probe_timeout(),
        }
    }

    /// Permissive check: the unit is active, or both daemons carrying the
    /// hotspot's marker are alive and its interface link is up
    pub async fn is_running(&self, hotspot_id: i32) -> bool {
        if self.unit_active(hotspot_id).await {
            return true;
        }

        let marker = Hotspot::process_marker(hotspot_id);
        let (hostapd, dnsmasq, env) = futures::join!(
            self.matching_processes("hostapd", &marker),
            self.matching_processes("dnsmasq", &marker),
            self.materializer.read_env_file(hotspot_id),
        );
        if hostapd.is_empty() || dnsmasq.is_empty() {
            return false;
        }

        let link_up = match env.as_ref().and_then(|e| e.interface()) {
            Some(iface) => self.interface_up(iface).await.unwrap_or(false),
            None => true,
        };
        tracing::debug!(
            "Hotspot {} not active as unit; daemons present, link_up={}",
            hotspot_id,
            link_up
        );
        link_up
    }

    /// Conservative check: hostapd is alive, the materialized SSID matches the
    /// declared one, and the interface is operating in AP mode
    pub async fn serves_ssid(&self, hotspot: &Hotspot) -> bool {
        let hostapd_alive = self
            .run(CommandSpec::new("pgrep").args(["-x", "hostapd"]))
            .await
            .is_some_and(|out| out.is_success());
        if !hostapd_alive {
            return false;
        }

        let Some(env) = self.materializer.read_env_file(hotspot.id).await else {
            return false;
        };
        if env.ssid() != Some(hotspot.ssid.as_str()) {
            tracing::info!(
                "Hotspot {} env SSID {:?} differs from declared {:?}",
                hotspot.id,
                env.ssid(),
                hotspot.ssid
            );
            return false;
        }

        let Some(iface) = env.interface() else {
            return false;
        };
        match self.run(CommandSpec::new("iw").args(["dev", iface, "info"])).await {
            Some(out) if out.is_success() => is_ap_type(&out.stdout),
            _ => false,
        }
    }

    /// Command lines of `program` processes that mention `marker`
    pub async fn matching_processes(&self, program: &str, marker: &str) -> Vec<String> {
        match self.run(CommandSpec::new("pgrep").args(["-af", program])).await {
            Some(out) if out.is_success() => out
                .stdout
                .lines()
                .filter(|line| mentions_marker(line, marker))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `systemctl status` text for the hotspot's unit, for diagnostics
    pub async fn unit_status_text(&self, hotspot_id: i32) -> String {
        let spec = CommandSpec::new("systemctl")
            .args(["status", "--no-pager", "--lines=20"])
            .arg(Hotspot::unit_name(hotspot_id));
        match self.run(spec).await {
            Some(out) if out.timed_out => "systemctl status timed out".to_string(),
            // exits 3 for inactive units, the text is still meaningful
            Some(out) => format!("{}{}", out.stdout, out.stderr).trim().to_string(),
            None => "systemctl unavailable".to_string(),
        }
    }

    /// `ip addr show` output for an interface, if it can be queried
    pub async fn interface_details(&self, iface: &str) -> Option<String> {
        let out = self
            .run(CommandSpec::new("ip").args(["addr", "show", iface]))
            .await?;
        out.is_success().then(|| out.stdout.trim().to_string())
    }

    async fn unit_active(&self, hotspot_id: i32) -> bool {
        let spec = CommandSpec::new("systemctl")
            .arg("is-active")
            .arg(Hotspot::unit_name(hotspot_id));
        // is-active exits non-zero for anything but "active", so only stdout matters
        self.run(spec)
            .await
            .is_some_and(|out| out.stdout.trim() == "active")
    }

    async fn interface_up(&self, iface: &str) -> Option<bool> {
        let out = self
            .run(CommandSpec::new("ip").args(["link", "show", iface]))
            .await?;
        out.is_success().then(|| link_flags_up(&out.stdout))
    }

    async fn run(&self, spec: CommandSpec) -> Option<CommandOutput> {
        let spec = spec.timeout(self.probe_timeout);
        match self.runner.run(&spec).await {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::warn!("Status probe '{}' could not run: {}", spec, e);
                None
            }
        }
    }
}

/// Whether `line` names `marker` as a whole token: `hotspot_4` must not
/// match a command line belonging to `hotspot_40`
pub fn mentions_marker(line: &str, marker: &str) -> bool {
    line.match_indices(marker).any(|(at, _)| {
        !line[at + marker.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
    })
}
