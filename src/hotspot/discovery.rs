use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::hotspot::error::OrchestrationError;
use crate::system::{CommandOutput, CommandRunner, CommandSpec};

/// A wireless interface as observed during one pipeline run. Never cached:
/// interfaces come and go across driver reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub ap_capable: bool,
    pub ap_mode: bool,
}

/// What `InterfaceDiscoverer::inspect` observed about one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceReport {
    pub name: String,
    pub supports_ap: bool,
    pub ap_mode: bool,
    pub link_up: Option<bool>,
    pub rfkill_blocked: Option<bool>,
}

/// Finds wireless interfaces and checks they can host an access point
pub struct InterfaceDiscoverer {
    runner: Arc<dyn CommandRunner>,
    fallback_names: Vec<String>,
    sys_class_net: PathBuf,
    probe_timeout: Duration,
}

impl InterfaceDiscoverer {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        Self {
            runner,
            fallback_names: config.network.fallback_interfaces.clone(),
            sys_class_net: config.paths.sys_class_net.clone(),
            probe_timeout: config.commands.probe_timeout(),
        }
    }

    /// Interface names in kernel enumeration order, falling back to
    /// conventional names present under sysfs when `iw dev` yields nothing.
    pub async fn discover_interfaces(&self) -> Vec<String> {
        match self.run(CommandSpec::new("iw").arg("dev")).await {
            Some(out) if out.is_success() => {
                let names = parse_iw_dev(&out.stdout);
                if !names.is_empty() {
                    tracing::debug!("Detected wireless interfaces: {:?}", names);
                    return names;
                }
                tracing::info!("'iw dev' listed no interfaces, probing conventional names");
            }
            Some(out) => {
                tracing::warn!(
                    "'iw dev' failed (exit={:?}, timed_out={}), probing conventional names",
                    out.exit_code,
                    out.timed_out
                );
            }
            None => {}
        }

        let mut found = Vec::new();
        for name in &self.fallback_names {
            if tokio::fs::metadata(self.sys_class_net.join(name)).await.is_ok() {
                found.push(name.clone());
            }
        }
        tracing::debug!("Fallback interface probe found: {:?}", found);
        found
    }

    /// True if the interface supports AP mode. A soft kill-switch block and an
    /// administratively down link are each remediated once and re-checked.
    pub async fn validate_ap_capable(&self, name: &str) -> bool {
        if !self.ensure_unblocked().await {
            tracing::warn!("Wireless is still blocked by rfkill; {} cannot host an AP", name);
            return false;
        }

        if !self.ensure_link_up(name).await {
            tracing::warn!("Interface {} could not be brought up", name);
            return false;
        }

        let capable = self.supports_ap_mode(name).await;
        if !capable {
            tracing::warn!("Interface {} does not support AP mode", name);
        }
        capable
    }

    /// First interface, in enumeration order, that validates as AP-capable
    pub async fn select_interface(&self) -> Result<Interface, OrchestrationError> {
        let candidates = self.discover_interfaces().await;
        for name in &candidates {
            if self.validate_ap_capable(name).await {
                let ap_mode = self.is_in_ap_mode(name).await;
                tracing::info!("Selected interface {} (ap_mode={})", name, ap_mode);
                return Ok(Interface {
                    name: name.clone(),
                    ap_capable: true,
                    ap_mode,
                });
            }
        }
        Err(OrchestrationError::NoInterfaceAvailable { checked: candidates })
    }

    /// Whether the interface currently operates as an access point
    pub async fn is_in_ap_mode(&self, name: &str) -> bool {
        match self.run(CommandSpec::new("iw").args(["dev", name, "info"])).await {
            Some(out) if out.is_success() => is_ap_type(&out.stdout),
            _ => false,
        }
    }

    /// Read-only capability report for listings; unlike
    /// `validate_ap_capable` it never unblocks or raises the link
    pub async fn inspect(&self, name: &str) -> InterfaceReport {
        let blocked = self
            .run(CommandSpec::new("rfkill").arg("list").privileged())
            .await
            .map(|out| rfkill_blocked(&out.stdout));
        InterfaceReport {
            name: name.to_string(),
            supports_ap: self.supports_ap_mode(name).await,
            ap_mode: self.is_in_ap_mode(name).await,
            link_up: self.link_is_up(name).await,
            rfkill_blocked: blocked,
        }
    }

    /// Administrative link state; `None` when it cannot be determined
    pub async fn link_is_up(&self, name: &str) -> Option<bool> {
        let out = self
            .run(CommandSpec::new("ip").args(["link", "show", name]).privileged())
            .await?;
        if !out.is_success() {
            return None;
        }
        Some(link_flags_up(&out.stdout))
    }

    async fn ensure_unblocked(&self) -> bool {
        let Some(out) = self.run(CommandSpec::new("rfkill").arg("list").privileged()).await else {
            // rfkill missing entirely: nothing to remediate
            return true;
        };
        if !rfkill_blocked(&out.stdout) {
            return true;
        }

        tracing::info!("Wireless is blocked, attempting to unblock");
        self.run(CommandSpec::new("rfkill").args(["unblock", "wifi"]).privileged())
            .await;

        match self.run(CommandSpec::new("rfkill").arg("list").privileged()).await {
            Some(out) => !rfkill_blocked(&out.stdout),
            None => false,
        }
    }

    async fn ensure_link_up(&self, name: &str) -> bool {
        match self.link_is_up(name).await {
            Some(true) => return true,
            None => return false,
            Some(false) => {}
        }

        tracing::info!("Bringing up interface {}", name);
        self.run(CommandSpec::new("ip").args(["link", "set", name, "up"]).privileged())
            .await;

        self.link_is_up(name).await == Some(true)
    }

    async fn supports_ap_mode(&self, name: &str) -> bool {
        let phy = match self.run(CommandSpec::new("iw").args([name, "info"])).await {
            Some(out) if out.is_success() => parse_wiphy_index(&out.stdout),
            _ => None,
        };

        let spec = match phy {
            Some(index) => CommandSpec::new("iw").args(["phy".to_string(), format!("phy{}", index), "info".to_string()]),
            None => CommandSpec::new("iw").arg("list"),
        };

        match self.run(spec).await {
            Some(out) if out.is_success() => supported_modes_include_ap(&out.stdout),
            _ => false,
        }
    }

    async fn run(&self, spec: CommandSpec) -> Option<CommandOutput> {
        let spec = spec.timeout(self.probe_timeout);
        match self.runner.run(&spec).await {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::warn!("Failed to run '{}': {}", spec, e);
                None
            }
        }
    }
}

/// Interface names from `iw dev`, in the order listed
pub fn parse_iw_dev(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("Interface"), Some(name)) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Phy index from `iw <dev> info` ("wiphy 0")
pub fn parse_wiphy_index(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("wiphy"), Some(index)) => index.parse().ok(),
            _ => None,
        }
    })
}

/// Whether the "Supported interface modes" block lists plain `AP`
/// (`AP/VLAN` alone is not enough)
pub fn supported_modes_include_ap(output: &str) -> bool {
    let mut in_modes = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Supported interface modes") {
            in_modes = true;
            continue;
        }
        if in_modes {
            match trimmed.strip_prefix("* ") {
                Some("AP") => return true,
                Some(_) => continue,
                None => in_modes = false,
            }
        }
    }
    false
}

pub fn rfkill_blocked(output: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim();
        (line.starts_with("Soft blocked:") || line.starts_with("Hard blocked:")) && line.ends_with("yes")
    })
}

/// Administrative state from the `<...>` flag list of `ip link show`
pub fn link_flags_up(output: &str) -> bool {
    let Some(start) = output.find('<') else {
        return false;
    };
    let Some(end) = output[start..].find('>') else {
        return false;
    };
    output[start + 1..start + end].split(',').any(|flag| flag == "UP")
}

/// `iw dev <name> info` reports "type AP" when transmitting as an access point
pub fn is_ap_type(output: &str) -> bool {
    output.lines().any(|line| line.trim() == "type AP")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IW_DEV: &str = "phy#0\n\tUnnamed/non-netdev interface\n\t\twdev 0x2\n\tInterface wlo1\n\t\tifindex 3\n\t\ttype managed\nphy#1\n\tInterface wlan1\n\t\ttype AP\n";

    const PHY_INFO: &str = "Wiphy phy0\n\tmax # scan SSIDs: 20\n\tSupported interface modes:\n\t\t * IBSS\n\t\t * managed\n\t\t * AP\n\t\t * AP/VLAN\n\t\t * monitor\n\tBand 1:\n\t\tCapabilities: 0x1062\n";

    #[test]
    fn parses_interfaces_in_order() {
        assert_eq!(parse_iw_dev(IW_DEV), vec!["wlo1", "wlan1"]);
        assert!(parse_iw_dev("").is_empty());
    }

    #[test]
    fn parses_wiphy_index() {
        let info = "Interface wlo1\n\tifindex 3\n\twdev 0x1\n\taddr 00:11:22:33:44:55\n\ttype managed\n\twiphy 2\n";
        assert_eq!(parse_wiphy_index(info), Some(2));
        assert_eq!(parse_wiphy_index("Interface wlo1\n"), None);
    }

    #[test]
    fn detects_ap_in_supported_modes_only() {
        assert!(supported_modes_include_ap(PHY_INFO));

        let vlan_only = "Supported interface modes:\n\t * managed\n\t * AP/VLAN\n";
        assert!(!supported_modes_include_ap(vlan_only));

        // "AP" outside the modes block does not count
        let elsewhere = "Supported interface modes:\n\t * managed\nvalid interface combinations:\n\t * #{ AP } <= 1\n\t * AP\n";
        assert!(!supported_modes_include_ap(elsewhere));
    }

    #[test]
    fn reads_rfkill_state() {
        let blocked = "0: phy0: Wireless LAN\n\tSoft blocked: yes\n\tHard blocked: no\n";
        let free = "0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: no\n";
        assert!(rfkill_blocked(blocked));
        assert!(!rfkill_blocked(free));
    }

    #[test]
    fn reads_admin_link_state_from_flags() {
        let up = "3: wlo1: <NO-CARRIER,BROADCAST,MULTICAST,UP> mtu 1500 qdisc noqueue state DOWN mode DORMANT";
        let down = "3: wlo1: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN mode DEFAULT";
        assert!(link_flags_up(up));
        assert!(!link_flags_up(down));
        assert!(!link_flags_up("garbage"));
    }

    use crate::testing::{test_config, ScriptedRunner};

    fn discoverer(runner: Arc<ScriptedRunner>, root: &std::path::Path) -> InterfaceDiscoverer {
        InterfaceDiscoverer::new(runner, &test_config(root))
    }

    #[tokio::test]
    async fn falls_back_to_sysfs_names_when_iw_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/class/net/wlan0")).unwrap();
        std::fs::create_dir_all(dir.path().join("sys/class/net/wlp2s0")).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("iw dev", CommandOutput::failure(1, "nl80211 not found"));

        let found = discoverer(runner, dir.path()).discover_interfaces().await;
        assert_eq!(found, vec!["wlan0", "wlp2s0"]);
    }

    #[tokio::test]
    async fn empty_iw_listing_also_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/class/net/wlo1")).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("iw dev", CommandOutput::success(""));

        let found = discoverer(runner, dir.path()).discover_interfaces().await;
        assert_eq!(found, vec!["wlo1"]);
    }

    #[tokio::test]
    async fn soft_block_is_lifted_once() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.with_ap_interface("wlan0");
        runner.on_sequence(
            "rfkill list",
            vec![
                CommandOutput::success("0: phy0: Wireless LAN\n\tSoft blocked: yes\n\tHard blocked: no\n"),
                CommandOutput::success("0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: no\n"),
            ],
        );
        let d = discoverer(runner.clone(), dir.path());

        assert!(d.validate_ap_capable("wlan0").await);
        assert_eq!(runner.count("rfkill unblock wifi"), 1);
        assert_eq!(runner.count("rfkill list"), 2);
    }

    #[tokio::test]
    async fn hard_block_fails_after_single_unblock() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.with_ap_interface("wlan0");
        runner.on("rfkill list", CommandOutput::success("0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: yes\n"));
        let d = discoverer(runner.clone(), dir.path());

        assert!(!d.validate_ap_capable("wlan0").await);
        assert_eq!(runner.count("rfkill unblock wifi"), 1);
        assert_eq!(runner.count("iw phy"), 0);
    }

    #[tokio::test]
    async fn down_link_is_brought_up_once() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.with_ap_interface("wlan0");
        runner.on_sequence(
            "ip link show wlan0",
            vec![
                CommandOutput::success("3: wlan0: <BROADCAST,MULTICAST> mtu 1500 state DOWN\n"),
                CommandOutput::success("3: wlan0: <BROADCAST,MULTICAST,UP> mtu 1500 state DOWN\n"),
            ],
        );
        let d = discoverer(runner.clone(), dir.path());

        assert!(d.validate_ap_capable("wlan0").await);
        assert_eq!(runner.count("ip link set wlan0 up"), 1);
        assert_eq!(runner.count("ip link show wlan0"), 2);
    }

    #[tokio::test]
    async fn capability_listing_leaves_host_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.with_ap_interface("wlan0");
        runner.on("rfkill list", CommandOutput::success("0: phy0: Wireless LAN\n\tSoft blocked: yes\n\tHard blocked: no\n"));
        runner.on("ip link show wlan0", CommandOutput::success("3: wlan0: <BROADCAST,MULTICAST> mtu 1500 state DOWN\n"));
        let d = discoverer(runner.clone(), dir.path());

        let report = d.inspect("wlan0").await;
        assert!(report.supports_ap);
        assert_eq!(report.link_up, Some(false));
        assert_eq!(report.rfkill_blocked, Some(true));
        assert_eq!(runner.count("rfkill unblock"), 0);
        assert_eq!(runner.count("ip link set"), 0);
    }

    #[test]
    fn recognizes_ap_operating_mode() {
        assert!(is_ap_type(IW_DEV.split("phy#1").nth(1).unwrap()));
        assert!(!is_ap_type("Interface wlo1\n\ttype managed\n"));
    }
}
