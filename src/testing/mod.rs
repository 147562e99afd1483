//! Test doubles for the host boundary: a scripted command runner and a
//! config rooted in a scratch directory.
//!
//! Public on purpose: `ScriptedRunner` is the supported way to drive an
//! `Engine` (or any component taking a `CommandRunner`) without touching
//! the host, for this crate's integration tests and for embedders alike.
//! Nothing in the production wiring (`Engine::connect`, the binaries)
//! refers to it.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::AppConfig;
use crate::system::{CommandOutput, CommandRunner, CommandSpec};

#[derive(Debug, Clone)]
struct Reply {
    output: CommandOutput,
    delay: Option<Duration>,
    spawn_error: bool,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    replies: Vec<Reply>,
    served: usize,
}

impl Rule {
    /// Replies are served in order; the last one repeats forever
    fn next(&mut self) -> Reply {
        let index = self.served.min(self.replies.len() - 1);
        self.served += 1;
        self.replies[index].clone()
    }
}

/// Command runner answering from a script keyed by command-line prefix.
/// The most recently registered matching rule wins; unmatched commands
/// succeed with empty output. Every call is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.on_sequence(prefix, vec![output])
    }

    pub fn on_sequence(&self, prefix: &str, outputs: Vec<CommandOutput>) -> &Self {
        let replies = outputs
            .into_iter()
            .map(|output| Reply { output, delay: None, spawn_error: false })
            .collect();
        self.push(prefix, replies)
    }

    /// Reply only after `delay` has elapsed (on the tokio clock)
    pub fn on_delayed(&self, prefix: &str, delay: Duration, output: CommandOutput) -> &Self {
        self.push(prefix, vec![Reply { output, delay: Some(delay), spawn_error: false }])
    }

    /// Fail as if the program did not exist
    pub fn on_spawn_error(&self, prefix: &str) -> &Self {
        self.push(
            prefix,
            vec![Reply { output: CommandOutput::default(), delay: None, spawn_error: true }],
        )
    }

    /// Script a healthy, AP-capable interface that `iw dev` lists first
    pub fn with_ap_interface(&self, name: &str) -> &Self {
        self.on(
            "iw dev",
            CommandOutput::success(format!("phy#0\n\tInterface {}\n\t\ttype managed\n", name)),
        );
        self.on(&format!("iw dev {} info", name), CommandOutput::success("\ttype managed\n"));
        self.on(&format!("iw {} info", name), CommandOutput::success(format!("Interface {}\n\twiphy 0\n", name)));
        self.on(
            "iw phy phy0 info",
            CommandOutput::success("Wiphy phy0\n\tSupported interface modes:\n\t\t * managed\n\t\t * AP\n"),
        );
        self.on(
            &format!("ip link show {}", name),
            CommandOutput::success(format!(
                "3: {}: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 state UP mode DORMANT\n",
                name
            )),
        );
        self.on("rfkill list", CommandOutput::success("0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: no\n"))
    }

    /// Script the service manager so `systemctl is-active` reports `active`
    pub fn with_unit_active(&self, hotspot_id: i32) -> &Self {
        self.on(
            &format!("systemctl is-active hotspot_{}.service", hotspot_id),
            CommandOutput::success("active\n"),
        )
    }

    pub fn with_unit_inactive(&self, hotspot_id: i32) -> &Self {
        self.on(
            &format!("systemctl is-active hotspot_{}.service", hotspot_id),
            CommandOutput::failure(3, "inactive"),
        )
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    /// Number of recorded calls whose command line starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn push(&self, prefix: &str, replies: Vec<Reply>) -> &Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule { prefix: prefix.to_string(), replies, served: 0 });
        }
        self
    }

    fn reply_for(&self, line: &str) -> Option<Reply> {
        let mut rules = self.rules.lock().ok()?;
        rules
            .iter_mut()
            .rev()
            .find(|rule| line.starts_with(&rule.prefix))
            .map(Rule::next)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }

        let Some(reply) = self.reply_for(&spec.command_line()) else {
            return Ok(CommandOutput::success(""));
        };

        if let Some(delay) = reply.delay {
            if delay >= spec.timeout {
                tokio::time::sleep(spec.timeout).await;
                return Ok(CommandOutput::timeout());
            }
            tokio::time::sleep(delay).await;
        }

        if reply.spawn_error {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: not found", spec.program),
            ));
        }
        Ok(reply.output)
    }
}

/// Development config with every artifact path under `root` and short
/// retry, verify and grace timings
pub fn test_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::development();
    config.paths.env_dir = root.join("env");
    config.paths.unit_dir = root.join("units");
    config.paths.log_dir = root.join("log");
    config.paths.sys_class_net = root.join("sys/class/net");
    config.paths.control_script = root.join("hotspot-control");
    config.commands.escalation = String::new();
    config.commands.start_grace_secs = 1;
    config.commands.stop_grace_secs = 1;
    config.orchestration.max_attempts = 3;
    config.orchestration.backoff_base_secs = 1;
    config.orchestration.backoff_max_secs = 4;
    config.orchestration.backoff_jitter = false;
    config.orchestration.verify_attempts = 3;
    config.orchestration.verify_step_secs = 1;
    config.orchestration.workers = 2;
    config
}
