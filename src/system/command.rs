use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// One OS command invocation: program, arguments, timeout and whether it
/// must run under privilege escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub privileged: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(10),
            privileged: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Command line without the escalation prefix, as used in logs and mocks
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.privileged {
            write!(f, "[privileged] ")?;
        }
        f.write_str(&self.command_line())
    }
}

/// Captured result of a command. A timed-out command is reported here
/// with `timed_out = true` and no exit code, not as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// The boundary between orchestration logic and the host. Every privileged
/// OS interaction goes through here so it can be replaced in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion or until its timeout elapses.
    /// `Err` means the command could not be spawned at all.
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Runs commands on the local host through `tokio::process`
pub struct SystemCommandRunner {
    escalation: Option<String>,
}

impl SystemCommandRunner {
    /// `escalation` is the program prefixed to privileged commands (e.g. `sudo`);
    /// an empty string runs them as-is.
    pub fn new(escalation: impl Into<String>) -> Self {
        let escalation = escalation.into();
        Self {
            escalation: if escalation.trim().is_empty() { None } else { Some(escalation) },
        }
    }

    fn build(&self, spec: &CommandSpec) -> Command {
        let mut cmd = match (&self.escalation, spec.privileged) {
            (Some(prefix), true) => {
                let mut cmd = Command::new(prefix);
                cmd.arg(&spec.program);
                cmd
            }
            _ => Command::new(&spec.program),
        };
        cmd.args(&spec.args)
            .env("PATH", "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let started = Instant::now();
        let child = self.build(spec).spawn()?;

        // Dropping the child on timeout kills it (kill_on_drop)
        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "Command timed out after {:?}: {}",
                    spec.timeout,
                    spec
                );
                return Ok(CommandOutput::timeout());
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        };

        tracing::debug!(
            "Command finished in {:?} with exit={:?}: {}",
            started.elapsed(),
            result.exit_code,
            spec
        );

        Ok(result)
    }
}
