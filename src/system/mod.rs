// Host process boundary: every OS command the orchestrator issues goes through here

pub mod command;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
