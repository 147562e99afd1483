/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle actions an orchestration task can perform on a hotspot.
/// Every component dispatches on this enum rather than on action strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotspotAction {
    Start,
    Stop,
    Restart,
}

impl HotspotAction {
    /// Verb used on the service-manager and control-script command lines
    pub fn as_str(&self) -> &'static str {
        match self {
            HotspotAction::Start => "start",
            HotspotAction::Stop => "stop",
            HotspotAction::Restart => "restart",
        }
    }

    /// Start and restart bring the access point up and need materialized artifacts
    pub fn brings_up(&self) -> bool {
        matches!(self, HotspotAction::Start | HotspotAction::Restart)
    }
}

impl fmt::Display for HotspotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HotspotAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(HotspotAction::Start),
            "stop" => Ok(HotspotAction::Stop),
            "restart" => Ok(HotspotAction::Restart),
            other => Err(format!("unknown hotspot action '{}'", other)),
        }
    }
}
