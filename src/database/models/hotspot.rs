use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_CHANNEL: i32 = 6;
pub const MAX_SSID_LEN: usize = 32;
pub const MIN_PASSPHRASE_LEN: usize = 8;
pub const MAX_PASSPHRASE_LEN: usize = 63;

/// Hotspot ids double as the third octet of the hotspot's /24, so at most
/// this many hotspots can share one host.
pub const MAX_SUBNET_HOTSPOT_ID: i32 = 254;

/// Desired-state record for one access point. Owned by the CRUD layer;
/// orchestration only writes `is_active` and `current_task_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Hotspot {
    pub id: i32,
    pub owner_id: i32,
    pub ssid: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub channel: Option<i32>,
    /// Mbps per user
    pub bandwidth_limit: i32,
    pub max_users: i32,
    pub is_active: bool,
    pub current_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HotspotValidationError {
    #[error("SSID must be 1-32 characters of letters, digits, space, '-', '_' or '.': {0:?}")]
    InvalidSsid(String),

    #[error("Passphrase must be 8-63 printable characters without quotes, backslashes, '$' or '`'")]
    InvalidPassphrase,

    #[error("Channel must be a positive integer, got {0}")]
    InvalidChannel(i32),

    #[error("Hotspot id {0} is outside the addressable range 1-254")]
    IdOutOfSubnetRange(i32),
}

impl Hotspot {
    /// Minimal constructor for a freshly declared hotspot
    pub fn new(id: i32, owner_id: i32, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            ssid: ssid.into(),
            password: password.into(),
            channel: Some(DEFAULT_CHANNEL),
            bandwidth_limit: 10,
            max_users: 10,
            is_active: false,
            current_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_channel(mut self, channel: i32) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Channel with the platform default applied
    pub fn channel(&self) -> i32 {
        match self.channel {
            Some(c) if c != 0 => c,
            _ => DEFAULT_CHANNEL,
        }
    }

    /// Systemd unit name, also the marker daemons carry on their command line
    pub fn unit_name(id: i32) -> String {
        format!("hotspot_{}.service", id)
    }

    /// Marker that appears in the daemon command lines started for this hotspot
    pub fn process_marker(id: i32) -> String {
        format!("hotspot_{}", id)
    }

    /// Check declared fields before they are rendered into shell-sourced artifacts
    pub fn validate(&self) -> Result<(), HotspotValidationError> {
        if !(1..=MAX_SUBNET_HOTSPOT_ID).contains(&self.id) {
            return Err(HotspotValidationError::IdOutOfSubnetRange(self.id));
        }

        if !is_valid_ssid(&self.ssid) {
            return Err(HotspotValidationError::InvalidSsid(self.ssid.clone()));
        }

        if !is_valid_passphrase(&self.password) {
            return Err(HotspotValidationError::InvalidPassphrase);
        }

        let channel = self.channel();
        if channel <= 0 {
            return Err(HotspotValidationError::InvalidChannel(channel));
        }

        Ok(())
    }
}

pub fn is_valid_ssid(ssid: &str) -> bool {
    !ssid.is_empty()
        && ssid.len() <= MAX_SSID_LEN
        && ssid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
}

pub fn is_valid_passphrase(passphrase: &str) -> bool {
    (MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&passphrase.len())
        && passphrase
            .chars()
            .all(|c| c.is_ascii_graphic() || c == ' ')
        && !passphrase.contains(['"', '\\', '$', '`'])
}
