use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub orchestration: OrchestrationConfig,
    pub commands: CommandConfig,
    pub paths: PathConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Table the CRUD layer keeps hotspot records in
    pub hotspot_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

/// Retry, verification and worker-pool settings for orchestration tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Total execution attempts per task, first attempt included
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub backoff_jitter: bool,
    /// Post-start status polls; the wait before poll n is `verify_step_secs * n`
    pub verify_attempts: u32,
    pub verify_step_secs: u64,
    /// Hard ceiling for one attempt, regardless of internal state
    pub task_time_limit_secs: u64,
    pub workers: usize,
    pub result_ttl_secs: u64,
}

/// Timeouts and privilege escalation for OS command invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub start_timeout_secs: u64,
    pub control_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub start_grace_secs: u64,
    pub stop_grace_secs: u64,
    /// Program prefixed to privileged commands; empty disables escalation
    pub escalation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub env_dir: PathBuf,
    pub unit_dir: PathBuf,
    pub control_script: PathBuf,
    pub log_dir: PathBuf,
    pub sys_class_net: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub uplink_interface: String,
    pub dhcp_lease_time: String,
    pub fallback_interfaces: Vec<String>,
}

impl OrchestrationConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn verify_step(&self) -> Duration {
        Duration::from_secs(self.verify_step_secs)
    }

    pub fn task_time_limit(&self) -> Duration {
        Duration::from_secs(self.task_time_limit_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl CommandConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_secs(self.start_grace_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        override_parsed("DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_parsed("DATABASE_CONNECTION_TIMEOUT", &mut self.database.connection_timeout);
        if let Ok(v) = env::var("DATABASE_HOTSPOT_TABLE") {
            self.database.hotspot_table = v.trim().to_string();
        }

        // API overrides
        if let Ok(v) = env::var("HOTSPOT_API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        override_parsed("API_ENABLE_REQUEST_LOGGING", &mut self.api.enable_request_logging);

        // Orchestration overrides
        override_parsed("ORCHESTRATION_MAX_ATTEMPTS", &mut self.orchestration.max_attempts);
        override_parsed("ORCHESTRATION_BACKOFF_BASE_SECS", &mut self.orchestration.backoff_base_secs);
        override_parsed("ORCHESTRATION_BACKOFF_MAX_SECS", &mut self.orchestration.backoff_max_secs);
        override_parsed("ORCHESTRATION_BACKOFF_JITTER", &mut self.orchestration.backoff_jitter);
        override_parsed("ORCHESTRATION_VERIFY_ATTEMPTS", &mut self.orchestration.verify_attempts);
        override_parsed("ORCHESTRATION_VERIFY_STEP_SECS", &mut self.orchestration.verify_step_secs);
        override_parsed("ORCHESTRATION_TASK_TIME_LIMIT_SECS", &mut self.orchestration.task_time_limit_secs);
        override_parsed("ORCHESTRATION_WORKERS", &mut self.orchestration.workers);
        override_parsed("ORCHESTRATION_RESULT_TTL_SECS", &mut self.orchestration.result_ttl_secs);

        // Command overrides
        override_parsed("COMMANDS_START_TIMEOUT_SECS", &mut self.commands.start_timeout_secs);
        override_parsed("COMMANDS_CONTROL_TIMEOUT_SECS", &mut self.commands.control_timeout_secs);
        override_parsed("COMMANDS_PROBE_TIMEOUT_SECS", &mut self.commands.probe_timeout_secs);
        override_parsed("COMMANDS_START_GRACE_SECS", &mut self.commands.start_grace_secs);
        override_parsed("COMMANDS_STOP_GRACE_SECS", &mut self.commands.stop_grace_secs);
        if let Ok(v) = env::var("COMMANDS_ESCALATION") {
            self.commands.escalation = v.trim().to_string();
        }

        // Path overrides
        override_parsed("PATHS_ENV_DIR", &mut self.paths.env_dir);
        override_parsed("PATHS_UNIT_DIR", &mut self.paths.unit_dir);
        override_parsed("PATHS_CONTROL_SCRIPT", &mut self.paths.control_script);
        override_parsed("PATHS_LOG_DIR", &mut self.paths.log_dir);
        override_parsed("PATHS_SYS_CLASS_NET", &mut self.paths.sys_class_net);

        // Network overrides
        if let Ok(v) = env::var("NETWORK_UPLINK_INTERFACE") {
            self.network.uplink_interface = v.trim().to_string();
        }
        if let Ok(v) = env::var("NETWORK_DHCP_LEASE_TIME") {
            self.network.dhcp_lease_time = v.trim().to_string();
        }
        if let Ok(v) = env::var("NETWORK_FALLBACK_INTERFACES") {
            self.network.fallback_interfaces = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    fn base_paths() -> PathConfig {
        PathConfig {
            env_dir: PathBuf::from("/var/lib/hotspot/env"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            control_script: PathBuf::from("/usr/local/sbin/hotspot-control"),
            log_dir: PathBuf::from("/var/log/hotspot"),
            sys_class_net: PathBuf::from("/sys/class/net"),
        }
    }

    fn base_network() -> NetworkConfig {
        NetworkConfig {
            uplink_interface: "eth0".to_string(),
            dhcp_lease_time: "12h".to_string(),
            fallback_interfaces: vec![
                "wlo1".to_string(),
                "wlan0".to_string(),
                "wlan1".to_string(),
                "wlp2s0".to_string(),
            ],
        }
    }

    fn base_commands() -> CommandConfig {
        CommandConfig {
            start_timeout_secs: 120,
            control_timeout_secs: 30,
            probe_timeout_secs: 10,
            start_grace_secs: 5,
            stop_grace_secs: 3,
            escalation: "sudo".to_string(),
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 5,
                connection_timeout: 30,
                hotspot_table: "hotspots".to_string(),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            orchestration: OrchestrationConfig {
                max_attempts: 3,
                backoff_base_secs: 5,
                backoff_max_secs: 60,
                backoff_jitter: true,
                verify_attempts: 3,
                verify_step_secs: 2,
                task_time_limit_secs: 180,
                workers: 2,
                result_ttl_secs: 60 * 60,
            },
            commands: Self::base_commands(),
            paths: PathConfig {
                env_dir: PathBuf::from("/tmp/hotspot-dev/env"),
                log_dir: PathBuf::from("/tmp/hotspot-dev/log"),
                ..Self::base_paths()
            },
            network: Self::base_network(),
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 10,
                hotspot_table: "hotspots".to_string(),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            orchestration: OrchestrationConfig {
                max_attempts: 3,
                backoff_base_secs: 30,
                backoff_max_secs: 600,
                backoff_jitter: true,
                verify_attempts: 3,
                verify_step_secs: 5,
                task_time_limit_secs: 180,
                workers: 4,
                result_ttl_secs: 24 * 60 * 60,
            },
            commands: Self::base_commands(),
            paths: Self::base_paths(),
            network: Self::base_network(),
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 5,
                hotspot_table: "hotspots".to_string(),
            },
            api: ApiConfig {
                port: 8000,
                enable_request_logging: false,
            },
            orchestration: OrchestrationConfig {
                max_attempts: 3,
                backoff_base_secs: 30,
                backoff_max_secs: 600,
                backoff_jitter: true,
                verify_attempts: 3,
                verify_step_secs: 5,
                task_time_limit_secs: 180,
                workers: 8,
                result_ttl_secs: 24 * 60 * 60,
            },
            commands: Self::base_commands(),
            paths: Self::base_paths(),
            network: Self::base_network(),
        }
    }
}

fn override_parsed<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.trim().parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!("Ignoring unparseable value for {}: {:?}", key, v),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
