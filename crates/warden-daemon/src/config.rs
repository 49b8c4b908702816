//! Configuration file management.
//!
//! `config.toml` in the data directory; every section and field is optional.
//! `WARDEN_DATA_DIR` overrides the data directory and the config location.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use warden_guardian::registry::RecoveryPolicy;
use warden_types::{
    DEFAULT_GRACE_PERIOD_SECS, DEFAULT_INACTIVITY_PERIOD_SECS, DEFAULT_RECOVERY_COOLDOWN_SECS,
    DEFAULT_RECOVERY_DELAY_SECS, DEFAULT_RECOVERY_EXPIRY_SECS,
};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Defaults for new recovery configs.
    #[serde(default)]
    pub recovery: RecoveryConfigDefaults,
    /// Defaults for new emergency access records.
    #[serde(default)]
    pub emergency: EmergencyConfigDefaults,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Database file name inside the data directory.
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// Seconds between sweeps. 0 disables the sweeper.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfigDefaults {
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_expiry")]
    pub expiry_secs: u64,
    /// Time-lock between initiation and completion, 1 to 30 days.
    #[serde(default = "default_recovery_delay")]
    pub recovery_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfigDefaults {
    #[serde(default = "default_inactivity")]
    pub inactivity_period_secs: u64,
    #[serde(default = "default_grace")]
    pub grace_period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Socket file name inside the data directory.
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    /// Recent events kept for `get_events` and per-subscriber buffer size.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    /// `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_file() -> String {
    "warden.db".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_cooldown() -> u64 {
    DEFAULT_RECOVERY_COOLDOWN_SECS
}

fn default_expiry() -> u64 {
    DEFAULT_RECOVERY_EXPIRY_SECS
}

fn default_recovery_delay() -> u64 {
    DEFAULT_RECOVERY_DELAY_SECS
}

fn default_inactivity() -> u64 {
    DEFAULT_INACTIVITY_PERIOD_SECS
}

fn default_grace() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}

fn default_socket_name() -> String {
    "wardend.sock".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            db_file: default_db_file(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for RecoveryConfigDefaults {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            expiry_secs: default_expiry(),
            recovery_delay_secs: default_recovery_delay(),
        }
    }
}

impl Default for EmergencyConfigDefaults {
    fn default() -> Self {
        Self {
            inactivity_period_secs: default_inactivity(),
            grace_period_secs: default_grace(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl RecoveryConfigDefaults {
    pub fn policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            cooldown_secs: self.cooldown_secs,
            expiry_secs: self.expiry_secs,
            recovery_delay_secs: self.recovery_delay_secs,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject defaults the core would refuse anyway.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.recovery.policy().validate()?;
        warden_emergency::monitor::validate_periods(
            self.emergency.inactivity_period_secs,
            self.emergency.grace_period_secs,
        )?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.ledger.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.ledger.data_dir)
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(&self.ledger.db_file)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join(&self.rpc.socket_name)
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("WARDEN_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Warden")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".warden")
        }
    }
}

fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/warden"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.ledger.db_file, "warden.db");
        assert_eq!(config.ledger.sweep_interval_secs, 60);
        assert_eq!(config.recovery.policy(), RecoveryPolicy::default());
        assert_eq!(
            config.recovery.recovery_delay_secs,
            DEFAULT_RECOVERY_DELAY_SECS
        );
        assert_eq!(config.rpc.event_buffer, 1000);
        assert_eq!(
            config.emergency.inactivity_period_secs,
            DEFAULT_INACTIVITY_PERIOD_SECS
        );
        assert_eq!(config.logging.log_level, "info");
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [recovery]
            cooldown_secs = 0

            [emergency]
            grace_period_secs = 172800
            "#,
        )
        .expect("parse");
        assert_eq!(config.recovery.cooldown_secs, 0);
        assert_eq!(config.recovery.expiry_secs, DEFAULT_RECOVERY_EXPIRY_SECS);
        assert_eq!(
            config.recovery.recovery_delay_secs,
            DEFAULT_RECOVERY_DELAY_SECS
        );
        assert_eq!(config.emergency.grace_period_secs, 172_800);
        config.validate().expect("valid");
    }

    #[test]
    fn test_out_of_range_defaults_rejected() {
        for toml_str in [
            "[emergency]\ninactivity_period_secs = 60\n",
            "[recovery]\nrecovery_delay_secs = 0\n",
        ] {
            let config: DaemonConfig = toml::from_str(toml_str).expect("parse");
            assert!(config.validate().is_err(), "{toml_str}");
        }
    }
}
