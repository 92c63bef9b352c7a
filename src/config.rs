//! Configuration Module
//!
//! Centralized configuration for the directory service: the registration
//! surface, the certificate manager, the commercial CA account, and the
//! outbound mail relay.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the directory that owns the records, e.g. `trisa.directory`
    pub directory_id: String,

    /// When set, the service answers probes with MAINTENANCE and
    /// refuses mutating RPCs
    #[serde(default)]
    pub maintenance: bool,

    /// Registration API configuration
    pub gds: GdsConfig,

    /// Certificate manager configuration
    pub certman: CertManConfig,

    /// Commercial CA account configuration
    pub sectigo: SectigoConfig,

    /// Outbound mail configuration
    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory_id: "trisa.directory".to_string(),
            maintenance: false,
            gds: GdsConfig::default(),
            certman: CertManConfig::default(),
            sectigo: SectigoConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

/// Registration API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdsConfig {
    /// Serve the registration API
    pub enabled: bool,

    /// Bind address of form `host:port`
    pub bind_addr: String,

    /// Base directory for the entity store and the secret vault
    pub data_dir: PathBuf,
}

impl Default for GdsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0:4433".to_string(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Certificate manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertManConfig {
    /// Run the certificate manager loop
    pub enabled: bool,

    /// Seconds between ticks
    pub interval_secs: u64,

    /// Directory where downloaded bundles are archived for operators
    pub storage: PathBuf,

    /// Deadline in seconds for each external call made during a tick
    pub request_timeout_secs: u64,
}

impl CertManConfig {
    /// Tick interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-call deadline as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CertManConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            storage: PathBuf::from("./certs"),
            request_timeout_secs: 30,
        }
    }
}

/// Commercial CA account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectigoConfig {
    /// Base URL of the CA's batch API
    pub base_url: String,

    /// Account username
    #[serde(default)]
    pub username: String,

    /// Account password
    #[serde(default)]
    pub password: String,

    /// Certificate profile batches are created under
    pub profile: String,
}

impl Default for SectigoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iot.sectigo.com".to_string(),
            username: String::new(),
            password: String::new(),
            profile: "CipherTrace EE".to_string(),
        }
    }
}

/// Outbound mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay hostname
    pub smtp_host: String,

    /// SMTP relay port
    pub smtp_port: u16,

    /// Relay username; empty disables authentication and TLS
    #[serde(default)]
    pub username: String,

    /// Relay password
    #[serde(default)]
    pub password: String,

    /// Sender address on all outbound mail
    pub sender: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            username: String::new(),
            password: String::new(),
            sender: "no-reply@trisa.directory".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "directory_id cannot be empty".to_string(),
            ));
        }

        if self.gds.enabled && self.gds.bind_addr.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "gds.bind_addr cannot be empty when the API is enabled".to_string(),
            ));
        }

        if self.certman.enabled {
            if self.certman.interval_secs == 0 {
                return Err(ConfigError::InvalidConfig(
                    "certman.interval_secs must be positive".to_string(),
                ));
            }
            if self.certman.storage.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "certman.storage must be a directory path".to_string(),
                ));
            }
            if self.sectigo.profile.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "sectigo.profile cannot be empty".to_string(),
                ));
            }
        }

        if !self.email.sender.contains('@') {
            return Err(ConfigError::InvalidConfig(format!(
                "email.sender is not an address: {}",
                self.email.sender
            )));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example(path: &PathBuf) -> Result<(), ConfigError> {
        let example = Config {
            directory_id: "trisa.directory".to_string(),
            maintenance: false,
            gds: GdsConfig {
                enabled: true,
                bind_addr: "0.0.0.0:4433".to_string(),
                data_dir: PathBuf::from("/var/lib/gds/data"),
            },
            certman: CertManConfig {
                enabled: true,
                interval_secs: 600,
                storage: PathBuf::from("/var/lib/gds/certs"),
                request_timeout_secs: 30,
            },
            sectigo: SectigoConfig {
                base_url: "https://iot.sectigo.com".to_string(),
                username: "gds-issuer".to_string(),
                password: "changeme".to_string(),
                profile: "CipherTrace EE".to_string(),
            },
            email: EmailConfig {
                smtp_host: "smtp.mailgun.org".to_string(),
                smtp_port: 587,
                username: "postmaster@trisa.directory".to_string(),
                password: "changeme".to_string(),
                sender: "no-reply@trisa.directory".to_string(),
            },
        };

        example.save(path)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
