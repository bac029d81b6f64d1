//! Core configuration types and loading.

use super::secret::SecretString;
use crate::error::ConfigError;
use crate::template::is_valid_placeholder_name;
use lettre::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "mailblast.yaml";

/// Upper bound on concurrent delivery workers.
pub const MAX_WORKERS: usize = 10;

/// Upper bound on the per-record attempt budget.
pub const MAX_RETRIES: u32 = 10;

pub(crate) fn default_true() -> bool {
    true
}

/// Main configuration structure for mailblast.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Mail relay connection settings.
    pub smtp: SmtpConfig,
    /// Sender identity (envelope from + display name).
    pub sender: SenderConfig,
    /// Subject and body templates.
    pub message: MessageConfig,
    /// Where recipient records come from.
    pub recipients: RecipientsConfig,
    /// Placeholder name -> source column name.
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    /// Worker pool and retry tuning.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Metrics exposition configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// TLS mode for the SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// No encryption. Dangerous outside a test network.
    None,
    /// Upgrade a plaintext connection via STARTTLS.
    Starttls,
    /// Direct TLS connection.
    Tls,
}

/// SMTP relay connection configuration.
///
/// `username` and `password` support `${VAR}` environment expansion,
/// resolved at compile time so secrets can stay out of the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname, e.g. "smtp.gmail.com".
    pub host: String,
    /// Relay port (usually 587 for STARTTLS, 465 for TLS).
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// TLS mode (default: starttls).
    #[serde(default = "default_tls_mode")]
    pub tls: TlsMode,
    /// Verify the relay certificate (default: true).
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    /// Session timeout applied to every connect/submit cycle.
    #[serde(default = "default_smtp_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_tls_mode() -> TlsMode {
    TlsMode::Starttls
}

fn default_smtp_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Sender identity.
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// Envelope/From address.
    pub address: String,
    /// Display name shown in the From header.
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

fn default_display_name() -> String {
    "Bulk Sender App".to_string()
}

/// Subject and body templates.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfig {
    /// Subject line template (placeholders allowed).
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Inline HTML body template.
    #[serde(default)]
    pub body: Option<String>,
    /// Path to an HTML body template file, relative to the config file.
    /// Takes priority over `body`.
    #[serde(default)]
    pub body_file: Option<String>,
}

fn default_subject() -> String {
    "Your Personalized Message".to_string()
}

/// Recipient record source.
///
/// Exactly one of `csv` or `addresses` supplies the records. The
/// `addresses` form is a comma-separated list that becomes a single-column
/// campaign named after `recipient_column`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientsConfig {
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub addresses: Option<String>,
    /// Column holding the recipient address (default: "email").
    #[serde(default = "default_recipient_column")]
    pub recipient_column: String,
}

fn default_recipient_column() -> String {
    "email".to_string()
}

/// Worker pool and retry tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Concurrent delivery workers (1..=10).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Total attempt budget per record. 0 still makes one attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// First backoff delay after a transient failure; doubles per attempt.
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
    /// Cap on the backoff delay.
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,
}

fn default_workers() -> usize {
    3
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retries: default_retries(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics exposition is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Port to expose metrics on (default: 9090).
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }

    /// Validate the whole configuration, collecting every error found.
    ///
    /// # Errors
    /// Returns a `Vec<ConfigError>` with all problems so the operator can
    /// fix them in one pass.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.smtp.host.trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "smtp.host must not be empty".to_string(),
            ));
        }
        if self.smtp.port == 0 {
            errors.push(ConfigError::ValidationError(
                "smtp.port must not be 0".to_string(),
            ));
        }
        match (&self.smtp.username, &self.smtp.password) {
            (Some(_), None) => errors.push(ConfigError::ValidationError(
                "smtp.password required when smtp.username is set".to_string(),
            )),
            (None, Some(_)) => errors.push(ConfigError::ValidationError(
                "smtp.username required when smtp.password is set".to_string(),
            )),
            _ => {}
        }

        if self.sender.address.parse::<Address>().is_err() {
            errors.push(ConfigError::InvalidSender(format!(
                "'{}' is not a valid email address",
                self.sender.address
            )));
        }

        if self.message.body.is_none() && self.message.body_file.is_none() {
            errors.push(ConfigError::ValidationError(
                "message requires either body or body_file".to_string(),
            ));
        }

        if self.recipients.csv.is_none() && self.recipients.addresses.is_none() {
            errors.push(ConfigError::ValidationError(
                "recipients requires either csv or addresses".to_string(),
            ));
        }
        if self.recipients.recipient_column.trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "recipients.recipient_column must not be empty".to_string(),
            ));
        }

        for placeholder in self.mapping.keys() {
            if !is_valid_placeholder_name(placeholder) {
                errors.push(ConfigError::InvalidMapping(format!(
                    "placeholder '{}' must match [A-Za-z0-9_]+",
                    placeholder
                )));
            }
        }

        if self.delivery.workers == 0 || self.delivery.workers > MAX_WORKERS {
            errors.push(ConfigError::ValidationError(format!(
                "delivery.workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.delivery.workers
            )));
        }
        if self.delivery.retries > MAX_RETRIES {
            errors.push(ConfigError::ValidationError(format!(
                "delivery.retries must be at most {}, got {}",
                MAX_RETRIES, self.delivery.retries
            )));
        }
        if self.delivery.backoff_max < self.delivery.backoff_base {
            errors.push(ConfigError::ValidationError(
                "delivery.backoff_max must be at least backoff_base".to_string(),
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
