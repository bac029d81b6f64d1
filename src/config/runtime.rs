//! Compiled runtime configuration.
//!
//! [`Config::compile`] turns the raw YAML shapes into resolved values:
//! env vars substituted, the body template read from disk, the sender
//! parsed into a mailbox. The result is captured by value when a
//! [`DeliveryEngine`](crate::engine::DeliveryEngine) is built, so editing
//! configuration inputs can never affect an in-flight run.

use super::env::{resolve_body_template, resolve_env_vars};
use super::secret::SecretString;
use super::types::{Config, MetricsConfig, TlsMode};
use crate::error::ConfigError;
use lettre::message::Mailbox;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Duration;

/// Resolved SMTP session settings.
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub tls: TlsMode,
    pub tls_verify: bool,
    pub timeout: Duration,
}

impl SmtpSettings {
    /// Stable digest of every transport-affecting field.
    ///
    /// A connectivity pre-check pass is recorded against this value, so a
    /// pass obtained under one configuration can never authorize sending
    /// under an edited one.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.host.hash(&mut hasher);
        self.port.hash(&mut hasher);
        self.username.hash(&mut hasher);
        self.password.as_ref().map(SecretString::expose).hash(&mut hasher);
        (self.tls as u8).hash(&mut hasher);
        self.tls_verify.hash(&mut hasher);
        self.timeout.hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .field("tls_verify", &self.tls_verify)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Everything one run needs, resolved and immutable.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// From header (display name + address).
    pub from: Mailbox,
    pub subject_template: String,
    pub body_template: String,
    /// Placeholder name -> source column name.
    pub mapping: HashMap<String, String>,
    /// Column holding the recipient address.
    pub recipient_column: String,
    pub workers: usize,
    /// Total attempt budget per record.
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Compiled configuration: transport settings + run bundle + metrics.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub smtp: SmtpSettings,
    pub run: RunConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Compile the validated configuration into runtime form.
    ///
    /// `config_dir` anchors relative `body_file` paths (the directory the
    /// config file was loaded from).
    ///
    /// # Errors
    /// Returns [`ConfigError`] for undefined `${VAR}` references, an
    /// unreadable body file, or an unparseable sender address.
    pub fn compile(&self, config_dir: &Path) -> Result<RuntimeConfig, ConfigError> {
        let username = self
            .smtp
            .username
            .as_ref()
            .map(|u| resolve_env_vars(u))
            .transpose()
            .map_err(|e| ConfigError::ValidationError(format!("smtp.username: {}", e)))?;

        let password = self
            .smtp
            .password
            .as_ref()
            .map(|p| resolve_env_vars(p.expose()))
            .transpose()
            .map_err(|e| ConfigError::ValidationError(format!("smtp.password: {}", e)))?
            .map(SecretString::new);

        let body_template = resolve_body_template(&self.message, config_dir)?;

        let address = self.sender.address.parse().map_err(|e| {
            ConfigError::InvalidSender(format!("'{}': {}", self.sender.address, e))
        })?;
        let from = Mailbox::new(Some(self.sender.display_name.clone()), address);

        Ok(RuntimeConfig {
            smtp: SmtpSettings {
                host: self.smtp.host.clone(),
                port: self.smtp.port,
                username,
                password,
                tls: self.smtp.tls,
                tls_verify: self.smtp.tls_verify,
                timeout: self.smtp.timeout,
            },
            run: RunConfig {
                from,
                subject_template: self.message.subject.clone(),
                body_template,
                mapping: self.mapping.clone(),
                recipient_column: self.recipients.recipient_column.clone(),
                workers: self.delivery.workers,
                retries: self.delivery.retries,
                backoff_base: self.delivery.backoff_base,
                backoff_max: self.delivery.backoff_max,
            },
            metrics: self.metrics.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("mailer".to_string()),
            password: Some(SecretString::new("hunter2".to_string())),
            tls: TlsMode::Starttls,
            tls_verify: true,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn fingerprint_is_stable_for_equal_settings() {
        assert_eq!(settings().fingerprint(), settings().fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_every_transport_field() {
        let base = settings().fingerprint();

        let mut edited = settings();
        edited.host = "smtp.other.com".to_string();
        assert_ne!(edited.fingerprint(), base);

        let mut edited = settings();
        edited.port = 465;
        assert_ne!(edited.fingerprint(), base);

        let mut edited = settings();
        edited.password = Some(SecretString::new("changed".to_string()));
        assert_ne!(edited.fingerprint(), base);

        let mut edited = settings();
        edited.tls = TlsMode::Tls;
        assert_ne!(edited.fingerprint(), base);

        let mut edited = settings();
        edited.tls_verify = false;
        assert_ne!(edited.fingerprint(), base);
    }

    #[test]
    fn smtp_settings_debug_redacts_password() {
        let debug = format!("{:?}", settings());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
