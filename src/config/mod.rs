//! Configuration loading and validation for mailblast.
//!
//! This module handles loading the YAML configuration file,
//! validation, and managing environment variables for secrets.

mod env;
mod runtime;
mod secret;
mod types;

pub use env::{resolve_body_template, resolve_env_vars};
pub use runtime::{RunConfig, RuntimeConfig, SmtpSettings};
pub use secret::SecretString;
pub use types::{
    Config, DEFAULT_CONFIG_PATH, DeliveryConfig, MAX_RETRIES, MAX_WORKERS, MessageConfig,
    MetricsConfig, RecipientsConfig, SenderConfig, SmtpConfig, TlsMode,
};

#[cfg(test)]
mod tests;
