//! Command-line interface for mailblast using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Concurrent mail-merge campaign delivery over SMTP.
#[derive(Parser, Debug)]
#[command(name = "mailblast")]
#[command(version)]
#[command(about = "Concurrent mail-merge campaign delivery over SMTP")]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Validate configuration and exit.
    #[arg(long = "validate")]
    pub validate: bool,

    /// Run the connectivity pre-check and exit without sending.
    #[arg(long = "precheck")]
    pub precheck: bool,

    /// Render one record's subject and body and exit without sending.
    #[arg(long = "preview", value_name = "RECORD_ID")]
    pub preview: Option<usize>,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}
