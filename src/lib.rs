// src/lib.rs
//! mailblast - Concurrent mail-merge campaign delivery over SMTP.

pub mod campaign;
pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod template;
pub mod transport;

// Re-export commonly used types
pub use campaign::{Campaign, Record, RecordId, Status, StatusSnapshot};
pub use cli::LogFormat;
pub use engine::{DeliveryEngine, RunSummary, SendClearance, backoff_delay};
pub use metrics::{MetricsServer, register_metric_descriptions};
pub use template::{RenderedMail, render, scan_placeholders};
pub use transport::{SmtpSender, Transport, is_valid_address};
