//! mailblast - Concurrent mail-merge campaign delivery over SMTP.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mailblast::cli::{Cli, LogFormat};
use mailblast::config::{Config, RuntimeConfig};
use mailblast::{Campaign, DeliveryEngine, MetricsServer, SmtpSender, data, scan_placeholders};

/// Initialize the tracing subscriber with the specified log format.
///
/// - `LogFormat::Text`: Human-readable format for terminals
/// - `LogFormat::Json`: Structured JSON format for log aggregation
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format);

    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Fail fast: collect and report every validation error at once.
    info!("Validating configuration");
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(
            error_count = errors.len(),
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    // Relative body_file and csv paths are anchored at the config file.
    let config_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let runtime_config = config.compile(config_dir)?;

    if cli.validate {
        print_validation_summary(&cli.config, &config, &runtime_config);
        return Ok(());
    }

    let campaign = match load_recipients(&config, config_dir) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load recipients");
            std::process::exit(1);
        }
    };
    info!(records = campaign.len(), "Recipients loaded");

    // Preview needs no connectivity: render one record and exit.
    if let Some(record_id) = cli.preview {
        let transport = Arc::new(SmtpSender::from_settings(&runtime_config.smtp)?);
        let engine = DeliveryEngine::new(
            runtime_config.run.clone(),
            runtime_config.smtp.clone(),
            transport,
            campaign,
        );
        let mail = engine
            .preview(record_id)
            .ok_or_else(|| anyhow!("record id {} is out of range", record_id))?;
        println!("Subject: {}", mail.subject);
        println!();
        println!("{}", mail.body);
        return Ok(());
    }

    info!(config_path = %cli.config.display(), "mailblast starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(runtime_config, campaign, cli.precheck))
}

/// Describe the validated configuration, including the placeholders the
/// templates may use and any tokens that will stay verbatim.
fn print_validation_summary(path: &Path, config: &Config, runtime_config: &RuntimeConfig) {
    println!("Configuration is valid: {}", path.display());
    println!(
        "  SMTP relay: {}:{} ({:?})",
        config.smtp.host, config.smtp.port, config.smtp.tls
    );
    match (&config.recipients.csv, &config.recipients.addresses) {
        (Some(csv), _) => println!("  Recipients: CSV file {}", csv),
        (None, Some(_)) => println!("  Recipients: inline address list"),
        (None, None) => {}
    }
    println!(
        "  Delivery: {} workers, {} retries",
        config.delivery.workers, config.delivery.retries
    );

    let mut available: Vec<String> = config.mapping.keys().cloned().collect();
    available.sort();
    available.push(config.recipients.recipient_column.clone());
    let tokens: Vec<String> = available.iter().map(|p| format!("{{{{{p}}}}}")).collect();
    println!("  Placeholders: {}", tokens.join(", "));

    let run = &runtime_config.run;
    for template in [&run.subject_template, &run.body_template] {
        for name in scan_placeholders(template) {
            if !available.contains(&name) {
                println!(
                    "  warning: {{{{{name}}}}} is not mapped and will stay verbatim"
                );
            }
        }
    }
}

fn load_recipients(config: &Config, config_dir: &Path) -> Result<Campaign> {
    if let Some(ref csv) = config.recipients.csv {
        let path = if Path::new(csv).is_absolute() {
            std::path::PathBuf::from(csv)
        } else {
            config_dir.join(csv)
        };
        Ok(data::load_csv(&path)?)
    } else if let Some(ref addresses) = config.recipients.addresses {
        Ok(data::from_address_list(
            addresses,
            &config.recipients.recipient_column,
        )?)
    } else {
        // Unreachable after validation, but keep the binary defensive.
        Err(anyhow!("no recipient source configured"))
    }
}

/// Main async entry point.
async fn run(runtime_config: RuntimeConfig, campaign: Campaign, precheck_only: bool) -> Result<()> {
    let transport = Arc::new(SmtpSender::from_settings(&runtime_config.smtp)?);
    let engine = Arc::new(DeliveryEngine::new(
        runtime_config.run.clone(),
        runtime_config.smtp.clone(),
        transport,
        campaign,
    ));

    let cancel = CancellationToken::new();

    // Start metrics server if enabled
    let metrics_handle = if runtime_config.metrics.enabled {
        let server = MetricsServer::new(runtime_config.metrics.port);
        let cancel_metrics = cancel.clone();
        info!(port = runtime_config.metrics.port, "Starting metrics server");
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        }))
    } else {
        None
    };

    // A run never starts without a fresh connectivity pass.
    if let Err(e) = engine.precheck().await {
        cancel.cancel();
        shutdown_metrics(metrics_handle).await;
        return Err(anyhow!("connectivity pre-check failed: {}", e));
    }

    if precheck_only {
        println!("Connectivity pre-check passed.");
        cancel.cancel();
        shutdown_metrics(metrics_handle).await;
        return Ok(());
    }

    // Setup signal handler for graceful shutdown between records
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            return;
        }
        info!("Received shutdown signal, finishing in-flight records");
        cancel_clone.cancel();
    });

    // Progress reporter: poll the read-only snapshot once per second.
    let reporter_stop = CancellationToken::new();
    {
        let campaign = engine.campaign();
        let stop = reporter_stop.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = campaign.snapshot();
                        info!(%snapshot, "Sending progress");
                    }
                    _ = stop.cancelled() => break,
                }
            }
        });
    }

    let result = engine.run(cancel.clone()).await;
    reporter_stop.cancel();

    cancel.cancel();
    shutdown_metrics(metrics_handle).await;

    match result {
        Ok(summary) => {
            if summary.snapshot.queued > 0 {
                warn!(
                    queued = summary.snapshot.queued,
                    "Run was cancelled before the queue drained"
                );
            }
            info!(
                enqueued = summary.enqueued,
                sent = summary.snapshot.sent,
                failed = summary.snapshot.failed,
                invalid = summary.snapshot.invalid,
                auth_errors = summary.snapshot.auth_error,
                "mailblast finished"
            );
            println!("Campaign finished: {}", summary.snapshot);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run rejected");
            Err(anyhow!("run rejected: {}", e))
        }
    }
}

async fn shutdown_metrics(handle: Option<tokio::task::JoinHandle<()>>) {
    if let Some(handle) = handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
}
