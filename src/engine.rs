//! Delivery engine: the concurrent dispatch-with-retry worker pool.
//!
//! One [`DeliveryEngine`] owns everything a send job needs: the run
//! configuration captured by value, a [`Transport`] capability, and the
//! shared [`Campaign`] state. A run drains a per-run work queue with N
//! workers supervised by a `JoinSet`; each worker takes one record to a
//! terminal status before pulling the next.
//!
//! # Architecture
//!
//! ```text
//! main.rs
//!     |
//!     v
//! engine.rs (DeliveryEngine)
//!     |
//!     +-- spawn --> worker 1 --+-- validate --> template.rs --> transport --> campaign.rs
//!     +-- spawn --> worker 2 --+                                 (retry+backoff)   (status)
//!     +-- spawn --> worker n --+
//! ```
//!
//! # Failure isolation
//!
//! A record's outcome never leaks past its own status: transport errors
//! are retried then mapped to `Failed`, authentication rejections stop the
//! record immediately, and even a panic while processing one item is
//! caught and recorded as `Failed` without disturbing the pool.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::campaign::{Campaign, Record, RecordId, Status, StatusSnapshot};
use crate::config::{RunConfig, SmtpSettings};
use crate::error::{StartError, TransportError};
use crate::template::{self, RenderedMail};
use crate::transport::{Transport, is_valid_address};

/// Calculate exponential backoff delay.
///
/// Formula: min(base * 2^attempt, max)
///
/// # Arguments
///
/// * `attempt` - Current attempt number (0-indexed)
/// * `base` - Base delay duration
/// * `max` - Maximum delay cap
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = base.saturating_mul(2_u32.saturating_pow(attempt));
    std::cmp::min(delay, max)
}

/// Records which transport configuration a connectivity pre-check passed
/// for.
///
/// A clearance is granted against a fingerprint of the settings it was
/// verified with, so a pass obtained under one configuration never covers
/// an edited one: change any transport field and the clearance no longer
/// applies.
#[derive(Debug, Default)]
pub struct SendClearance {
    verified: Option<u64>,
}

impl SendClearance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful pre-check for these settings.
    pub fn grant(&mut self, settings: &SmtpSettings) {
        self.verified = Some(settings.fingerprint());
    }

    /// Drop any previous pass.
    pub fn revoke(&mut self) {
        self.verified = None;
    }

    /// Whether a recorded pass applies to these exact settings.
    pub fn covers(&self, settings: &SmtpSettings) -> bool {
        self.verified == Some(settings.fingerprint())
    }
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// How many records were enqueued for this run.
    pub enqueued: usize,
    /// Campaign counts at the moment the pool finished draining.
    pub snapshot: StatusSnapshot,
}

/// Transient per-run FIFO of record snapshots, consumed exactly once per
/// item. Fully built before the workers spawn, so an empty pop means the
/// run is drained.
struct WorkQueue {
    jobs: Mutex<VecDeque<Record>>,
}

impl WorkQueue {
    fn new(jobs: Vec<Record>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into()),
        }
    }

    fn pop(&self) -> Option<Record> {
        self.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Record>> {
        self.jobs.lock().expect("work queue lock poisoned")
    }
}

/// Everything a worker task needs, shared across the pool.
struct WorkerContext {
    config: RunConfig,
    campaign: Campaign,
    transport: Arc<dyn Transport>,
    queue: WorkQueue,
    cancel: CancellationToken,
}

/// The delivery engine for one campaign.
///
/// The run configuration and transport settings are captured by value at
/// construction; editing configuration inputs afterwards cannot affect
/// this engine. Clone the campaign handle (via [`DeliveryEngine::campaign`])
/// to poll progress concurrently with a run.
pub struct DeliveryEngine {
    config: RunConfig,
    smtp: SmtpSettings,
    transport: Arc<dyn Transport>,
    campaign: Campaign,
    running: AtomicBool,
    clearance: Mutex<SendClearance>,
}

impl DeliveryEngine {
    pub fn new(
        config: RunConfig,
        smtp: SmtpSettings,
        transport: Arc<dyn Transport>,
        campaign: Campaign,
    ) -> Self {
        Self {
            config,
            smtp,
            transport,
            campaign,
            running: AtomicBool::new(false),
            clearance: Mutex::new(SendClearance::new()),
        }
    }

    /// Cloneable handle to the campaign state, for progress readers.
    pub fn campaign(&self) -> Campaign {
        self.campaign.clone()
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Non-blocking per-status counts for the presentation side.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.campaign.snapshot()
    }

    /// Render the subject and body for a single record without sending.
    pub fn preview(&self, id: RecordId) -> Option<RenderedMail> {
        let record = self.campaign.record(id)?;
        Some(template::render(
            &self.config.body_template,
            &self.config.subject_template,
            &record,
            &self.config.mapping,
            &self.config.recipient_column,
        ))
    }

    /// One-shot connectivity pre-check: open a session and authenticate.
    ///
    /// Success grants the clearance gating [`DeliveryEngine::run`]; any
    /// failure revokes it and returns the classified reason (auth versus
    /// connection).
    pub async fn precheck(&self) -> Result<(), TransportError> {
        info!(host = %self.smtp.host, port = self.smtp.port, "Running connectivity pre-check");
        let result = self.transport.check().await;

        let mut clearance = self.lock_clearance();
        match &result {
            Ok(()) => {
                clearance.grant(&self.smtp);
                info!("Connectivity pre-check passed");
            }
            Err(e) => {
                clearance.revoke();
                warn!(error = %e, "Connectivity pre-check failed");
            }
        }
        result
    }

    /// Run the campaign to completion.
    ///
    /// Enqueues every record that is not already `Sent`, spawns the worker
    /// pool, and returns once the queue is drained and every worker has
    /// exited. Rejected start commands leave all state untouched.
    ///
    /// Cancellation is cooperative: workers check the token between items,
    /// never mid-attempt, so cancelling may leave unprocessed records in
    /// `Queued`.
    ///
    /// # Errors
    /// Returns [`StartError`] when a precondition fails: empty campaign,
    /// empty body template, no recipient column, missing pre-check pass,
    /// or a run already in progress.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, StartError> {
        if self.campaign.is_empty() {
            return Err(StartError::NoRecords);
        }
        if self.config.body_template.trim().is_empty() {
            return Err(StartError::EmptyTemplate);
        }
        if self.config.recipient_column.trim().is_empty() {
            return Err(StartError::NoRecipientColumn);
        }
        if !self.lock_clearance().covers(&self.smtp) {
            return Err(StartError::NotVerified);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StartError::AlreadyRunning);
        }

        let summary = self.drain(cancel).await;
        self.running.store(false, Ordering::Release);
        Ok(summary)
    }

    async fn drain(&self, cancel: CancellationToken) -> RunSummary {
        let jobs = self.campaign.queue_unsent();
        let enqueued = jobs.len();

        if enqueued == 0 {
            info!("No pending records to send");
            return RunSummary {
                enqueued,
                snapshot: self.campaign.snapshot(),
            };
        }

        info!(
            records = enqueued,
            workers = self.config.workers,
            retries = self.config.retries,
            "Starting delivery run"
        );
        metrics::gauge!("mailblast_queue_size").set(enqueued as f64);

        let ctx = Arc::new(WorkerContext {
            config: self.config.clone(),
            campaign: self.campaign.clone(),
            transport: Arc::clone(&self.transport),
            queue: WorkQueue::new(jobs),
            cancel,
        });

        let mut workers: JoinSet<()> = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let ctx = Arc::clone(&ctx);
            workers.spawn(worker_loop(ctx, worker_id));
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                // Item-level panics are caught inside the worker; reaching
                // here means the loop itself died, which we only log.
                error!(error = %e, "Delivery worker task failed");
            }
        }

        metrics::gauge!("mailblast_queue_size").set(0.0);
        let snapshot = self.campaign.snapshot();
        info!(%snapshot, "Delivery run finished");

        RunSummary { enqueued, snapshot }
    }

    fn lock_clearance(&self) -> std::sync::MutexGuard<'_, SendClearance> {
        self.clearance.lock().expect("clearance lock poisoned")
    }
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("records", &self.campaign.len())
            .field("workers", &self.config.workers)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Worker loop: pull records until the queue is drained or cancellation is
/// requested, taking each record to exactly one terminal status.
async fn worker_loop(ctx: Arc<WorkerContext>, worker_id: usize) {
    debug!(worker_id, "Delivery worker started");

    loop {
        if ctx.cancel.is_cancelled() {
            debug!(worker_id, "Delivery worker stopping on cancellation");
            break;
        }
        let Some(record) = ctx.queue.pop() else {
            break;
        };
        metrics::gauge!("mailblast_queue_size").set(ctx.queue.len() as f64);

        let id = record.id();
        let status = match AssertUnwindSafe(process_record(&ctx, &record))
            .catch_unwind()
            .await
        {
            Ok(status) => status,
            Err(_) => {
                error!(record_id = id, "Caught panic while processing record");
                Status::Failed
            }
        };

        ctx.campaign.finish(id, status);
        match status {
            Status::Sent => metrics::counter!("mailblast_sent_total").increment(1),
            Status::Invalid => metrics::counter!("mailblast_invalid_total").increment(1),
            Status::AuthError => metrics::counter!("mailblast_auth_errors_total").increment(1),
            Status::Failed => metrics::counter!("mailblast_failed_total").increment(1),
            Status::Pending | Status::Queued => {}
        }
    }

    debug!(worker_id, "Delivery worker finished");
}

/// Process one record to a terminal status.
async fn process_record(ctx: &WorkerContext, record: &Record) -> Status {
    let config = &ctx.config;
    let recipient = record.field(&config.recipient_column).trim().to_string();

    if !is_valid_address(&recipient) {
        debug!(record_id = record.id(), "Recipient address failed validation");
        return Status::Invalid;
    }

    let mail = template::render(
        &config.body_template,
        &config.subject_template,
        record,
        &config.mapping,
        &config.recipient_column,
    );

    let message = match build_message(&config.from, &recipient, &mail) {
        Ok(message) => message,
        Err(e) => {
            warn!(record_id = record.id(), error = %e, "Could not build message");
            return Status::Failed;
        }
    };

    // `retries` is the total attempt budget; zero still gets one attempt.
    let attempts = config.retries.max(1);
    for attempt in 0..attempts {
        metrics::counter!("mailblast_attempts_total").increment(1);
        match ctx.transport.submit(message.clone()).await {
            Ok(()) => {
                debug!(record_id = record.id(), attempt, "Message delivered");
                return Status::Sent;
            }
            Err(TransportError::Auth(detail)) => {
                // Credentials are invariant across attempts, so retrying
                // an authentication rejection is pointless.
                warn!(record_id = record.id(), error = %detail, "Authentication rejected");
                return Status::AuthError;
            }
            Err(e) => {
                debug!(
                    record_id = record.id(),
                    attempt,
                    error = %e,
                    "Transport attempt failed"
                );
                if attempt + 1 < attempts {
                    let delay = backoff_delay(attempt, config.backoff_base, config.backoff_max);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    warn!(record_id = record.id(), attempts, "All attempts exhausted");
    Status::Failed
}

/// Assemble the outgoing message for one recipient.
fn build_message(
    from: &Mailbox,
    recipient: &str,
    mail: &RenderedMail,
) -> Result<Message, TransportError> {
    let to: Mailbox = recipient.parse().map_err(|e| {
        TransportError::BuildMessage(format!("invalid recipient mailbox '{}': {}", recipient, e))
    })?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(mail.body.clone())
        .map_err(|e| TransportError::BuildMessage(e.to_string()))
}
