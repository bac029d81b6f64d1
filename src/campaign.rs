//! Campaign records and per-record delivery status.
//!
//! A [`Campaign`] is the single owner of the record set for one send job.
//! Records are append-only at load time; the only mutable facet is the
//! per-record [`Status`], and every status write funnels through one
//! synchronized path so workers and the progress reader never observe a
//! torn state.
//!
//! # Status lifecycle
//!
//! ```text
//! Pending ──> Queued ──> Sent | Invalid | AuthError | Failed
//! ```
//!
//! Within a run a terminal status is written at most once and never
//! regresses. A *new* run may requeue any record that is not `Sent`,
//! which is what makes re-running a partially failed campaign pick up
//! only the leftovers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Dense, zero-based record identity, stable for the campaign lifetime.
pub type RecordId = usize;

/// Delivery status of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Initial state after load.
    Pending,
    /// Enqueued for sending by an active run.
    Queued,
    /// Delivered to the transport successfully.
    Sent,
    /// Recipient address failed syntactic validation; never attempted.
    Invalid,
    /// The transport rejected our credentials.
    AuthError,
    /// All attempts exhausted, or an unclassified processing failure.
    Failed,
}

impl Status {
    /// Terminal statuses admit no further transition within a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Sent | Status::Invalid | Status::AuthError | Status::Failed
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Pending => "Pending",
            Status::Queued => "Queued",
            Status::Sent => "Sent",
            Status::Invalid => "Invalid Email",
            Status::AuthError => "Authentication Error",
            Status::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// One recipient's data row plus its identity.
///
/// Workers receive cloned `Record`s snapshotted into the work queue;
/// field data never changes after load.
#[derive(Debug, Clone)]
pub struct Record {
    id: RecordId,
    fields: HashMap<String, String>,
}

impl Record {
    pub(crate) fn new(id: RecordId, fields: HashMap<String, String>) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Value for a column, or the empty string when the column is absent.
    pub fn field(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Read-only counts for the presentation side, taken under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub total: usize,
    pub pending: usize,
    pub queued: usize,
    pub sent: usize,
    pub invalid: usize,
    pub auth_error: usize,
    pub failed: usize,
}

impl StatusSnapshot {
    /// Number of records that reached a terminal status.
    pub fn completed(&self) -> usize {
        self.sent + self.invalid + self.auth_error + self.failed
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} done (sent {}, failed {}, invalid {}, auth {}, queued {}, pending {})",
            self.completed(),
            self.total,
            self.sent,
            self.failed,
            self.invalid,
            self.auth_error,
            self.queued,
            self.pending
        )
    }
}

struct CampaignInner {
    columns: Vec<String>,
    records: Vec<Record>,
    statuses: Vec<Status>,
}

/// Shared, cloneable handle to one campaign's records and statuses.
///
/// Cloning the handle shares the underlying state. Critical sections are
/// short (index and counter updates only), so snapshot readers never block
/// workers for longer than a bounded moment.
#[derive(Clone)]
pub struct Campaign {
    inner: Arc<RwLock<CampaignInner>>,
}

impl Campaign {
    /// Build a campaign from a shared column set and one field map per row.
    ///
    /// Record ids are assigned densely from zero in row order and every
    /// record starts as [`Status::Pending`].
    pub fn new(columns: Vec<String>, rows: Vec<HashMap<String, String>>) -> Self {
        let records: Vec<Record> = rows
            .into_iter()
            .enumerate()
            .map(|(id, fields)| Record::new(id, fields))
            .collect();
        let statuses = vec![Status::Pending; records.len()];

        Self {
            inner: Arc::new(RwLock::new(CampaignInner {
                columns,
                records,
                statuses,
            })),
        }
    }

    /// Build a campaign restoring delivery state from a previous job.
    ///
    /// `sent` flags records that were already delivered; they start as
    /// `Sent` and a run will skip them. Everything else starts `Pending`.
    /// `sent` must be the same length as `rows`.
    pub fn with_sent_restored(
        columns: Vec<String>,
        rows: Vec<HashMap<String, String>>,
        sent: Vec<bool>,
    ) -> Self {
        debug_assert_eq!(rows.len(), sent.len());
        let campaign = Self::new(columns, rows);
        {
            let mut inner = campaign.write();
            for (idx, was_sent) in sent.into_iter().enumerate() {
                if was_sent && idx < inner.statuses.len() {
                    inner.statuses[idx] = Status::Sent;
                }
            }
        }
        campaign
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The column set shared by all records, in load order.
    pub fn columns(&self) -> Vec<String> {
        self.read().columns.clone()
    }

    /// Current status of a record, or `None` for an unknown id.
    pub fn status(&self, id: RecordId) -> Option<Status> {
        self.read().statuses.get(id).copied()
    }

    /// Snapshot copy of a record, or `None` for an unknown id.
    pub fn record(&self, id: RecordId) -> Option<Record> {
        self.read().records.get(id).cloned()
    }

    /// Per-status counts, taken atomically under one read lock.
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.read();
        let mut snap = StatusSnapshot {
            total: inner.records.len(),
            ..StatusSnapshot::default()
        };
        for status in &inner.statuses {
            match status {
                Status::Pending => snap.pending += 1,
                Status::Queued => snap.queued += 1,
                Status::Sent => snap.sent += 1,
                Status::Invalid => snap.invalid += 1,
                Status::AuthError => snap.auth_error += 1,
                Status::Failed => snap.failed += 1,
            }
        }
        snap
    }

    /// Move every record that is not `Sent` to `Queued` and return their
    /// snapshots in id order.
    ///
    /// This is the only path that may take a terminal status back to
    /// `Queued`, and it is reserved for the run orchestrator starting a
    /// fresh run.
    pub(crate) fn queue_unsent(&self) -> Vec<Record> {
        let mut inner = self.write();
        let mut jobs = Vec::new();
        for idx in 0..inner.records.len() {
            if inner.statuses[idx] != Status::Sent {
                inner.statuses[idx] = Status::Queued;
                jobs.push(inner.records[idx].clone());
            }
        }
        jobs
    }

    /// Record the terminal outcome for one queued record.
    ///
    /// Safe to call concurrently from multiple workers. Writes are applied
    /// only for a known id currently in `Queued` and only with a terminal
    /// status; anything else is silently ignored, so a stale id or a
    /// double write cannot corrupt state.
    pub(crate) fn finish(&self, id: RecordId, status: Status) {
        if !status.is_terminal() {
            return;
        }
        let mut inner = self.write();
        if let Some(slot) = inner.statuses.get_mut(id)
            && *slot == Status::Queued
        {
            *slot = status;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CampaignInner> {
        // A poisoned lock means a panic inside one of the short critical
        // sections above, which hold no invariant worth salvaging.
        self.inner.read().expect("campaign state lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CampaignInner> {
        self.inner.write().expect("campaign state lock poisoned")
    }
}

impl fmt::Debug for Campaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("Campaign")
            .field("total", &snap.total)
            .field("completed", &snap.completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample_campaign() -> Campaign {
        Campaign::new(
            vec!["email".to_string(), "name".to_string()],
            vec![
                row(&[("email", "a@example.com"), ("name", "Ada")]),
                row(&[("email", "b@example.com"), ("name", "Bob")]),
                row(&[("email", "c@example.com"), ("name", "Cyd")]),
            ],
        )
    }

    #[test]
    fn record_ids_are_dense_and_zero_based() {
        let campaign = sample_campaign();
        assert_eq!(campaign.len(), 3);
        for id in 0..3 {
            assert_eq!(campaign.record(id).unwrap().id(), id);
        }
        assert!(campaign.record(3).is_none());
    }

    #[test]
    fn records_start_pending() {
        let campaign = sample_campaign();
        let snap = campaign.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.pending, 3);
        assert_eq!(snap.completed(), 0);
    }

    #[test]
    fn missing_field_reads_as_empty() {
        let campaign = sample_campaign();
        let record = campaign.record(0).unwrap();
        assert_eq!(record.field("name"), "Ada");
        assert_eq!(record.field("no_such_column"), "");
    }

    #[test]
    fn queue_unsent_skips_sent_records() {
        let campaign = sample_campaign();

        let jobs = campaign.queue_unsent();
        assert_eq!(jobs.len(), 3);
        campaign.finish(0, Status::Sent);
        campaign.finish(1, Status::Failed);
        campaign.finish(2, Status::Invalid);

        // A fresh run requeues everything except the Sent record.
        let jobs = campaign.queue_unsent();
        let ids: Vec<RecordId> = jobs.iter().map(Record::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(campaign.status(0), Some(Status::Sent));
        assert_eq!(campaign.status(1), Some(Status::Queued));
        assert_eq!(campaign.status(2), Some(Status::Queued));
    }

    #[test]
    fn finish_requires_queued_state() {
        let campaign = sample_campaign();

        // Not queued yet: write is ignored.
        campaign.finish(0, Status::Sent);
        assert_eq!(campaign.status(0), Some(Status::Pending));

        campaign.queue_unsent();
        campaign.finish(0, Status::Sent);
        assert_eq!(campaign.status(0), Some(Status::Sent));

        // Terminal status never overwritten by a later write.
        campaign.finish(0, Status::Failed);
        assert_eq!(campaign.status(0), Some(Status::Sent));
    }

    #[test]
    fn finish_ignores_unknown_id_and_non_terminal_status() {
        let campaign = sample_campaign();
        campaign.queue_unsent();

        campaign.finish(99, Status::Sent);
        campaign.finish(0, Status::Pending);
        assert_eq!(campaign.status(0), Some(Status::Queued));
    }

    #[test]
    fn snapshot_counts_every_state() {
        let campaign = sample_campaign();
        campaign.queue_unsent();
        campaign.finish(0, Status::Sent);
        campaign.finish(1, Status::AuthError);

        let snap = campaign.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.auth_error, 1);
        assert_eq!(snap.queued, 1);
        assert_eq!(snap.completed(), 2);
    }

    #[test]
    fn status_terminality() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Queued.is_terminal());
        assert!(Status::Sent.is_terminal());
        assert!(Status::Invalid.is_terminal());
        assert!(Status::AuthError.is_terminal());
        assert!(Status::Failed.is_terminal());
    }

    #[test]
    fn status_display_labels() {
        assert_eq!(Status::Invalid.to_string(), "Invalid Email");
        assert_eq!(Status::AuthError.to_string(), "Authentication Error");
        assert_eq!(Status::Sent.to_string(), "Sent");
    }

    #[test]
    fn concurrent_finish_from_many_threads() {
        let campaign = Campaign::new(
            vec!["email".to_string()],
            (0..64)
                .map(|i| row(&[("email", format!("u{i}@example.com").as_str())]))
                .collect(),
        );
        campaign.queue_unsent();

        let handles: Vec<_> = (0..64)
            .map(|id| {
                let campaign = campaign.clone();
                std::thread::spawn(move || campaign.finish(id, Status::Sent))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = campaign.snapshot();
        assert_eq!(snap.sent, 64);
        assert_eq!(snap.queued, 0);
    }
}
