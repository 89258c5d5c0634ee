//! Fan-out of one notification to every active subscription.

use super::transport::{PushTransport, TransportOutcome};
use crate::config::Credentials;
use crate::error::{NotifyError, Result};
use crate::interrupt::Interruptee;
use crate::payload::Notification;
use crate::store::{SubscriptionIter, SubscriptionStore};
use crate::types::SubscriptionRecord;
use crossbeam_channel::{bounded, unbounded};
use std::path::PathBuf;

/// Upper bound on concurrent deliveries in one run.
pub const MAX_WORKERS: usize = 64;

/// What happened to one record during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Accepted by the push service. The record stays active.
    Delivered { status: u16 },
    /// The push service no longer knows the subscription; it was moved to quarantine.
    Quarantined { status: u16, reason: String },
    /// Rejected, but moving it to quarantine failed. It stays active and
    /// will be retried next run.
    QuarantineFailed {
        status: u16,
        reason: String,
        error: String,
    },
    /// Not delivered this time. The record stays active.
    Transient { status: Option<u16>, reason: String },
    /// The record file could not be read back. Nothing was sent.
    Integrity { reason: String },
}

/// Per-record entry of a [`DispatchReport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordReport {
    /// Client key, when the record could be read.
    pub key: Option<String>,
    /// Record file the outcome applies to.
    pub path: PathBuf,
    pub outcome: RecordOutcome,
}

/// Result of one dispatch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// One entry per record that was processed, in completion order.
    pub records: Vec<RecordReport>,
    /// Records left untouched because the run was interrupted.
    pub skipped: usize,
    /// Whether the run stopped early.
    pub interrupted: bool,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Delivered { .. }))
    }

    pub fn quarantined(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Quarantined { .. }))
    }

    /// Transient failures, including rejected records that could not be quarantined.
    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                RecordOutcome::Transient { .. } | RecordOutcome::QuarantineFailed { .. }
            )
        })
    }

    pub fn integrity_errors(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Integrity { .. }))
    }

    /// Number of records `send` was invoked for.
    pub fn attempted(&self) -> usize {
        self.records.len() - self.integrity_errors()
    }

    /// Find the entry for a client key.
    pub fn outcome_for(&self, key: &str) -> Option<&RecordOutcome> {
        self.records
            .iter()
            .find(|r| r.key.as_deref() == Some(key))
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

enum WorkerResult {
    Done(RecordReport),
    Skipped,
}

/// Sends a notification to every active record and reconciles the outcomes
/// back into the store.
///
/// A run never stops because of a single record. Each record is sent at most
/// once per run and nothing is retried; the push service holds undelivered
/// messages for the configured TTL.
pub struct Dispatcher<'a, T> {
    store: &'a SubscriptionStore,
    transport: T,
    credentials: &'a Credentials,
    workers: usize,
}

impl<'a, T: PushTransport> Dispatcher<'a, T> {
    pub fn new(store: &'a SubscriptionStore, transport: T, credentials: &'a Credentials) -> Self {
        Self {
            store,
            transport,
            credentials,
            workers: 1,
        }
    }

    /// Deliver to up to `workers` records at once. 1 (the default) is
    /// sequential; anything above [`MAX_WORKERS`] is capped.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers > MAX_WORKERS {
            tracing::debug!(requested = workers, max = MAX_WORKERS, "capping worker count");
        }
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Run one dispatch pass.
    ///
    /// Only setup failures are returned as `Err`: invalid credentials or a
    /// registry directory that can't be enumerated. Everything that goes
    /// wrong for an individual record ends up in the report.
    pub fn run(
        &self,
        notification: &Notification,
        interruptee: &dyn Interruptee,
    ) -> Result<DispatchReport> {
        self.credentials.validate()?;

        let payload = notification.to_bytes();
        let records = self.store.list()?;

        let report = if self.workers > 1 {
            self.run_parallel(records, &payload, interruptee)
        } else {
            self.run_sequential(records, &payload, interruptee)
        };

        tracing::info!(
            delivered = report.delivered(),
            quarantined = report.quarantined(),
            failed = report.failed(),
            corrupt = report.integrity_errors(),
            skipped = report.skipped,
            "dispatch finished"
        );

        Ok(report)
    }

    fn run_sequential(
        &self,
        mut records: SubscriptionIter,
        payload: &[u8],
        interruptee: &dyn Interruptee,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Some(item) = records.next() {
            if interruptee.was_interrupted() {
                report.interrupted = true;
                report.skipped = 1 + records.count_remaining();
                break;
            }
            let entry = match item {
                Ok(record) => self.process(&record, payload),
                Err(e) => self.integrity_report(e),
            };
            report.records.push(entry);
        }

        report
    }

    fn run_parallel(
        &self,
        mut records: SubscriptionIter,
        payload: &[u8],
        interruptee: &dyn Interruptee,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        std::thread::scope(|scope| {
            let (job_tx, job_rx) = bounded::<SubscriptionRecord>(self.workers);
            let (result_tx, result_rx) = unbounded::<WorkerResult>();

            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for record in job_rx.iter() {
                        let result = if interruptee.was_interrupted() {
                            WorkerResult::Skipped
                        } else {
                            WorkerResult::Done(self.process(&record, payload))
                        };
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            while let Some(item) = records.next() {
                if interruptee.was_interrupted() {
                    report.interrupted = true;
                    report.skipped += 1 + records.count_remaining();
                    break;
                }
                match item {
                    Ok(record) => {
                        if job_tx.send(record).is_err() {
                            break;
                        }
                    }
                    Err(e) => report.records.push(self.integrity_report(e)),
                }
            }
            drop(job_tx);

            for result in result_rx.iter() {
                match result {
                    WorkerResult::Done(entry) => report.records.push(entry),
                    WorkerResult::Skipped => {
                        report.interrupted = true;
                        report.skipped += 1;
                    }
                }
            }
        });

        report
    }

    /// Send to one record and apply the outcome to the store.
    fn process(&self, record: &SubscriptionRecord, payload: &[u8]) -> RecordReport {
        let path = self.store.record_path(record);
        let outcome = self.transport.send(record, payload, self.credentials);

        let outcome = match outcome {
            TransportOutcome::Delivered { status } => {
                tracing::info!(path = %path.display(), status, "delivered");
                RecordOutcome::Delivered { status }
            }
            TransportOutcome::Rejected { status, reason } => match self.store.quarantine(record) {
                Ok(_) => {
                    tracing::warn!(
                        path = %path.display(),
                        to = %self.store.revoked_path().display(),
                        status,
                        %reason,
                        "subscription rejected, quarantined"
                    );
                    RecordOutcome::Quarantined { status, reason }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        status,
                        %reason,
                        error = %e,
                        "subscription rejected, quarantine failed"
                    );
                    RecordOutcome::QuarantineFailed {
                        status,
                        reason,
                        error: e.to_string(),
                    }
                }
            },
            TransportOutcome::Transient { status, reason } => {
                tracing::warn!(path = %path.display(), ?status, %reason, "delivery failed");
                RecordOutcome::Transient { status, reason }
            }
        };

        RecordReport {
            key: Some(record.key().to_string()),
            path,
            outcome,
        }
    }

    fn integrity_report(&self, error: NotifyError) -> RecordReport {
        let (path, reason) = match error {
            NotifyError::Integrity { path, reason } => (path, reason),
            other => (self.store.path().to_path_buf(), other.to_string()),
        };
        tracing::warn!(path = %path.display(), %reason, "skipping unreadable subscription");

        RecordReport {
            key: None,
            path,
            outcome: RecordOutcome::Integrity { reason },
        }
    }
}
