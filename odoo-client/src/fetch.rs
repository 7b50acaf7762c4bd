//! # Batched Parallel Fetch
//!
//! Purpose: Read a large result set by splitting its ids into fixed-size
//! batches, fetching every batch concurrently, and merging typed records into
//! one stream.
//!
//! ## Design Principles
//! 1. **Fan-out / Fan-in**: one task per batch, all writing into a single
//!    bounded channel sized to the total id count, so no writer waits on the
//!    consumer.
//! 2. **Contained Failure**: a failing batch or record is logged and skipped;
//!    sibling batches keep going.
//! 3. **Close Once**: the coordinator owns the original sender and drops it
//!    only after joining every worker, so the stream ends exactly once and
//!    after the last write.
//! 4. **Cooperative Cancellation**: workers check a shared flag before their
//!    network call and before every send; a dropped consumer stops them too.
//!
//! ## Pipeline
//!
//! ```text
//! search(domain) -> cap(max_ids) -> partition(batch_size)
//!        |
//!        +--> worker 0: search_read(id in batch 0) -> map -> tx --+
//!        +--> worker 1: search_read(id in batch 1) -> map -> tx --+--> RecordStream
//!        +--> worker N: ...                                      -+
//!        |
//!   coordinator: join all workers -> drop tx -> FetchSummary
//! ```
//!
//! Records from one batch arrive in server order; batches interleave freely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use odoo_common::{field_names, map_record, ConfigError, ConfigIssue, Domain, OdooResult, Record};

use crate::client::OdooClient;

/// Ids per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum ids per batch. Must be positive.
    pub batch_size: usize,
    /// Keep only the first `max_ids` ids returned by the search.
    pub max_ids: Option<usize>,
    /// Field projection; defaults to the record schema.
    pub fields: Option<Vec<String>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            max_ids: None,
            fields: None,
        }
    }
}

impl FetchOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_ids(mut self, max_ids: usize) -> Self {
        self.max_ids = Some(max_ids);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError {
                issues: vec![ConfigIssue::Invalid {
                    field: "batch_size",
                    reason: "must be greater than zero".to_string(),
                }],
            });
        }
        Ok(())
    }
}

/// Splits `ids` into consecutive batches of at most `batch_size` ids.
///
/// Order is preserved and no batch is empty; empty input yields no batches.
/// A zero `batch_size` is treated as one.
pub fn partition(ids: &[i64], batch_size: usize) -> Vec<Vec<i64>> {
    ids.chunks(batch_size.max(1)).map(<[i64]>::to_vec).collect()
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every worker to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Totals reported by the coordinator once every worker has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Ids left after the cap.
    pub ids_total: usize,
    pub batches_total: usize,
    /// Batches whose read failed or whose worker panicked.
    pub batches_failed: usize,
    /// Batches stopped by cancellation or a dropped consumer.
    pub batches_skipped: usize,
    pub records_sent: usize,
    /// Records dropped because they could not be mapped.
    pub mapping_failures: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchStatus {
    Completed,
    Failed,
    Cancelled,
    ConsumerGone,
}

#[derive(Debug)]
struct BatchReport {
    status: BatchStatus,
    records_sent: usize,
    mapping_failures: usize,
}

impl BatchReport {
    fn new(status: BatchStatus) -> Self {
        BatchReport {
            status,
            records_sent: 0,
            mapping_failures: 0,
        }
    }
}

/// Typed records in arrival order, plus the coordinator's summary.
#[derive(Debug)]
pub struct RecordStream<R> {
    receiver: mpsc::Receiver<R>,
    coordinator: JoinHandle<FetchSummary>,
}

impl<R: Send + 'static> RecordStream<R> {
    /// Next record, or `None` once every worker is done.
    pub async fn next(&mut self) -> Option<R> {
        self.receiver.recv().await
    }

    /// Stops reading and waits for the summary.
    ///
    /// Records not yet received are discarded; workers still running stop at
    /// their next send.
    pub async fn finish(self) -> FetchSummary {
        let RecordStream {
            receiver,
            coordinator,
        } = self;
        drop(receiver);
        match coordinator.await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, "fetch coordinator did not complete");
                FetchSummary::default()
            }
        }
    }

    /// Drains the stream until it closes, then returns records and summary.
    pub async fn collect(mut self) -> (Vec<R>, FetchSummary) {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record);
        }
        let summary = self.finish().await;
        (records, summary)
    }
}

/// Starts the pipeline for record type `R`.
///
/// Runs the search up front, so search errors (including `AccessDenied`)
/// are returned here. Batch errors only show up in the summary and logs.
///
/// Must be called from within a tokio runtime.
pub async fn fetch_records<R: Record>(
    client: Arc<OdooClient>,
    domain: &Domain,
    options: &FetchOptions,
    cancel: CancelToken,
) -> OdooResult<RecordStream<R>> {
    options.validate()?;

    let mut ids = client.search(R::MODEL, domain).await?;
    if let Some(max_ids) = options.max_ids {
        ids.truncate(max_ids);
    }
    let batches = partition(&ids, options.batch_size);
    let fields: Arc<[String]> = options
        .fields
        .clone()
        .unwrap_or_else(field_names::<R>)
        .into();

    info!(
        model = R::MODEL,
        ids = ids.len(),
        batches = batches.len(),
        batch_size = options.batch_size,
        "fetch started"
    );

    let (sender, receiver) = mpsc::channel(ids.len().max(1));
    let mut summary = FetchSummary {
        ids_total: ids.len(),
        batches_total: batches.len(),
        ..FetchSummary::default()
    };

    let workers: Vec<JoinHandle<BatchReport>> = batches
        .into_iter()
        .enumerate()
        .map(|(index, batch)| {
            tokio::spawn(run_batch::<R>(
                Arc::clone(&client),
                index,
                batch,
                Arc::clone(&fields),
                sender.clone(),
                cancel.clone(),
            ))
        })
        .collect();

    let coordinator = tokio::spawn(async move {
        for (index, worker) in workers.into_iter().enumerate() {
            match worker.await {
                Ok(report) => {
                    summary.records_sent += report.records_sent;
                    summary.mapping_failures += report.mapping_failures;
                    match report.status {
                        BatchStatus::Completed => {}
                        BatchStatus::Failed => summary.batches_failed += 1,
                        BatchStatus::Cancelled | BatchStatus::ConsumerGone => {
                            summary.batches_skipped += 1
                        }
                    }
                }
                Err(err) => {
                    error!(batch = index, error = %err, "fetch worker panicked");
                    summary.batches_failed += 1;
                }
            }
        }
        // Last sender: the stream closes here, after every worker has returned.
        drop(sender);
        summary.cancelled = cancel.is_cancelled();
        info!(
            model = R::MODEL,
            records = summary.records_sent,
            failed = summary.batches_failed,
            skipped = summary.batches_skipped,
            "fetch finished"
        );
        summary
    });

    Ok(RecordStream {
        receiver,
        coordinator,
    })
}

async fn run_batch<R: Record>(
    client: Arc<OdooClient>,
    index: usize,
    ids: Vec<i64>,
    fields: Arc<[String]>,
    sender: mpsc::Sender<R>,
    cancel: CancelToken,
) -> BatchReport {
    if cancel.is_cancelled() {
        return BatchReport::new(BatchStatus::Cancelled);
    }
    if sender.is_closed() {
        return BatchReport::new(BatchStatus::ConsumerGone);
    }

    let rows = match client
        .search_read(R::MODEL, &Domain::ids_in(&ids), &fields)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            warn!(batch = index, ids = ids.len(), error = %err, "batch read failed, skipping");
            return BatchReport::new(BatchStatus::Failed);
        }
    };
    debug!(batch = index, rows = rows.len(), "batch read");

    let mut report = BatchReport::new(BatchStatus::Completed);
    for row in &rows {
        let record = match map_record::<R>(row) {
            Ok(record) => record,
            Err(err) => {
                warn!(batch = index, error = %err, "record mapping failed, skipping");
                report.mapping_failures += 1;
                continue;
            }
        };
        if cancel.is_cancelled() {
            report.status = BatchStatus::Cancelled;
            break;
        }
        if sender.send(record).await.is_err() {
            debug!(batch = index, "consumer dropped, stopping");
            report.status = BatchStatus::ConsumerGone;
            break;
        }
        report.records_sent += 1;
    }
    report
}
