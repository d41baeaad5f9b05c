//! Freshening coordinator
//!
//! `FreshReader::get` drives the per-request state machine. Each requested
//! column with a matched attachment moves `NotEvaluated → Fresh` when the
//! policy accepts the stored value, otherwise `→ Pending` with a producer
//! task, and finally `Pending → {Recomputed, StaleFallback, Error}` under
//! one request-wide deadline. Unmatched columns pass through as stored.
//!
//! Producer tasks are deduplicated per (table, row, column): a request whose
//! stale cell already has an in-flight task joins that task's result instead
//! of starting a duplicate. Deadline expiry abandons the wait, not the task;
//! the detached task still writes its result back so later reads benefit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::time::{timeout_at, Instant};

use super::errors::FreshResult;
use super::result::{FreshRowResult, FreshnessDecision};
use crate::column::ColumnSelector;
use crate::freshener::{FreshenerCache, FreshenerContext};
use crate::observability::{FreshEvent, FreshMetrics, Logger, Severity};
use crate::plugin::Producer;
use crate::registry::PolicyRegistry;
use crate::store::{Cell, DataRequest, RowStore};

/// Tuning for the freshening read path.
#[derive(Debug, Clone)]
pub struct FreshReaderConfig {
    /// Shared deadline for all pending columns in one request.
    pub deadline: Duration,
    /// Maximum producer tasks executing concurrently.
    pub max_concurrent_producers: usize,
    /// Cap on distinct in-flight (table, row, column) tasks. At the cap,
    /// additional stale columns fall back to their stored value without
    /// scheduling.
    pub max_inflight_tasks: usize,
}

impl Default for FreshReaderConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(100),
            max_concurrent_producers: 8,
            max_inflight_tasks: 64,
        }
    }
}

/// Identity of one recomputation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TaskKey {
    table: String,
    row: String,
    column: ColumnSelector,
}

/// Broadcast outcome of one producer task.
#[derive(Debug, Clone)]
enum TaskOutcome {
    Completed { value: serde_json::Value, timestamp_ms: i64 },
    Failed(String),
}

type OutcomeRx = watch::Receiver<Option<TaskOutcome>>;
type OutcomeTx = watch::Sender<Option<TaskOutcome>>;

enum Schedule {
    Join(OutcomeRx),
    Spawn(OutcomeTx, OutcomeRx),
    Drop,
}

/// Freshening row reader.
pub struct FreshReader {
    registry: Arc<PolicyRegistry>,
    cache: Arc<FreshenerCache>,
    store: Arc<dyn RowStore>,
    config: FreshReaderConfig,
    pool: Arc<Semaphore>,
    inflight: Arc<Mutex<HashMap<TaskKey, OutcomeRx>>>,
    metrics: Arc<FreshMetrics>,
}

impl FreshReader {
    /// Create a reader and wire the instance cache to registry mutations.
    pub fn new(
        registry: Arc<PolicyRegistry>,
        cache: Arc<FreshenerCache>,
        store: Arc<dyn RowStore>,
        config: FreshReaderConfig,
    ) -> Self {
        registry.add_listener(cache.clone());
        let pool = Arc::new(Semaphore::new(config.max_concurrent_producers.max(1)));
        Self {
            registry,
            cache,
            store,
            config,
            pool,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(FreshMetrics::new()),
        }
    }

    /// Read-path metrics.
    pub fn metrics(&self) -> &FreshMetrics {
        &self.metrics
    }

    /// Read a row, freshening any requested column with a matched
    /// attachment. Always returns a value for every stored requested column,
    /// even under producer or store errors; those degrade to the stored
    /// value plus a diagnostic.
    pub async fn get(
        &self,
        table: &str,
        row_key: &str,
        request: DataRequest,
    ) -> FreshResult<FreshRowResult> {
        let attachments = self.registry.retrieve_policies(table)?;
        let stored = self
            .store
            .get(table, row_key, &request.columns, request.max_versions)?;
        let deadline = Instant::now() + self.config.deadline;

        // Family selectors expand to the qualified columns present in the
        // row; a family with an attachment but no stored cells has no
        // concrete column to freshen and passes through empty.
        let mut columns: Vec<ColumnSelector> = Vec::new();
        for selector in &request.columns {
            if selector.qualifier.is_some() {
                if !columns.contains(selector) {
                    columns.push(selector.clone());
                }
            } else {
                for column in stored.columns_in_family(&selector.family) {
                    if !columns.contains(&column) {
                        columns.push(column);
                    }
                }
            }
        }

        let mut result = FreshRowResult::new(row_key);
        let mut pending: Vec<(ColumnSelector, OutcomeRx)> = Vec::new();

        for column in columns {
            result.set_cells(column.clone(), stored.versions(&column).to_vec());

            // A qualified attachment wins over the family attachment.
            let matched = attachments
                .get_key_value(&column)
                .or_else(|| attachments.get_key_value(&column.family_selector()));
            let Some((attachment, record)) = matched else {
                continue;
            };

            let ctx = FreshenerContext {
                table: table.to_string(),
                column: column.clone(),
                attachment: attachment.clone(),
                client_request: request.clone(),
                parameters: record.parameters.clone(),
            };

            let freshener = match self.cache.get(table, attachment, record) {
                Ok(freshener) => freshener,
                Err(e) => {
                    self.metrics.increment_load_error();
                    result.set_decision(column.clone(), FreshnessDecision::Error);
                    result.add_diagnostic(column, e.to_string());
                    continue;
                }
            };

            if freshener.policy.is_fresh(&stored, &ctx) {
                self.metrics.increment_fresh();
                result.set_decision(column, FreshnessDecision::Fresh);
                continue;
            }

            let key = TaskKey {
                table: table.to_string(),
                row: row_key.to_string(),
                column: column.clone(),
            };
            match self.schedule(&key) {
                Schedule::Join(rx) => {
                    self.metrics.increment_dedup_join();
                    Logger::log(
                        Severity::Trace,
                        FreshEvent::DedupJoined,
                        &[("column", &column.to_string()), ("row", row_key)],
                    );
                    pending.push((column, rx));
                }
                Schedule::Spawn(tx, rx) => {
                    Logger::log(
                        Severity::Trace,
                        FreshEvent::ProducerStarted,
                        &[("column", &column.to_string()), ("row", row_key)],
                    );
                    self.spawn_producer(key, tx, freshener.producer.clone(), ctx, request.max_versions);
                    pending.push((column, rx));
                }
                Schedule::Drop => {
                    self.metrics.increment_task_dropped();
                    Logger::log_stderr(
                        Severity::Warn,
                        FreshEvent::TaskDropped,
                        &[("column", &column.to_string()), ("row", row_key)],
                    );
                    result.set_decision(column, FreshnessDecision::StaleFallback);
                }
            }
        }

        // Wait for every pending column under the shared absolute deadline.
        for (column, mut rx) in pending {
            match timeout_at(deadline, rx.wait_for(|outcome| outcome.is_some())).await {
                Ok(Ok(guard)) => match (*guard).clone() {
                    Some(TaskOutcome::Completed { value, timestamp_ms }) => {
                        self.metrics.increment_recomputed();
                        result.prepend_cell(column.clone(), Cell::new(timestamp_ms, value));
                        result.set_decision(column, FreshnessDecision::Recomputed);
                    }
                    Some(TaskOutcome::Failed(message)) => {
                        result.set_decision(column.clone(), FreshnessDecision::Error);
                        result.add_diagnostic(column, message);
                    }
                    None => {
                        result.set_decision(column.clone(), FreshnessDecision::Error);
                        result.add_diagnostic(column, "producer task yielded no outcome");
                    }
                },
                Ok(Err(_)) => {
                    // Sender dropped without publishing: the task aborted.
                    result.set_decision(column.clone(), FreshnessDecision::Error);
                    result.add_diagnostic(column, "producer task aborted");
                }
                Err(_elapsed) => {
                    self.metrics.increment_stale_fallback();
                    Logger::log(
                        Severity::Info,
                        FreshEvent::DeadlineExpired,
                        &[("column", &column.to_string()), ("row", row_key)],
                    );
                    result.set_decision(column, FreshnessDecision::StaleFallback);
                }
            }
        }

        Ok(result)
    }

    /// Decide how a stale column gets its outcome: join an in-flight task,
    /// spawn a new one, or drop at the in-flight cap.
    fn schedule(&self, key: &TaskKey) -> Schedule {
        let Ok(mut inflight) = self.inflight.lock() else {
            return Schedule::Drop;
        };
        if let Some(rx) = inflight.get(key) {
            return Schedule::Join(rx.clone());
        }
        if inflight.len() >= self.config.max_inflight_tasks {
            return Schedule::Drop;
        }
        let (tx, rx) = watch::channel(None);
        inflight.insert(key.clone(), rx.clone());
        Schedule::Spawn(tx, rx)
    }

    /// Spawn a detached producer task. The task outlives the request that
    /// scheduled it: deadline expiry cancels waiting, not execution, and the
    /// eventual write-back still happens.
    fn spawn_producer(
        &self,
        key: TaskKey,
        tx: OutcomeTx,
        producer: Arc<dyn Producer>,
        ctx: FreshenerContext,
        max_versions: usize,
    ) {
        let store = self.store.clone();
        let pool = self.pool.clone();
        let inflight = self.inflight.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let outcome = match pool.acquire_owned().await {
                Ok(_permit) => {
                    // Producers and the row store are synchronous and may
                    // block; run them off the async workers so a slow
                    // producer never stalls request tasks awaiting the
                    // deadline.
                    let task_key = key.clone();
                    let task_metrics = metrics.clone();
                    let join = tokio::task::spawn_blocking(move || {
                        run_producer(
                            store.as_ref(),
                            producer.as_ref(),
                            &task_key,
                            &ctx,
                            max_versions,
                            &task_metrics,
                        )
                    })
                    .await;
                    match join {
                        Ok(outcome) => outcome,
                        Err(_) => TaskOutcome::Failed("producer task panicked".into()),
                    }
                }
                Err(_) => TaskOutcome::Failed("worker pool closed".into()),
            };
            // Publish before unregistering so joined waiters always observe
            // the outcome; the map itself holds a receiver until removal.
            let _ = tx.send(Some(outcome));
            if let Ok(mut map) = inflight.lock() {
                map.remove(&key);
            }
        });
    }
}

/// Execute one producer: read its required columns, produce, write back.
fn run_producer(
    store: &dyn RowStore,
    producer: &dyn Producer,
    key: &TaskKey,
    ctx: &FreshenerContext,
    max_versions: usize,
    metrics: &FreshMetrics,
) -> TaskOutcome {
    let fail = |message: String| {
        metrics.increment_producer_error();
        Logger::log_stderr(
            Severity::Error,
            FreshEvent::ProducerFailed,
            &[
                ("column", &key.column.to_string()),
                ("row", &key.row),
                ("error", &message),
            ],
        );
        TaskOutcome::Failed(message)
    };

    let required: Vec<ColumnSelector> = producer.required_columns().into_iter().collect();
    let row = match store.get(&key.table, &key.row, &required, max_versions) {
        Ok(row) => row,
        Err(e) => return fail(e.to_string()),
    };

    let value = match producer.produce(&row, ctx) {
        Ok(value) => value,
        Err(e) => return fail(e.to_string()),
    };

    let timestamp_ms = Utc::now().timestamp_millis();
    if let Err(e) = store.put(&key.table, &key.row, &key.column, timestamp_ms, value.clone()) {
        return fail(e.to_string());
    }
    metrics.increment_write_back();
    Logger::log(
        Severity::Info,
        FreshEvent::ProducerCompleted,
        &[("column", &key.column.to_string()), ("row", &key.row)],
    );
    TaskOutcome::Completed {
        value,
        timestamp_ms,
    }
}
