//! Migration orchestration: sequential table pairs, chunked transfer,
//! cumulative progress, and per-table fault isolation.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{MigrationJob, TableRef};
use crate::drivers;
use crate::error::Result;
use crate::event::{EventSink, MigrationEvent};
use crate::source::{resolve_columns, ReadRequest, SourceReader};
use crate::target::ChunkWriter;
use crate::transfer::load_chunk;

/// How the run as a whole ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All pairs were attempted.
    Completed,
    /// A connection handle could not be opened; nothing was attempted.
    Failed,
    /// The caller requested cancellation and the run stopped at a safe
    /// boundary.
    Cancelled,
}

/// How one table pair ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TableOutcome {
    Completed,
    /// The pair was passed over before any row moved.
    Skipped { reason: String },
    /// Transfer started but halted partway; rows already committed stay
    /// committed.
    Failed { reason: String },
}

/// Per-pair accounting carried in the final result.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub source: String,
    pub dest: String,
    /// Source row count at job start; zero when the pair was skipped before
    /// counting succeeded.
    pub source_rows: u64,
    pub inserted: u64,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Final accounting for one run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub status: RunStatus,
    /// Rows committed across all pairs.
    pub inserted_total: u64,
    /// Source rows across pairs that reached the transfer stage; skipped
    /// pairs are excluded.
    pub source_total: u64,
    pub tables: Vec<TableSummary>,
}

impl MigrationResult {
    #[must_use]
    pub fn failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Render the result as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drives one validated job from start to finish.
///
/// Pairs run strictly in order, one at a time. A failing pair never takes
/// the rest of the job down with it: the error is reported, the pair is
/// recorded, and the run moves on.
pub struct Orchestrator {
    job: MigrationJob,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn ChunkWriter>,
}

impl Orchestrator {
    /// Build an orchestrator with handles derived from the job's profiles.
    pub fn new(job: MigrationJob) -> Result<Self> {
        let source = drivers::source_handle(&job.source)?;
        let target = drivers::target_handle(&job.dest)?;
        Ok(Self {
            job,
            source,
            target,
        })
    }

    /// Build an orchestrator over caller-supplied handles.
    pub fn with_handles(
        job: MigrationJob,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn ChunkWriter>,
    ) -> Self {
        Self {
            job,
            source,
            target,
        }
    }

    /// Start the run on a background task.
    ///
    /// Returns the event stream, a cancellation flag, and the join handle
    /// yielding the final result. Sending `true` on the flag stops the run
    /// at the next pair or chunk boundary.
    pub fn spawn(
        self,
    ) -> (
        mpsc::Receiver<MigrationEvent>,
        watch::Sender<bool>,
        JoinHandle<MigrationResult>,
    ) {
        let (sink, events) = EventSink::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(sink, cancel_rx));
        (events, cancel_tx, handle)
    }

    /// Run the job to completion. Never returns an error: every failure is
    /// reported through the event stream and accounted for in the result,
    /// and a `Done` event is always the last emission.
    pub async fn run(self, events: EventSink, cancel: watch::Receiver<bool>) -> MigrationResult {
        let mut result = MigrationResult {
            status: RunStatus::Completed,
            inserted_total: 0,
            source_total: 0,
            tables: Vec::new(),
        };

        events
            .log(format!(
                "connecting: {} source, {} destination",
                self.job.source.dialect, self.job.dest.dialect
            ))
            .await;

        if let Err(e) = self.source.probe().await {
            events.log(format!("source connection failed: {}", e)).await;
            events.done(0, 0).await;
            result.status = RunStatus::Failed;
            return result;
        }
        if let Err(e) = self.target.probe().await {
            events
                .log(format!("destination connection failed: {}", e))
                .await;
            events.done(0, 0).await;
            result.status = RunStatus::Failed;
            return result;
        }

        for pair in &self.job.pairs {
            if *cancel.borrow() {
                events.log("migration cancelled").await;
                result.status = RunStatus::Cancelled;
                break;
            }

            let src = TableRef::new(&self.job.source_schema, &pair.source);
            let dest = TableRef::new(&self.job.dest_schema, pair.resolved_dest());
            events.log(format!("migrating {} -> {}", src, dest)).await;

            let count = match self
                .source
                .count_rows(&src, self.job.where_clause.as_deref())
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    let reason = format!("row count failed: {}", e);
                    events.log(format!("skipping {}: {}", src, reason)).await;
                    result.tables.push(TableSummary {
                        source: src.to_string(),
                        dest: dest.to_string(),
                        source_rows: 0,
                        inserted: 0,
                        outcome: TableOutcome::Skipped { reason },
                    });
                    continue;
                }
            };

            let columns = match resolve_columns(self.source.as_ref(), &src).await {
                Ok(columns) => columns,
                Err(e) => {
                    events.log(format!("skipping {}: {}", src, e)).await;
                    result.tables.push(TableSummary {
                        source: src.to_string(),
                        dest: dest.to_string(),
                        source_rows: 0,
                        inserted: 0,
                        outcome: TableOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            // The pair is now committed to the transfer stage; only from
            // here does it count toward the job totals.
            result.source_total += count;
            events
                .log(format!("{}: {} rows, {} columns", src, count, columns.len()))
                .await;

            let mut table_inserted: u64 = 0;
            let mut halted: Option<String> = None;
            let mut rx = self.source.read_table(ReadRequest {
                table: src.clone(),
                columns: columns.clone(),
                where_clause: self.job.where_clause.clone(),
                chunk_size: self.job.chunk_size,
            });

            while let Some(next) = rx.recv().await {
                if *cancel.borrow() {
                    result.status = RunStatus::Cancelled;
                    halted = Some("cancelled".to_string());
                    break;
                }

                let batch = match next {
                    Ok(batch) => batch,
                    Err(e) => {
                        halted = Some(e.to_string());
                        break;
                    }
                };

                for err in &batch.decode_errors {
                    events.error(err.index, err.message.clone()).await;
                }

                match load_chunk(self.target.as_ref(), &dest, &columns, &batch.rows).await {
                    Ok(outcome) => {
                        if outcome.fell_back {
                            events
                                .log(format!(
                                    "chunk insert into {} failed, retrying row by row",
                                    dest
                                ))
                                .await;
                        }
                        for err in &outcome.errors {
                            events.error(err.index, err.message.clone()).await;
                        }
                        table_inserted += outcome.inserted;
                        result.inserted_total += outcome.inserted;
                    }
                    Err(e) => {
                        halted = Some(e.to_string());
                        break;
                    }
                }

                events
                    .progress(result.inserted_total, result.source_total)
                    .await;
            }
            // Dropping the receiver tells the extraction task to stop.
            drop(rx);

            let outcome = match halted {
                Some(reason) => {
                    events.log(format!("{} halted: {}", src, reason)).await;
                    TableOutcome::Failed { reason }
                }
                None => {
                    events
                        .log(format!("{} complete: {} rows inserted", src, table_inserted))
                        .await;
                    TableOutcome::Completed
                }
            };
            result.tables.push(TableSummary {
                source: src.to_string(),
                dest: dest.to_string(),
                source_rows: count,
                inserted: table_inserted,
                outcome,
            });

            if result.status == RunStatus::Cancelled {
                events.log("migration cancelled").await;
                break;
            }
        }

        events
            .done(result.inserted_total, result.source_total)
            .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionProfile, Dialect, TablePair};
    use crate::error::ShuttleError;
    use crate::value::{RowBatch, RowError, SourceRow, SqlValue};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Item {
        Row(SourceRow),
        Bad(RowError),
    }

    #[derive(Default, Clone)]
    struct FakeTable {
        count: u64,
        columns: Vec<String>,
        items: Vec<Item>,
    }

    #[derive(Default)]
    struct FakeSource {
        tables: HashMap<String, FakeTable>,
        probe_ok: bool,
        /// Inject a stream failure after this many items.
        stream_error_after: Option<usize>,
    }

    #[async_trait]
    impl SourceReader for FakeSource {
        async fn probe(&self) -> crate::error::Result<()> {
            if self.probe_ok {
                Ok(())
            } else {
                Err(ShuttleError::connectivity("source unreachable"))
            }
        }

        async fn count_rows(
            &self,
            table: &TableRef,
            _where_clause: Option<&str>,
        ) -> crate::error::Result<u64> {
            Ok(self.tables.get(&table.name).map(|t| t.count).unwrap_or(0))
        }

        async fn catalog_columns(&self, table: &TableRef) -> crate::error::Result<Vec<String>> {
            Ok(self
                .tables
                .get(&table.name)
                .map(|t| t.columns.clone())
                .unwrap_or_default())
        }

        async fn probe_columns(&self, _table: &TableRef) -> crate::error::Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<crate::error::Result<RowBatch>> {
            let (tx, rx) = mpsc::channel(4);
            let items = self
                .tables
                .get(&request.table.name)
                .map(|t| t.items.clone())
                .unwrap_or_default();
            let err_after = self.stream_error_after;

            tokio::spawn(async move {
                let mut batch = RowBatch::default();
                for (i, item) in items.into_iter().enumerate() {
                    if Some(i) == err_after {
                        if !batch.is_empty() {
                            let _ = tx.send(Ok(std::mem::take(&mut batch))).await;
                        }
                        let _ = tx
                            .send(Err(ShuttleError::connectivity("stream dropped")))
                            .await;
                        return;
                    }
                    match item {
                        Item::Row(row) => batch.rows.push(row),
                        Item::Bad(err) => batch.decode_errors.push(err),
                    }
                    if batch.scanned() >= request.chunk_size
                        && tx.send(Ok(std::mem::take(&mut batch))).await.is_err()
                    {
                        return;
                    }
                }
                if !batch.is_empty() {
                    let _ = tx.send(Ok(batch)).await;
                }
            });

            rx
        }
    }

    #[derive(Default)]
    struct FakeTarget {
        probe_ok: bool,
        /// Scan indices whose individual insert fails, as a unique
        /// constraint would.
        poisoned: HashSet<u64>,
        written: Mutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl ChunkWriter for FakeTarget {
        async fn probe(&self) -> crate::error::Result<()> {
            if self.probe_ok {
                Ok(())
            } else {
                Err(ShuttleError::connectivity("destination unreachable"))
            }
        }

        async fn write_chunk(
            &self,
            table: &TableRef,
            _columns: &[String],
            rows: &[SourceRow],
        ) -> crate::error::Result<u64> {
            if rows.iter().any(|r| self.poisoned.contains(&r.index)) {
                return Err(ShuttleError::Load {
                    row_index: 0,
                    message: "unique constraint violated".into(),
                });
            }
            let mut written = self.written.lock().unwrap();
            for row in rows {
                written.push((table.to_string(), row.index));
            }
            Ok(rows.len() as u64)
        }

        async fn write_row(
            &self,
            table: &TableRef,
            _columns: &[String],
            row: &SourceRow,
        ) -> crate::error::Result<()> {
            if self.poisoned.contains(&row.index) {
                return Err(ShuttleError::Load {
                    row_index: row.index,
                    message: "unique constraint violated".into(),
                });
            }
            self.written
                .lock()
                .unwrap()
                .push((table.to_string(), row.index));
            Ok(())
        }
    }

    fn profile(dialect: Dialect) -> ConnectionProfile {
        ConnectionProfile {
            dialect,
            host: "localhost".into(),
            port: None,
            service_or_db: "db".into(),
            user: "u".into(),
            password: "p".into(),
            protocol: "TCP".into(),
        }
    }

    fn job(pairs: Vec<TablePair>, chunk_size: usize) -> MigrationJob {
        MigrationJob {
            source: profile(Dialect::Oracle),
            dest: profile(Dialect::Postgres),
            source_schema: "app".into(),
            dest_schema: "pub".into(),
            pairs,
            where_clause: None,
            chunk_size,
        }
    }

    fn pair(source: &str) -> TablePair {
        TablePair {
            source: source.into(),
            dest: String::new(),
        }
    }

    fn numbered_rows(indices: &[u64]) -> Vec<Item> {
        indices
            .iter()
            .map(|&index| {
                Item::Row(SourceRow {
                    index,
                    values: vec![SqlValue::I64(index as i64)],
                })
            })
            .collect()
    }

    fn orders(items: Vec<Item>, count: u64) -> FakeTable {
        FakeTable {
            count,
            columns: vec!["id".into()],
            items,
        }
    }

    async fn run_job(
        job: MigrationJob,
        source: FakeSource,
        target: FakeTarget,
        cancelled: bool,
    ) -> (MigrationResult, Vec<MigrationEvent>) {
        let orch = Orchestrator::with_handles(job, Arc::new(source), Arc::new(target));
        let (sink, mut rx) = EventSink::channel();
        let (cancel_tx, cancel_rx) = watch::channel(cancelled);
        let result = orch.run(sink, cancel_rx).await;
        drop(cancel_tx);

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (result, events)
    }

    fn progress_events(events: &[MigrationEvent]) -> Vec<(u64, u64)> {
        events
            .iter()
            .filter_map(|ev| match ev {
                MigrationEvent::Progress {
                    inserted_total,
                    source_total,
                } => Some((*inserted_total, *source_total)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_happy_path_cumulative_progress() {
        let source = FakeSource {
            tables: HashMap::from([(
                "ORDERS".to_string(),
                orders(numbered_rows(&[1, 2, 3, 4, 5]), 5),
            )]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            ..FakeTarget::default()
        };

        let (result, events) =
            run_job(job(vec![pair("ORDERS")], 2), source, target, false).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.inserted_total, 5);
        assert_eq!(result.source_total, 5);
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].outcome, TableOutcome::Completed);

        assert_eq!(progress_events(&events), vec![(2, 5), (4, 5), (5, 5)]);
        assert!(matches!(
            events.last(),
            Some(MigrationEvent::Done {
                inserted_total: 5,
                source_total: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_poisoned_row_costs_only_itself() {
        let source = FakeSource {
            tables: HashMap::from([(
                "ORDERS".to_string(),
                orders(numbered_rows(&[1, 2, 3]), 3),
            )]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            poisoned: HashSet::from([2]),
            ..FakeTarget::default()
        };

        let (result, events) =
            run_job(job(vec![pair("ORDERS")], 100), source, target, false).await;

        assert_eq!(result.inserted_total, 2);
        assert_eq!(result.source_total, 3);
        assert_eq!(result.tables[0].outcome, TableOutcome::Completed);

        let errors: Vec<u64> = events
            .iter()
            .filter_map(|ev| match ev {
                MigrationEvent::Error { row_index, .. } => Some(*row_index),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![2]);

        // Row errors surface before the chunk's progress event.
        let error_pos = events
            .iter()
            .position(|ev| matches!(ev, MigrationEvent::Error { .. }))
            .unwrap();
        let progress_pos = events
            .iter()
            .position(|ev| matches!(ev, MigrationEvent::Progress { .. }))
            .unwrap();
        assert!(error_pos < progress_pos);
    }

    #[tokio::test]
    async fn test_unresolvable_columns_skip_the_pair() {
        let source = FakeSource {
            tables: HashMap::from([
                (
                    "EMPTY_META".to_string(),
                    FakeTable {
                        count: 9,
                        columns: Vec::new(),
                        items: Vec::new(),
                    },
                ),
                ("ORDERS".to_string(), orders(numbered_rows(&[1, 2]), 2)),
            ]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            ..FakeTarget::default()
        };

        let (result, events) = run_job(
            job(vec![pair("EMPTY_META"), pair("ORDERS")], 10),
            source,
            target,
            false,
        )
        .await;

        assert_eq!(result.status, RunStatus::Completed);
        assert!(matches!(
            result.tables[0].outcome,
            TableOutcome::Skipped { .. }
        ));
        assert_eq!(result.tables[1].outcome, TableOutcome::Completed);
        // Skipped rows never enter the totals, even though counting
        // succeeded.
        assert_eq!(result.source_total, 2);
        assert_eq!(result.inserted_total, 2);
        assert!(matches!(
            events.last(),
            Some(MigrationEvent::Done {
                inserted_total: 2,
                source_total: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_probe_failure_fails_the_run() {
        let source = FakeSource {
            probe_ok: true,
            ..FakeSource::default()
        };
        let target = FakeTarget {
            probe_ok: false,
            ..FakeTarget::default()
        };

        let (result, events) =
            run_job(job(vec![pair("ORDERS")], 10), source, target, false).await;

        assert!(result.failed());
        assert!(result.tables.is_empty());
        assert!(matches!(
            events.last(),
            Some(MigrationEvent::Done {
                inserted_total: 0,
                source_total: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_decode_errors_are_reported_with_scan_indices() {
        let mut items = numbered_rows(&[1, 3]);
        items.insert(
            1,
            Item::Bad(RowError {
                index: 2,
                message: "unmappable value".into(),
            }),
        );
        let source = FakeSource {
            tables: HashMap::from([("ORDERS".to_string(), orders(items, 3))]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            ..FakeTarget::default()
        };

        let (result, events) =
            run_job(job(vec![pair("ORDERS")], 10), source, target, false).await;

        assert_eq!(result.inserted_total, 2);
        assert_eq!(result.source_total, 3);
        assert!(events.iter().any(|ev| matches!(
            ev,
            MigrationEvent::Error { row_index: 2, .. }
        )));
    }

    #[tokio::test]
    async fn test_stream_failure_halts_the_pair_not_the_run() {
        let source = FakeSource {
            tables: HashMap::from([
                ("FLAKY".to_string(), orders(numbered_rows(&[1, 2, 3]), 3)),
                ("ORDERS".to_string(), orders(numbered_rows(&[1]), 1)),
            ]),
            probe_ok: true,
            stream_error_after: Some(2),
        };
        let target = FakeTarget {
            probe_ok: true,
            ..FakeTarget::default()
        };

        let (result, _events) = run_job(
            job(vec![pair("FLAKY"), pair("ORDERS")], 10),
            source,
            target,
            false,
        )
        .await;

        assert_eq!(result.status, RunStatus::Completed);
        assert!(matches!(
            result.tables[0].outcome,
            TableOutcome::Failed { .. }
        ));
        // Rows committed before the failure stay committed.
        assert_eq!(result.tables[0].inserted, 2);
    }

    #[tokio::test]
    async fn test_destination_name_defaults_to_source() {
        let source = FakeSource {
            tables: HashMap::from([("ORDERS".to_string(), orders(numbered_rows(&[1]), 1))]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            ..FakeTarget::default()
        };
        let (result, _events) =
            run_job(job(vec![pair("ORDERS")], 10), source, target, false).await;
        assert_eq!(result.tables[0].source, "app.ORDERS");
        assert_eq!(result.tables[0].dest, "pub.ORDERS");
    }

    #[tokio::test]
    async fn test_rerun_conflicts_surface_per_row() {
        // Rows 1 and 2 already exist at the destination; only row 3 lands.
        let source = FakeSource {
            tables: HashMap::from([(
                "ORDERS".to_string(),
                orders(numbered_rows(&[1, 2, 3]), 3),
            )]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            poisoned: HashSet::from([1, 2]),
            ..FakeTarget::default()
        };

        let (result, events) =
            run_job(job(vec![pair("ORDERS")], 10), source, target, false).await;

        assert_eq!(result.inserted_total, 1);
        let errors: Vec<u64> = events
            .iter()
            .filter_map(|ev| match ev {
                MigrationEvent::Error { row_index, .. } => Some(*row_index),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_before_first_pair() {
        let source = FakeSource {
            tables: HashMap::from([("ORDERS".to_string(), orders(numbered_rows(&[1]), 1))]),
            probe_ok: true,
            stream_error_after: None,
        };
        let target = FakeTarget {
            probe_ok: true,
            ..FakeTarget::default()
        };

        let (result, events) =
            run_job(job(vec![pair("ORDERS")], 10), source, target, true).await;

        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(result.tables.is_empty());
        assert!(matches!(
            events.last(),
            Some(MigrationEvent::Done {
                inserted_total: 0,
                source_total: 0
            })
        ));
    }

    #[test]
    fn test_result_json_shape() {
        let result = MigrationResult {
            status: RunStatus::Completed,
            inserted_total: 3,
            source_total: 4,
            tables: vec![TableSummary {
                source: "app.ORDERS".into(),
                dest: "pub.ORDERS".into(),
                source_rows: 4,
                inserted: 3,
                outcome: TableOutcome::Skipped {
                    reason: "nope".into(),
                },
            }],
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"status\": \"completed\""));
        assert!(json.contains("\"outcome\": \"skipped\""));
        assert!(json.contains("\"reason\": \"nope\""));
    }
}
