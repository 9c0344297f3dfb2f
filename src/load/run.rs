use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch::{BatchOutcome, load_batch};
use super::prepare::{PreparedTable, prepare_table};
use super::{LoadConfig, LoadState};
use crate::db::{Connection, InsertStatement, Schema, connect};
use crate::error::LoadError;
use crate::formats::SourceReader;
use crate::io::{batch_count, count_data_rows};
use crate::normalize::{NormalizedBatch, normalize_batch};
use crate::telemetry::{ProgressStats, TelemetryEvent, spawn_progress_task};

/// Final report of a completed run
#[derive(Debug)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub total_rows_estimate: u64,
    pub batches_committed: usize,
    pub rows_committed: u64,
    pub prepared: PreparedTable,
    pub duration: Duration,
    pub stats: ProgressStats,
}

/// A run that ended `Aborted`; batches committed before the failure remain in the table
#[derive(Debug, Error)]
#[error(
    "load run {run_id} aborted after {batches_committed} committed batches ({rows_committed} rows)"
)]
pub struct AbortedRun {
    pub run_id: Uuid,
    #[source]
    pub error: LoadError,
    pub batches_committed: usize,
    pub rows_committed: u64,
    pub duration: Duration,
}

/// One end-to-end load, from file open to connection close
pub struct LoadRun {
    run_id: Uuid,
    config: LoadConfig,
    schema: Arc<Schema>,
    state: LoadState,
    cancel: CancellationToken,
    telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>,
    telemetry_rx: Option<mpsc::UnboundedReceiver<TelemetryEvent>>,
    stats: ProgressStats,
    prepared: PreparedTable,
}

impl LoadRun {
    pub fn new(config: LoadConfig, schema: Schema) -> Self {
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
        Self {
            run_id: Uuid::new_v4(),
            config,
            schema: Arc::new(schema),
            state: LoadState::Idle,
            cancel: CancellationToken::new(),
            telemetry_tx,
            telemetry_rx: Some(telemetry_rx),
            stats: ProgressStats::new(),
            prepared: PreparedTable::default(),
        }
    }

    /// Stop the run before its next batch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Drive the run to a terminal state
    pub async fn run(mut self) -> Result<LoadSummary, AbortedRun> {
        let start = Instant::now();
        let progress = self
            .telemetry_rx
            .take()
            .and_then(|rx| spawn_progress_task(self.config.quiet, rx));

        info!(
            run_id = %self.run_id,
            source = %self.config.source_path.display(),
            table = %self.config.table_name,
            store = %self.config.target,
            batch_size = self.config.batch_size,
            "Starting load run"
        );

        let result = self.execute().await;
        let completed = result.is_ok();
        self.transition(if completed {
            LoadState::Completed
        } else {
            LoadState::Aborted
        });
        self.report(TelemetryEvent::RunFinished { completed });

        // Wait for the progress bars so they don't collide with later output
        if let Some(handle) = progress {
            let _ = handle.await;
        }

        let duration = start.elapsed();
        match result {
            Ok(total_rows_estimate) => {
                info!(
                    run_id = %self.run_id,
                    batches = self.stats.batches_committed,
                    rows = self.stats.rows_committed,
                    "Load complete in {:.2}s",
                    duration.as_secs_f64()
                );
                Ok(LoadSummary {
                    run_id: self.run_id,
                    total_rows_estimate,
                    batches_committed: self.stats.batches_committed as usize,
                    rows_committed: self.stats.rows_committed,
                    prepared: self.prepared,
                    duration,
                    stats: self.stats,
                })
            }
            Err(error) => {
                warn!(
                    run_id = %self.run_id,
                    batches = self.stats.batches_committed,
                    rows = self.stats.rows_committed,
                    "Load aborted: {:#}",
                    error
                );
                Err(AbortedRun {
                    run_id: self.run_id,
                    error,
                    batches_committed: self.stats.batches_committed as usize,
                    rows_committed: self.stats.rows_committed,
                    duration,
                })
            }
        }
    }

    /// Everything up to the terminal state; returns the estimated row total
    async fn execute(&mut self) -> Result<u64, LoadError> {
        // 1. Count rows; a missing source aborts here, before any connection opens
        let total_rows = count_data_rows(&self.config.source_path).await?;
        let total_batches = batch_count(total_rows, self.config.batch_capacity());
        info!(total_rows, total_batches, "Counted source rows");

        // 2. Open the source before the connection so unreadable input fails early
        let reader = SourceReader::open(
            &self.config.source_path,
            &self.config.delimited,
            &self.schema,
            self.config.batch_capacity(),
        )?;
        debug!(columns = reader.header().names().len(), "Opened source file");

        // 3. Connect
        let mut conn = connect(&self.config.target).await?;
        info!(store = %self.config.target, "Connected");

        // 4. Prepare and load; the connection is closed whatever the outcome
        let result = self
            .prepare_and_load(&mut conn, reader, total_rows, total_batches)
            .await;
        if let Err(e) = conn.close().await {
            warn!("Failed to close connection cleanly: {:#}", e);
        }
        result.map(|()| total_rows)
    }

    async fn prepare_and_load(
        &mut self,
        conn: &mut Connection,
        mut reader: SourceReader,
        total_rows: u64,
        total_batches: u64,
    ) -> Result<(), LoadError> {
        self.transition(LoadState::Preparing);
        self.prepared = prepare_table(
            conn,
            &self.config.table_name,
            &self.schema,
            self.config.truncate_before_load,
            self.config.create_table_if_missing,
        )
        .await?;

        self.report(TelemetryEvent::RunStarted {
            total_rows,
            total_batches,
        });

        let statement = InsertStatement::new(conn.dialect(), &self.config.table_name, &self.schema);
        debug!(
            rows_per_statement = statement.rows_per_statement(),
            "Prepared insert statement"
        );

        let mut next_batch = 1;
        loop {
            if self.cancel.is_cancelled() {
                info!(next_batch, "Cancellation requested, stopping before next batch");
                return Err(LoadError::Cancelled { next_batch });
            }

            let (returned, next) = read_next_batch(reader, Arc::clone(&self.schema)).await?;
            reader = returned;
            let Some(batch) = next.transpose()? else {
                break;
            };

            self.transition(LoadState::Loading { batch: batch.index });
            debug!(
                batch = batch.index,
                total_batches,
                rows = batch.len(),
                "Loading batch"
            );

            match load_batch(conn, &statement, &batch).await {
                BatchOutcome::Committed { rows, duration } => {
                    self.report(TelemetryEvent::BatchCommitted {
                        index: batch.index,
                        total_batches,
                        rows,
                        duration_ms: duration.as_millis() as u64,
                    });
                }
                BatchOutcome::RolledBack { error } => return Err(error),
            }
            next_batch = batch.index + 1;
        }

        match conn.count_rows(&self.config.table_name).await {
            Ok(count) => info!(table = %self.config.table_name, rows = count, "Target table row count"),
            Err(e) => warn!("Could not count rows in target table: {:#}", e),
        }
        Ok(())
    }

    fn transition(&mut self, next: LoadState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Load state transition");
        self.state = next;
    }

    /// Record an event locally and forward it to the progress task, if any
    fn report(&mut self, event: TelemetryEvent) {
        self.stats.update(&event);
        // No receiver in quiet mode; progress is best-effort
        let _ = self.telemetry_tx.send(event);
    }
}

/// Read and normalize the next batch off the async runtime
///
/// The reader is handed back alongside the batch so the next call can continue
/// where this one stopped.
async fn read_next_batch(
    mut reader: SourceReader,
    schema: Arc<Schema>,
) -> Result<(SourceReader, Option<Result<NormalizedBatch, LoadError>>), LoadError> {
    let path = reader.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let next = reader
            .next()
            .map(|batch| batch.and_then(|batch| normalize_batch(batch, &schema)));
        (reader, next)
    })
    .await
    .map_err(|e| LoadError::SourceIo {
        path,
        source: std::io::Error::other(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, ConnectionTarget, SemanticType};
    use crate::load::LoadConfigBuilder;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(vec![
            Column {
                name: "year",
                semantic_type: SemanticType::Integer,
            },
            Column {
                name: "origin",
                semantic_type: SemanticType::Text,
            },
        ])
    }

    fn write_source(dir: &TempDir, rows: usize) -> PathBuf {
        let path = dir.path().join("flights.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "year,origin").unwrap();
        for i in 0..rows {
            writeln!(file, "2024,ORD{}", i).unwrap();
        }
        file.flush().unwrap();
        path
    }

    fn config(source: &Path, db: &Path) -> LoadConfig {
        LoadConfigBuilder::default()
            .source_path(source)
            .target(ConnectionTarget::Sqlite {
                path: db.to_path_buf(),
            })
            .table_name("flights")
            .batch_size(10)
            .create_table_if_missing(true)
            .quiet(true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cancel_between_batches_keeps_committed_batches() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, 500);
        let db = dir.path().join("cancel.db");

        let cancel = CancellationToken::new();
        let mut run = LoadRun::new(config(&source, &db), schema()).with_cancellation(cancel.clone());

        // Cancel as soon as the first commit is reported
        let mut events = run.telemetry_rx.take().unwrap();
        let watcher = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let TelemetryEvent::BatchCommitted { index: 1, .. } = event {
                    cancel.cancel();
                }
            }
        });

        let aborted = run.run().await.unwrap_err();
        watcher.await.unwrap();

        let next_batch = match aborted.error {
            LoadError::Cancelled { next_batch } => next_batch,
            other => panic!("unexpected error: {other:#}"),
        };
        // The watcher runs at the first await after batch 1 commits, so the run
        // stops at the latest before batch 3 of 50
        assert!((1..=2).contains(&aborted.batches_committed));
        assert_eq!(next_batch, aborted.batches_committed + 1);
        assert_eq!(aborted.rows_committed, aborted.batches_committed as u64 * 10);

        let mut conn = connect(&ConnectionTarget::Sqlite { path: db }).await.unwrap();
        assert_eq!(
            conn.count_rows("flights").await.unwrap(),
            aborted.rows_committed as i64
        );
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_completed_run_reports_every_batch() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, 25);
        let db = dir.path().join("complete.db");

        let summary = LoadRun::new(config(&source, &db), schema())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.total_rows_estimate, 25);
        assert_eq!(summary.batches_committed, 3);
        assert_eq!(summary.rows_committed, 25);
        assert_eq!(summary.stats.batch_durations_ms.len(), 3);
        assert_eq!(summary.stats.finished, Some(true));
        assert!(summary.prepared.create_issued);
    }
}
