//! High-level runner API for the flight data loader.
//!
//! This module provides a simplified public interface that hides the connection,
//! reader and batch-loop setup. It is the primary API for the CLI.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_POSTGRES_PORT, DEFAULT_TABLE_NAME};
pub use crate::db::{AuthMode, ConnectionTarget};
pub use crate::load::AbortedRun;

use crate::db::Schema;
use crate::formats::DelimitedConfig;
use crate::io::{batch_count, count_data_rows};
use crate::load::{LoadConfig, LoadConfigBuilder, LoadRun};

/// Arguments for running a data load operation
#[derive(Debug, Clone)]
pub struct LoadArgs {
    // Source configuration
    pub source_path: PathBuf,
    /// Field delimiter: a single character, or `\t`
    pub delimiter: String,

    // Target configuration
    pub target: ConnectionTarget,
    pub table_name: String,

    pub batch_size: usize,

    // Options
    pub truncate_before_load: bool,
    pub create_table_if_missing: bool,
    pub quiet: bool,
}

impl LoadArgs {
    fn to_config(&self) -> Result<LoadConfig> {
        let delimited = DelimitedConfig::from_strings(&self.delimiter, "\"")
            .with_context(|| format!("Invalid delimiter '{}'", self.delimiter))?;

        LoadConfigBuilder::default()
            .source_path(self.source_path.clone())
            .target(self.target.clone())
            .table_name(self.table_name.clone())
            .batch_size(self.batch_size)
            .truncate_before_load(self.truncate_before_load)
            .create_table_if_missing(self.create_table_if_missing)
            .delimited(delimited)
            .quiet(self.quiet)
            .build()
            .context("Invalid load configuration")
    }
}

/// Result of a completed data load operation
#[derive(Debug)]
pub struct LoadResult {
    pub run_id: String,
    pub batches_committed: usize,
    pub rows_committed: u64,
    /// Row total from the pre-load scan of the source file
    pub total_rows_estimate: u64,
    pub table_cleared: bool,
    pub duration: Duration,
    pub batch_time_percentiles_ms: (Option<u64>, Option<u64>, Option<u64>),
}

/// What a load would do, computed without touching the target store
#[derive(Debug)]
pub struct LoadPlan {
    pub total_rows: u64,
    pub total_batches: u64,
    pub batch_size: usize,
    pub table_name: String,
    pub target: String,
    /// DDL issued before loading when table creation is requested
    pub create_table_sql: Option<String>,
}

/// Run a data load operation with the specified arguments
///
/// Batches are committed one at a time. When `cancel` fires the run stops
/// before its next batch; earlier batches stay committed.
///
/// An aborted run is returned as an error wrapping [`AbortedRun`], which
/// carries the committed counts and the cause.
///
/// # Example
///
/// ```no_run
/// use flight_loader::runner::{ConnectionTarget, LoadArgs, run_load};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = LoadArgs {
///     source_path: "flights_2024_cleaned.csv".into(),
///     delimiter: ",".to_string(),
///     target: ConnectionTarget::Sqlite {
///         path: "flights.db".into(),
///     },
///     table_name: "flight_data_2024".to_string(),
///     batch_size: 100_000,
///     truncate_before_load: true,
///     create_table_if_missing: true,
///     quiet: true,
/// };
///
/// let result = run_load(args, CancellationToken::new()).await?;
/// println!("Loaded {} rows in {:?}", result.rows_committed, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs, cancel: CancellationToken) -> Result<LoadResult> {
    let config = args.to_config()?;

    let summary = LoadRun::new(config, Schema::flight_data())
        .with_cancellation(cancel)
        .run()
        .await?;

    Ok(LoadResult {
        run_id: summary.run_id.to_string(),
        batches_committed: summary.batches_committed,
        rows_committed: summary.rows_committed,
        total_rows_estimate: summary.total_rows_estimate,
        table_cleared: summary.prepared.cleared,
        duration: summary.duration,
        batch_time_percentiles_ms: summary.stats.get_percentiles(),
    })
}

/// Validate the arguments and count the source rows, without connecting
pub async fn plan_load(args: &LoadArgs) -> Result<LoadPlan> {
    let config = args.to_config()?;

    let total_rows = count_data_rows(&config.source_path).await?;
    let total_batches = batch_count(total_rows, config.batch_capacity());
    let create_table_sql = config.create_table_if_missing.then(|| {
        Schema::flight_data().generate_ddl(&config.table_name, config.target.dialect())
    });

    Ok(LoadPlan {
        total_rows,
        total_batches,
        batch_size: config.batch_size,
        table_name: config.table_name,
        target: config.target.to_string(),
        create_table_sql,
    })
}
