//! Sequential batch load of one source file into one target table

mod batch;
mod prepare;
mod run;

pub use batch::{BatchOutcome, load_batch};
pub use prepare::{PreparedTable, prepare_table};
pub use run::{AbortedRun, LoadRun, LoadSummary};

use derive_builder::Builder;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_TABLE_NAME};
use crate::db::ConnectionTarget;
use crate::formats::DelimitedConfig;

/// Immutable settings of a load run
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct LoadConfig {
    #[builder(setter(into))]
    pub source_path: PathBuf,
    pub target: ConnectionTarget,
    #[builder(setter(into), default = "DEFAULT_TABLE_NAME.to_string()")]
    pub table_name: String,
    /// Rows per batch (and per transaction)
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,
    #[builder(default = "true")]
    pub truncate_before_load: bool,
    #[builder(default)]
    pub create_table_if_missing: bool,
    #[builder(default)]
    pub delimited: DelimitedConfig,
    #[builder(default)]
    pub quiet: bool,
}

impl LoadConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("batch_size must be greater than zero".to_string());
        }
        if let Some(table_name) = &self.table_name
            && table_name.trim().is_empty()
        {
            return Err("table_name must not be empty".to_string());
        }
        Ok(())
    }
}

impl LoadConfig {
    pub fn batch_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Lifecycle of a load run
///
/// `Idle -> Preparing -> Loading(1..=N) -> Completed`, with `Aborted` reachable
/// from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Preparing,
    Loading { batch: usize },
    Completed,
    Aborted,
}

impl LoadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadState::Completed | LoadState::Aborted)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: LoadState) -> bool {
        use LoadState::*;
        match (self, next) {
            (Idle, Preparing) => true,
            (Preparing, Loading { batch: 1 }) => true,
            (Preparing, Completed) => true,
            (Loading { batch: a }, Loading { batch: b }) => b == a + 1,
            (Loading { .. }, Completed) => true,
            (state, Aborted) => !state.is_terminal(),
            _ => false,
        }
    }
}
