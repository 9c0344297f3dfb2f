use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

/// Telemetry events sent from the load run to the progress task
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Row count is known and preparation is done
    RunStarted { total_rows: u64, total_batches: u64 },
    /// A batch transaction was committed
    BatchCommitted {
        index: usize,
        total_batches: u64,
        rows: u64,
        duration_ms: u64,
    },
    /// The run reached a terminal state
    RunFinished { completed: bool },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub total_rows: u64,
    pub total_batches: u64,
    pub batches_committed: u64,
    pub rows_committed: u64,
    pub batch_durations_ms: Vec<u64>,
    pub finished: Option<bool>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::RunStarted {
                total_rows,
                total_batches,
            } => {
                self.total_rows = *total_rows;
                self.total_batches = *total_batches;
            }
            TelemetryEvent::BatchCommitted {
                rows, duration_ms, ..
            } => {
                self.batches_committed += 1;
                self.rows_committed += rows;
                self.batch_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::RunFinished { completed } => {
                self.finished = Some(*completed);
            }
        }
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

fn percentile_message(stats: &ProgressStats) -> Option<String> {
    match stats.get_percentiles() {
        (Some(p50), Some(p90), Some(p99)) => {
            Some(format!("p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99))
        }
        _ => None,
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Spawn the task that renders progress bars from telemetry
///
/// Returns None in quiet mode, dropping the receiver; sends then fail and are
/// ignored by the run. The task ends on `RunFinished` or once every sender
/// has been dropped.
pub fn spawn_progress_task(
    quiet: bool,
    mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
) -> Option<tokio::task::JoinHandle<()>> {
    if quiet {
        return None;
    }

    Some(tokio::spawn(async move {
        let multi_progress = MultiProgress::new();
        let batch_bar = multi_progress.add(ProgressBar::new(0));
        batch_bar.set_style(bar_style(
            "[{elapsed_precise}] Batches: [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)",
        ));
        let rows_bar = multi_progress.add(ProgressBar::new(0));
        rows_bar.set_style(bar_style(
            "[{elapsed_precise}] Rows:    [{bar:30.green/blue}] {human_pos}/{human_len} ({percent}%) | {per_sec}",
        ));
        let stats_bar = multi_progress.add(ProgressBar::new(0));
        stats_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Batch Time: {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut stats = ProgressStats::new();

        while let Some(event) = telemetry_rx.recv().await {
            stats.update(&event);

            match event {
                TelemetryEvent::RunStarted { .. } => {
                    batch_bar.set_length(stats.total_batches);
                    rows_bar.set_length(stats.total_rows);
                }
                TelemetryEvent::BatchCommitted {
                    index,
                    total_batches,
                    ..
                } => {
                    batch_bar.set_message(format!("batch {}/{}", index, total_batches));
                    batch_bar.set_position(stats.batches_committed);
                    // The row estimate can undercount when quoted fields span lines
                    if stats.rows_committed > rows_bar.length().unwrap_or(0) {
                        rows_bar.set_length(stats.rows_committed);
                    }
                    rows_bar.set_position(stats.rows_committed);
                    if let Some(message) = percentile_message(&stats) {
                        stats_bar.set_message(message);
                    }
                }
                TelemetryEvent::RunFinished { .. } => break,
            }
        }

        match stats.finished {
            Some(true) => {
                batch_bar.finish_with_message("All batches committed");
                rows_bar.finish();
            }
            _ => {
                batch_bar.abandon_with_message("Load aborted");
                rows_bar.abandon();
            }
        }
        match percentile_message(&stats) {
            Some(message) => stats_bar.finish_with_message(message),
            None => stats_bar.finish(),
        }
    }))
}
