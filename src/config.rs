//! Configuration constants for the flight loader
//!
//! This module centralizes the tunable parameters and fixed literals used
//! throughout the application. Per-run settings live in [`crate::load::LoadConfig`].

use std::time::Duration;

// ============================================================================
// Load Defaults
// ============================================================================

/// Rows materialized and committed per batch unless overridden
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

pub const DEFAULT_TABLE_NAME: &str = "flight_data_2024";

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

// ============================================================================
// Connection Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Timeout for a single multi-row INSERT statement
///
/// A batch is written as several statements, each bounded by the backend's bind
/// parameter limit. Three minutes leaves room for index maintenance on large
/// tables while still surfacing a stalled server as an insertion failure.
pub const INSERT_TIMEOUT: Duration = Duration::from_secs(180); // 3 minutes

/// Maximum bind parameters in one PostgreSQL statement (wire protocol uses i16 counts)
pub const POSTGRES_MAX_BIND_PARAMS: usize = 65_535;

/// Maximum bind parameters in one SQLite statement (SQLITE_MAX_VARIABLE_NUMBER since 3.32)
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

// ============================================================================
// I/O Configuration
// ============================================================================

/// Buffer size for the newline-counting scan of the source file
///
/// Set to 64KB, large enough that the scan is dominated by disk throughput
/// rather than syscall overhead on multi-gigabyte inputs.
pub const COUNT_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

// ============================================================================
// Value Normalization
// ============================================================================

/// Text values treated as missing regardless of the column's semantic type
pub const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Accepted spellings of the flight date column
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Timestamp spellings whose date part is kept (e.g. `2024-01-01 00:00:00`)
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Value the upstream cleaning pass writes into `cancellation_code` for flights
/// that were not cancelled
pub const NOT_CANCELLED_CODE: &str = "Not Cancelled";
