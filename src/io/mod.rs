//! File-level I/O helpers that run independently of the load itself

pub mod row_count;

pub use row_count::{batch_count, count_data_rows};
