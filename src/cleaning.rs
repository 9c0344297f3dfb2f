//! Rules applied by the upstream cleaning pass that produces the loader's input.
//!
//! The loader itself never calls into this module: by the time a file reaches
//! it, `cancellation_code` has already been filled in and is loaded as plain text.

use crate::config::NOT_CANCELLED_CODE;

/// Cancellation code as written to the cleaned file
///
/// Flights that were not cancelled get the sentinel `"Not Cancelled"`; for
/// cancelled flights the recorded code is kept as-is, including a missing one.
pub fn cancellation_code(cancelled: bool, code: Option<String>) -> Option<String> {
    if cancelled {
        code
    } else {
        Some(NOT_CANCELLED_CODE.to_string())
    }
}
