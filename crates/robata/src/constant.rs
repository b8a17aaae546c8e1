//! # Constants with reserved meanings in Robata

use std::time::Duration;

/// Batch axis used when a method signature does not declare one
pub const DEFAULT_BATCH_AXIS: usize = 0;

/// Tables are only ever batched by concatenating rows
pub const TABLE_ROW_AXIS: usize = 0;

/// How long an idle dispatch worker sleeps before re-checking its running flag
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);
