//! Per-run counters reported by the scan orchestrator.

use chrono::{DateTime, Utc};

/// Aggregate result of one scan. Logged at the end of the run, then dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanReport {
    /// Wall-clock time captured before listing began.
    pub started_at: DateTime<Utc>,

    /// Watermark the run compared against.
    pub previous_watermark: DateTime<Utc>,

    /// Watermark written at the end of the run (always `started_at`).
    pub new_watermark: DateTime<Utc>,

    /// Whether writing `new_watermark` succeeded.
    pub watermark_committed: bool,

    /// Destinations that could not be created (the scan carried on).
    pub provisioning_failures: usize,

    pub listed: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub copied: usize,
    pub recorded: usize,
    pub copy_failures: usize,
    pub record_failures: usize,
}

impl ScanReport {
    pub fn new(started_at: DateTime<Utc>, previous_watermark: DateTime<Utc>) -> Self {
        Self {
            started_at,
            previous_watermark,
            new_watermark: started_at,
            watermark_committed: false,
            provisioning_failures: 0,
            listed: 0,
            unchanged: 0,
            changed: 0,
            copied: 0,
            recorded: 0,
            copy_failures: 0,
            record_failures: 0,
        }
    }

    /// True when every changed object was both copied and recorded.
    pub fn is_clean(&self) -> bool {
        self.copy_failures == 0 && self.record_failures == 0
    }
}
