//! src/services/scanner.rs
//!
//! ScanOrchestrator — one incremental scan per invocation:
//!
//! 1. capture the scan start time (the next watermark)
//! 2. load the previous watermark (minimum time if absent or garbled)
//! 3. create target container, metadata container and table (best effort)
//! 4. list the source, keep objects modified after the watermark, copy and
//!    record each of them with bounded concurrency
//! 5. write the scan start time as the new watermark
//!
//! Only a listing failure aborts the run, and it does so before step 5 so
//! the next run covers the same window again. Per-object failures are logged
//! and counted; the watermark still advances past them.

use crate::{
    errors::{ProvisionError, ScanError},
    models::{object::ObjectDescriptor, scan::ScanReport},
    services::{
        change_filter::is_changed,
        object_store::{ObjectStore, Provisioned},
        propagator::CopyPropagator,
        recorder::MetadataRecorder,
        watermark::{WatermarkStore, format_watermark},
    },
};
use chrono::{DateTime, Utc};
use futures::{FutureExt, TryStreamExt, future};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub const DEFAULT_CONCURRENCY: usize = 8;

/// What happened to one changed object.
#[derive(Debug, Clone, Copy, Default)]
struct ObjectOutcome {
    copied: bool,
    recorded: bool,
}

#[derive(Debug, Default)]
struct Tally {
    changed: usize,
    copied: usize,
    recorded: usize,
}

pub struct ScanOrchestrator {
    store: Arc<dyn ObjectStore>,
    source: String,
    watermark: WatermarkStore,
    propagator: CopyPropagator,
    recorder: MetadataRecorder,
    concurrency: usize,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source: impl Into<String>,
        watermark: WatermarkStore,
        propagator: CopyPropagator,
        recorder: MetadataRecorder,
    ) -> Self {
        Self {
            store,
            source: source.into(),
            watermark,
            propagator,
            recorder,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Maximum number of objects copied and recorded at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one scan starting now.
    pub async fn run(&self) -> Result<ScanReport, ScanError> {
        self.run_at(Utc::now()).await
    }

    /// Run one scan whose start time, and therefore next watermark, is
    /// `started_at`.
    pub async fn run_at(&self, started_at: DateTime<Utc>) -> Result<ScanReport, ScanError> {
        let span = info_span!("scan", started_at = %format_watermark(started_at));
        self.run_inner(started_at).instrument(span).await
    }

    async fn run_inner(&self, started_at: DateTime<Utc>) -> Result<ScanReport, ScanError> {
        info!("Scan triggered at {}", format_watermark(started_at));

        let previous = self.watermark.read().await;
        let mut report = ScanReport::new(started_at, previous);
        report.provisioning_failures = self.ensure_destinations().await;

        if let Err(err) = self.scan_and_propagate(previous, &mut report).await {
            error!("{}; watermark left at {}", err, format_watermark(previous));
            return Err(err);
        }

        match self.watermark.write(report.new_watermark).await {
            Ok(()) => {
                report.watermark_committed = true;
                info!(
                    "Updated last scan time to: {}. Copied {} new files. Processed {} metadata entries.",
                    format_watermark(report.new_watermark),
                    report.copied,
                    report.recorded
                );
            }
            Err(err) => error!(
                "{}. Copied {} new files. Processed {} metadata entries.",
                err, report.copied, report.recorded
            ),
        }

        if report.watermark_committed && !report.is_clean() {
            warn!(
                "{} copies and {} metadata upserts failed; those objects are not retried unless modified again",
                report.copy_failures, report.record_failures
            );
        }
        info!(
            previous_watermark = %format_watermark(report.previous_watermark),
            new_watermark = %format_watermark(report.new_watermark),
            listed = report.listed,
            unchanged = report.unchanged,
            changed = report.changed,
            copied = report.copied,
            recorded = report.recorded,
            copy_failures = report.copy_failures,
            record_failures = report.record_failures,
            provisioning_failures = report.provisioning_failures,
            watermark_committed = report.watermark_committed,
            elapsed_ms = (Utc::now() - report.started_at).num_milliseconds(),
            "scan finished"
        );
        Ok(report)
    }

    /// Create every destination the scan writes to. Returns how many could
    /// not be created; those failures are logged and otherwise ignored.
    async fn ensure_destinations(&self) -> usize {
        let mut failures = Vec::new();

        match self.propagator.ensure_target().await {
            Ok(provisioned) => log_provisioned("container", self.propagator.target(), provisioned),
            Err(source) => failures.push(ProvisionError::Container {
                name: self.propagator.target().to_string(),
                source,
            }),
        }
        match self.watermark.ensure_container().await {
            Ok(provisioned) => log_provisioned("container", self.watermark.container(), provisioned),
            Err(source) => failures.push(ProvisionError::Container {
                name: self.watermark.container().to_string(),
                source,
            }),
        }
        match self.recorder.ensure_table().await {
            Ok(provisioned) => log_provisioned("table", self.recorder.table(), provisioned),
            Err(source) => failures.push(ProvisionError::Table {
                name: self.recorder.table().to_string(),
                source,
            }),
        }

        for failure in &failures {
            warn!("{} (continuing)", failure);
        }
        failures.len()
    }

    async fn scan_and_propagate(
        &self,
        watermark: DateTime<Utc>,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let mut listed = 0usize;
        let tally = self
            .store
            .list_objects(&self.source)
            .map_err(|source| ScanError::Listing {
                container: self.source.clone(),
                source,
            })
            .try_filter(|descriptor| {
                listed += 1;
                let changed = is_changed(descriptor, watermark);
                if !changed {
                    debug!(
                        "Skipping '{}' (Last Modified: {}) - not newer than last scan time.",
                        descriptor.key,
                        describe_time(descriptor.last_modified)
                    );
                }
                future::ready(changed)
            })
            .map_ok(|descriptor| self.process(descriptor).map(Ok::<_, ScanError>))
            .try_buffer_unordered(self.concurrency)
            .try_fold(Tally::default(), |mut tally, outcome| async move {
                tally.changed += 1;
                tally.copied += usize::from(outcome.copied);
                tally.recorded += usize::from(outcome.recorded);
                Ok::<_, ScanError>(tally)
            })
            .await?;

        report.listed = listed;
        report.changed = tally.changed;
        report.unchanged = listed - tally.changed;
        report.copied = tally.copied;
        report.recorded = tally.recorded;
        report.copy_failures = tally.changed - tally.copied;
        report.record_failures = tally.changed - tally.recorded;
        Ok(())
    }

    /// Copy, then record, one changed object. The two steps are independent:
    /// a failed copy does not stop the metadata row from being written.
    async fn process(&self, descriptor: ObjectDescriptor) -> ObjectOutcome {
        let modified = describe_time(descriptor.last_modified);
        info!("Copying '{}' (Last Modified: {})...", descriptor.key, modified);

        let copied = match self.propagator.copy(&descriptor).await {
            Ok(outcome) => {
                debug!("copied '{}' ({} bytes)", descriptor.key, outcome.bytes);
                true
            }
            Err(err) => {
                error!(key = %descriptor.key, last_modified = %modified, "{}", err);
                false
            }
        };

        let recorded = match self.recorder.record(&descriptor, &self.source).await {
            Ok(()) => {
                info!(
                    "Metadata for '{}' upserted to table '{}'.",
                    descriptor.key,
                    self.recorder.table()
                );
                true
            }
            Err(err) => {
                error!(key = %descriptor.key, last_modified = %modified, "{}", err);
                false
            }
        };

        ObjectOutcome { copied, recorded }
    }
}

fn log_provisioned(kind: &str, name: &str, provisioned: Provisioned) {
    match provisioned {
        Provisioned::Created => info!("Created {}: {}", kind, name),
        Provisioned::AlreadyExists => debug!("{} '{}' already exists", kind, name),
    }
}

fn describe_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_watermark).unwrap_or_else(|| "unknown".into())
}
