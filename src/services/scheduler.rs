//! Fixed-interval driver for the scan orchestrator.

use crate::services::scanner::ScanOrchestrator;
use std::{future::Future, time::Duration};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// Runs one scan per tick. Scans are awaited in turn, so a slow scan delays
/// the next tick instead of overlapping with it.
pub struct Scheduler {
    scanner: ScanOrchestrator,
    period: Duration,
}

impl Scheduler {
    pub fn new(scanner: ScanOrchestrator, period: Duration) -> Self {
        Self { scanner, period }
    }

    /// Tick until `shutdown` resolves. Shutdown is only observed between
    /// scans. Returns the number of scans started.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Scheduling a scan every {:?}", self.period);
        let mut scans = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested after {} scans", scans);
                    break;
                }
                _ = ticker.tick() => {
                    scans += 1;
                    if let Err(err) = self.scanner.run().await {
                        error!("Scan aborted: {}", err);
                    }
                }
            }
        }
        scans
    }
}
