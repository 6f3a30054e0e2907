//! Drains the offline outbox against the ledger. One drain at a time per
//! outbox; terminal outcomes dequeue the entry, transient failures leave it
//! for the next cycle, and no single entry's failure stops the rest.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use services::presence_ledger::{Admission, RejectReason};

use crate::claim::PresenceClaim;
use crate::connectivity::Connectivity;
use crate::ledger::LedgerClient;
use crate::outbox::{OutboxError, OutboxStore};

/// A claim the ledger rejected during a drain, kept for user-visible
/// reporting — rejection is terminal for the queued entry, never retried.
#[derive(Debug, Clone)]
pub struct RejectedClaim {
    pub local_id: String,
    pub claim: PresenceClaim,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct DrainReport {
    /// Admitted, including idempotent already-present replays.
    pub admitted: usize,
    pub rejected: Vec<RejectedClaim>,
    /// Left queued after a transient failure; the next cycle retries them.
    pub deferred: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.deferred == 0
    }
}

pub struct SyncCoordinator {
    outbox: Arc<dyn OutboxStore>,
    ledger: Arc<dyn LedgerClient>,
    connectivity: Arc<dyn Connectivity>,
    interval: Duration,
    // held for the duration of one drain cycle; a second request while one
    // is active is a no-op
    drain_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        ledger: Arc<dyn LedgerClient>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self::with_interval(
            outbox,
            ledger,
            connectivity,
            Duration::from_secs(common::config::sync_interval_seconds()),
        )
    }

    pub fn with_interval(
        outbox: Arc<dyn OutboxStore>,
        ledger: Arc<dyn LedgerClient>,
        connectivity: Arc<dyn Connectivity>,
        interval: Duration,
    ) -> Self {
        Self {
            outbox,
            ledger,
            connectivity,
            interval,
            drain_lock: Mutex::new(()),
        }
    }

    /// Captures a claim. Online or not, the claim lands in the durable
    /// outbox first; admission happens on the next drain. Never blocks on
    /// the network.
    pub async fn enqueue(&self, claim: PresenceClaim) -> Result<String, OutboxError> {
        self.outbox.append(claim).await
    }

    /// Runs one drain cycle. Safe to call concurrently with the automatic
    /// triggers: if a drain is already active this returns an empty report.
    pub async fn drain(&self) -> Result<DrainReport, OutboxError> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            log::debug!("drain already active; request is a no-op");
            return Ok(DrainReport::default());
        };

        let entries = self.outbox.all().await?;
        let mut report = DrainReport::default();
        if entries.is_empty() {
            return Ok(report);
        }

        log::debug!("draining {} queued presence claims", entries.len());

        for entry in entries {
            match self.ledger.admit(&entry.claim).await {
                Ok(Admission::Admitted { already_present }) => {
                    if already_present {
                        log::info!(
                            "claim {} was already admitted server-side; dequeuing",
                            entry.local_id
                        );
                    }
                    match self.outbox.remove(&entry.local_id).await {
                        Ok(()) => report.admitted += 1,
                        Err(e) => {
                            // admitted but still queued; the replay next
                            // cycle is idempotent
                            log::warn!("failed to dequeue admitted claim {}: {e}", entry.local_id);
                            report.deferred += 1;
                        }
                    }
                }
                Ok(Admission::Rejected(reason)) => {
                    log::warn!(
                        "claim {} rejected: {}",
                        entry.local_id,
                        reason.user_message()
                    );
                    match self.outbox.remove(&entry.local_id).await {
                        Ok(()) => report.rejected.push(RejectedClaim {
                            local_id: entry.local_id,
                            claim: entry.claim,
                            reason,
                        }),
                        Err(e) => {
                            log::warn!(
                                "failed to dequeue rejected claim {}: {e}",
                                entry.local_id
                            );
                            report.deferred += 1;
                        }
                    }
                }
                Err(unavailable) => {
                    log::warn!(
                        "claim {} deferred, ledger unreachable: {unavailable}",
                        entry.local_id
                    );
                    report.deferred += 1;
                }
            }
        }

        log::info!(
            "drain finished: {} admitted, {} rejected, {} deferred",
            report.admitted,
            report.rejected.len(),
            report.deferred
        );
        Ok(report)
    }

    /// Background trigger loop: drains on every offline→online edge and on a
    /// bounded-interval timer covering missed signals. Runs until the
    /// connectivity source goes away.
    pub async fn run(&self) {
        let mut online = self.connectivity.watch();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        log::debug!("connectivity source dropped; stopping sync loop");
                        break;
                    }
                    if *online.borrow_and_update() {
                        log::info!("connectivity restored; draining outbox");
                        if let Err(e) = self.drain().await {
                            log::warn!("drain after reconnect failed: {e}");
                        }
                    }
                }
                _ = ticker.tick() => {
                    if self.connectivity.is_online() {
                        if let Err(e) = self.drain().await {
                            log::warn!("periodic drain failed: {e}");
                        }
                    }
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}
