//! Connectivity trigger.
//!
//! [`ConnectivityMonitor`] turns probe results into an online/offline watch
//! channel. [`SyncCoordinator`] owns the reconciliation engine and starts a
//! drain on every offline to online transition. At most one drain runs per
//! queue database: an in-process flag coalesces local triggers, and a lease
//! row in the database keeps other processes (`watch`, `sale`, `queue sync`)
//! out while a drain is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::action::retry_delay;
use super::engine::ReconcileEngine;
use super::queue::ActionQueue;
use super::report::SyncReport;
use crate::remote::ConnectivityProbe;

const REPORT_CHANNEL_CAPACITY: usize = 16;

/// How long a drain lease stays valid without renewal.
const LEASE_TTL: Duration = Duration::from_secs(30);
const LEASE_RENEW_EVERY: Duration = Duration::from_secs(10);

/// Publishes the device's online state.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Record the latest observation. Returns whether it was a transition.
    pub fn report(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                info!("network restored");
            } else {
                warn!("network offline");
            }
        }
        changed
    }

    /// Poll `probe` every `interval` until cancelled.
    pub fn spawn_probe(
        self: &Arc<Self>,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let online = probe.is_online().await;
                        monitor.report(online);
                    }
                }
            }
            debug!("connectivity probe stopped");
        })
    }
}

/// Resets the in-flight flag when a drain ends, including on panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Gives the drain lease back when a drain ends, including on panic.
struct LeaseGuard<'a> {
    queue: &'a ActionQueue,
    holder: &'a str,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.release_lease(self.holder) {
            // The lease expires on its own.
            warn!(error = %e, "failed to release sync lease");
        }
    }
}

/// Runs drains one at a time and fans reports out to subscribers.
pub struct SyncCoordinator {
    engine: ReconcileEngine,
    in_flight: AtomicBool,
    holder: String,
    reports: broadcast::Sender<SyncReport>,
    retry_base: Duration,
    retry_max: Duration,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(engine: ReconcileEngine) -> Self {
        let (reports, _rx) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            engine,
            in_flight: AtomicBool::new(false),
            holder: format!("{}-{}", std::process::id(), Uuid::now_v7()),
            reports,
            retry_base: Duration::from_secs(5),
            retry_max: Duration::from_secs(300),
        }
    }

    /// Backoff used between drains that left retryable work behind.
    #[must_use]
    pub const fn with_retry_policy(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base = base;
        self.retry_max = max;
        self
    }

    #[must_use]
    pub const fn engine(&self) -> &ReconcileEngine {
        &self.engine
    }

    /// Whether a drain is running right now, in this process or another
    /// one sharing the queue database.
    #[must_use]
    pub fn is_reconciling(&self) -> bool {
        if self.in_flight.load(Ordering::Acquire) {
            return true;
        }
        match self.engine.queue().lease_holder() {
            Ok(holder) => holder.is_some(),
            Err(e) => {
                debug!(error = %e, "cannot read sync lease");
                false
            },
        }
    }

    /// Receive every report produced from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.reports.subscribe()
    }

    /// Run a drain unless one is already in flight.
    ///
    /// Returns `None` when coalesced into the running drain, which re-reads
    /// the whole queue anyway. That drain may belong to another process.
    pub async fn try_reconcile(&self) -> Option<SyncReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight; trigger coalesced");
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let queue = self.engine.queue();
        let report = match queue.acquire_lease(&self.holder, LEASE_TTL) {
            Ok(true) => {
                let _lease = LeaseGuard {
                    queue,
                    holder: &self.holder,
                };
                self.drain_holding_lease().await
            },
            Ok(false) => {
                debug!("another process is syncing; trigger coalesced");
                return None;
            },
            Err(e) => {
                warn!(error = %e, "cannot take sync lease; sync aborted");
                let mut report = SyncReport::default();
                report.abort(e.to_string());
                report.finished_at = Utc::now();
                report
            },
        };

        // No subscribers is fine.
        let _ = self.reports.send(report.clone());
        Some(report)
    }

    async fn drain_holding_lease(&self) -> SyncReport {
        let queue = self.engine.queue();
        let drain = self.engine.reconcile();
        tokio::pin!(drain);

        let mut renew = tokio::time::interval(LEASE_RENEW_EVERY);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);
        renew.tick().await;

        loop {
            tokio::select! {
                report = &mut drain => return report,
                _ = renew.tick() => match queue.acquire_lease(&self.holder, LEASE_TTL) {
                    Ok(true) => debug!("sync lease renewed"),
                    Ok(false) => warn!("sync lease lost to another process"),
                    Err(e) => warn!(error = %e, "failed to renew sync lease"),
                },
            }
        }
    }

    /// Drain on every offline to online transition until cancelled.
    ///
    /// While online, a drain that left retryable work behind is repeated
    /// after an exponential backoff.
    pub fn spawn(
        self: Arc<Self>,
        mut online: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut was_online = *online.borrow_and_update();
            let mut retries: u32 = 0;
            let mut retry_at = if was_online {
                self.drain_and_schedule(&mut retries).await
            } else {
                None
            };

            loop {
                let deadline = retry_at;
                let backoff = async move {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let now_online = *online.borrow_and_update();
                        if now_online && !was_online {
                            retries = 0;
                            retry_at = self.drain_and_schedule(&mut retries).await;
                        } else if !now_online {
                            retry_at = None;
                        }
                        was_online = now_online;
                    }
                    () = backoff => {
                        retry_at = self.drain_and_schedule(&mut retries).await;
                    }
                }
            }
            debug!("sync coordinator stopped");
        })
    }

    async fn drain_and_schedule(&self, retries: &mut u32) -> Option<Instant> {
        let Some(report) = self.try_reconcile().await else {
            // Someone else is draining; look again once they are likely done.
            return Some(Instant::now() + self.retry_base);
        };
        if report.should_retry() {
            let delay = retry_delay(*retries, self.retry_base, self.retry_max);
            *retries = retries.saturating_add(1);
            info!(delay_secs = delay.as_secs(), "sync will retry later");
            Some(Instant::now() + delay)
        } else {
            *retries = 0;
            None
        }
    }
}
