//! Background status polling for asynchronous (PIX) donations.
//!
//! One task per gateway payment id. A task sleeps for the poll interval, asks
//! the gateway for the payment and stops as soon as a terminal status has been
//! written. Only donations stored as pending can be watched. Tasks are
//! stopped explicitly (the payer left the page), by the optional watch limit,
//! by a gateway error that retrying cannot fix, or by process shutdown. A gateway call that is in
//! flight when a stop arrives is allowed to finish, but its result is dropped
//! and nothing is written.

use crate::config::ReconciliationConfig;
use crate::payments::types::DonationStatus;
use crate::services::reconciliation::ReconciliationService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A terminal status was observed and persisted.
    Settled(DonationStatus),
    /// Stopped by the caller or by shutdown.
    Cancelled,
    /// The configured maximum watch duration elapsed.
    Expired,
    /// The gateway rejected the lookup with a non-retryable error.
    Abandoned,
}

struct PollerHandle {
    generation: u64,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<WatchOutcome>,
}

type TaskMap = Arc<Mutex<HashMap<String, PollerHandle>>>;

/// Registry of running status watchers, keyed by gateway payment id.
pub struct PollerRegistry {
    reconciler: Arc<ReconciliationService>,
    config: ReconciliationConfig,
    tasks: TaskMap,
    generation: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

impl PollerRegistry {
    pub fn new(
        reconciler: Arc<ReconciliationService>,
        config: ReconciliationConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reconciler,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            shutdown_rx,
        }
    }

    /// Start watching `payment_id`.
    ///
    /// Returns `false` when a watcher for this id is already running, the id
    /// does not belong to a pending donation, or the process is shutting down.
    pub async fn start(&self, payment_id: &str) -> bool {
        if *self.shutdown_rx.borrow() {
            return false;
        }

        match self.reconciler.stored_status(payment_id).await {
            Ok(Some(DonationStatus::Pending)) => {}
            Ok(stored) => {
                debug!(
                    payment_id = %payment_id,
                    stored = ?stored,
                    "not watching a payment without a pending donation"
                );
                return false;
            }
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "could not look up donation to watch");
                return false;
            }
        }

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(payment_id) {
            if !existing.join.is_finished() {
                return false;
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = watch::channel(false);
        let watcher = Watcher {
            reconciler: self.reconciler.clone(),
            payment_id: payment_id.to_string(),
            config: self.config.clone(),
            stop_rx,
            shutdown_rx: self.shutdown_rx.clone(),
        };
        let registry = self.tasks.clone();
        let id = payment_id.to_string();

        let join = tokio::spawn(async move {
            let outcome = watcher.run().await;
            let mut tasks = registry.lock().await;
            if tasks.get(&id).map(|h| h.generation) == Some(generation) {
                tasks.remove(&id);
            }
            outcome
        });

        tasks.insert(
            payment_id.to_string(),
            PollerHandle {
                generation,
                stop_tx,
                join,
            },
        );

        info!(
            payment_id = %payment_id,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "payment status watch started"
        );
        true
    }

    /// Stop watching `payment_id`. Returns `false` if it was not being watched.
    pub async fn stop(&self, payment_id: &str) -> bool {
        let handle = self.tasks.lock().await.remove(payment_id);
        match handle {
            Some(handle) => {
                let _ = handle.stop_tx.send(true);
                info!(payment_id = %payment_id, "payment status watch stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every watcher and wait for the tasks to wind down.
    pub async fn stop_all(&self) {
        let handles: Vec<(String, PollerHandle)> = self.tasks.lock().await.drain().collect();
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "stopping payment status watches");
        for (_, handle) in &handles {
            let _ = handle.stop_tx.send(true);
        }
        for (payment_id, handle) in handles {
            if let Err(e) = handle.join.await {
                warn!(payment_id = %payment_id, error = %e, "status watch task failed");
            }
        }
    }

    pub async fn is_watching(&self, payment_id: &str) -> bool {
        self.tasks
            .lock()
            .await
            .get(payment_id)
            .map_or(false, |h| !h.join.is_finished())
    }

    pub async fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|h| !h.join.is_finished())
            .count()
    }
}

struct Watcher {
    reconciler: Arc<ReconciliationService>,
    payment_id: String,
    config: ReconciliationConfig,
    stop_rx: watch::Receiver<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Watcher {
    async fn run(mut self) -> WatchOutcome {
        let started = Instant::now();

        loop {
            tokio::select! {
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        return WatchOutcome::Cancelled;
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!(payment_id = %self.payment_id, "status watch interrupted by shutdown");
                        return WatchOutcome::Cancelled;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if let Some(limit) = self.config.max_watch {
                if started.elapsed() >= limit {
                    info!(
                        payment_id = %self.payment_id,
                        watched_secs = started.elapsed().as_secs(),
                        "payment still pending, watch limit reached"
                    );
                    return WatchOutcome::Expired;
                }
            }

            let result = self.reconciler.fetch(&self.payment_id).await;

            // A stop that arrived during the call wins over its result.
            if self.cancelled() {
                return WatchOutcome::Cancelled;
            }

            let payment = match result {
                Ok(payment) => payment,
                Err(e) if e.is_retryable() => {
                    warn!(payment_id = %self.payment_id, error = %e, "status poll failed");
                    continue;
                }
                Err(e) => {
                    warn!(
                        payment_id = %self.payment_id,
                        error = %e,
                        "status poll rejected by gateway, giving up"
                    );
                    return WatchOutcome::Abandoned;
                }
            };

            let status = payment.donation_status();
            if !status.is_terminal() {
                debug!(
                    payment_id = %self.payment_id,
                    gateway_status = %payment.status,
                    "payment still pending"
                );
                continue;
            }

            match self.reconciler.apply_status(&self.payment_id, status).await {
                Ok(update) => {
                    info!(
                        payment_id = %self.payment_id,
                        status = %status,
                        update = ?update,
                        "payment settled"
                    );
                    return WatchOutcome::Settled(status);
                }
                Err(e) => {
                    // Keep polling; the next round retries the write.
                    warn!(
                        payment_id = %self.payment_id,
                        status = %status,
                        error = %e,
                        "could not persist settled status"
                    );
                }
            }
        }
    }

    fn cancelled(&self) -> bool {
        *self.stop_rx.borrow()
            || *self.shutdown_rx.borrow()
            || self.stop_rx.has_changed().is_err()
    }
}
