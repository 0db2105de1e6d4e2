//! Cancellable balance polling
//!
//! [`BalancePoller::start`] refreshes immediately and then once per interval
//! until the returned [`PollHandle`] is cancelled or dropped. Polling only
//! reads, so cancelling at any point is side-effect free. Once `cancel`
//! returns, no further tick is delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::balance::{BalanceAggregator, BalanceSnapshot};
use crate::network::Network;
use crate::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(25);

/// Cancellation flag shared between a poll task and its handle
#[derive(Clone, Default)]
struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
    /// Held while a tick is delivered; `cancel` takes it too
    delivering: Arc<Mutex<()>>,
}

impl CancelToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Blocks until an in-flight delivery finishes
    fn cancel(&self) {
        {
            let _delivering = self
                .delivering
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.cancelled.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
    }

    /// Run `deliver` unless already cancelled
    fn deliver<T>(&self, deliver: impl FnOnce() -> T) -> Option<T> {
        let _delivering = self
            .delivering
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            return None;
        }
        Some(deliver())
    }

    async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Owner of a running poll task
pub struct PollHandle {
    token: CancelToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop further ticks. Idempotent.
    ///
    /// If a tick is being delivered, waits for it to return first.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to wind down
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Balance poll task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct BalancePoller;

impl BalancePoller {
    /// Spawn a poll loop delivering each refresh (or its failure) to `on_tick`.
    ///
    /// A failed refresh is reported and polling continues. `on_tick` must
    /// not cancel or drop its own handle.
    pub fn start<F>(
        aggregator: BalanceAggregator,
        network: Network,
        address: impl Into<String>,
        interval: Duration,
        mut on_tick: F,
    ) -> PollHandle
    where
        F: FnMut(Result<BalanceSnapshot>) + Send + 'static,
    {
        let token = CancelToken::default();
        let task_token = token.clone();
        let address = address.into();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let refreshed = tokio::select! {
                    _ = task_token.cancelled() => break,
                    refreshed = aggregator.fetch_balance(network, &address) => refreshed,
                };

                if let Err(e) = &refreshed {
                    log::warn!("Balance refresh for {} failed: {}", address, e);
                }
                if task_token.deliver(|| on_tick(refreshed)).is_none() {
                    break;
                }
            }

            log::debug!("Balance polling for {} stopped", address);
        });

        PollHandle {
            token,
            task: Some(task),
        }
    }
}
