//! Polling scheduler — periodic status refresh of every registered plug.
//!
//! Each cycle fans out one fire-and-forget refresh per plug through the
//! command lanes, so a slow or dead plug never delays the others nor the
//! next cycle. Failures are handled by the lane (plug marked `unknown`,
//! `command_failed` published) and polling carries on.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use plugwatch_domain::settings::MAX_POLLING_INTERVAL;

use crate::lanes::CommandSerializer;
use crate::ports::{EventPublisher, PlugDriver};

/// Drives a refresh of the whole fleet at a fixed cadence.
pub struct PollingScheduler<D, P> {
    serializer: CommandSerializer<D, P>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<D, P> PollingScheduler<D, P>
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    pub fn new(serializer: CommandSerializer<D, P>) -> Self {
        Self {
            serializer,
            task: Mutex::new(None),
        }
    }

    /// (Re)start polling every `interval`; a zero interval only stops it.
    ///
    /// The first cycle runs one full interval after the call. Intervals
    /// longer than [`MAX_POLLING_INTERVAL`] are clamped to it.
    pub fn start(&self, interval: Duration) {
        self.stop();
        let interval = interval.min(MAX_POLLING_INTERVAL);
        if interval.is_zero() {
            tracing::info!("status polling disabled");
            return;
        }

        let serializer = self.serializer.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                fan_out(&serializer);
            }
        });
        *self.lock_task() = Some(handle);
        tracing::info!(interval_secs = interval.as_secs(), "status polling started");
    }

    /// Stop polling. Refreshes already dispatched still complete.
    pub fn stop(&self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
            tracing::debug!("status polling stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one refresh cycle right away, returning how many plugs it targets.
    pub fn poll_now(&self) -> usize {
        fan_out(&self.serializer)
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D, P> Drop for PollingScheduler<D, P> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

fn fan_out<D, P>(serializer: &CommandSerializer<D, P>) -> usize
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let addresses: Vec<_> = serializer
        .registry()
        .list()
        .into_iter()
        .map(|plug| plug.address)
        .filter(|address| !address.is_empty())
        .collect();
    tracing::debug!(plugs = addresses.len(), "polling plug status");

    for address in &addresses {
        let serializer = serializer.clone();
        let address = address.clone();
        tokio::spawn(async move {
            if let Err(err) = serializer.refresh(&address).await {
                tracing::debug!(%address, error = %err, "poll refresh failed");
            }
        });
    }
    addresses.len()
}
