//! Command serializer — one execution lane per plug address.
//!
//! A lane runs at most one driver call at a time (the [`PendingOperation`]).
//! While it is busy, at most one further job is queued behind it, and newer
//! requests coalesce into that slot:
//!
//! - a `set` replaces a queued `set`; the replaced caller gets
//!   [`PlugwatchError::ConflictingOperation`] and a `CommandSuperseded` event
//!   is published,
//! - a `set` replaces a queued refresh and answers the refresh callers with
//!   the post-command state,
//! - a refresh joins whatever job is already queued.
//!
//! The in-flight job is never dropped. Every driver call is bounded by the
//! command timeout, and the lane is torn down once it drains, whatever the
//! outcome, so a broken plug cannot wedge its lane.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use plugwatch_domain::error::{
    DriverError, PlugwatchError, UnknownDeviceError, ValidationError,
};
use plugwatch_domain::event::{Event, EventPayload, Timestamp};
use plugwatch_domain::plug::{DesiredState, PlugAddress, PlugState};

use crate::ports::{EventPublisher, PlugDriver};
use crate::registry::DeviceRegistry;

/// What a lane job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Switch the plug to the given state.
    Set(DesiredState),
    /// Query the plug and record what it reports.
    Refresh,
}

/// The job currently executing on a lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub address: PlugAddress,
    pub operation: Operation,
    pub issued_at: Timestamp,
}

type Outcome = Result<PlugState, PlugwatchError>;

struct Waiter {
    wants: Operation,
    tx: oneshot::Sender<Outcome>,
}

struct Job {
    operation: Operation,
    issued_at: Timestamp,
    waiters: Vec<Waiter>,
}

impl Job {
    fn new(operation: Operation, tx: oneshot::Sender<Outcome>) -> Self {
        Self {
            operation,
            issued_at: chrono::Utc::now(),
            waiters: vec![Waiter {
                wants: operation,
                tx,
            }],
        }
    }
}

struct Lane {
    pending: PendingOperation,
    queued: Option<Job>,
}

/// Serializes driver calls per plug and records their outcome in the registry.
pub struct CommandSerializer<D, P> {
    inner: Arc<Inner<D, P>>,
}

impl<D, P> Clone for CommandSerializer<D, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<D, P> {
    driver: D,
    registry: Arc<DeviceRegistry<P>>,
    lanes: Mutex<HashMap<PlugAddress, Lane>>,
    timeout_ms: AtomicU64,
}

impl<D, P> CommandSerializer<D, P>
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Create a serializer calling `driver`, bounded by `timeout` per call.
    pub fn new(driver: D, registry: Arc<DeviceRegistry<P>>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                registry,
                lanes: Mutex::new(HashMap::new()),
                timeout_ms: AtomicU64::new(millis(timeout)),
            }),
        }
    }

    /// The registry this serializer writes into.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry<P>> {
        &self.inner.registry
    }

    /// Current per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    /// Change the per-call timeout; applies to calls started afterwards.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.timeout_ms.store(millis(timeout), Ordering::Relaxed);
    }

    /// Switch a plug, resolving with its new state.
    ///
    /// # Errors
    ///
    /// - [`PlugwatchError::UnknownDevice`] when the plug is not registered
    /// - [`PlugwatchError::ConflictingOperation`] when a newer command replaced
    ///   this one before it started
    /// - [`PlugwatchError::DeviceUnreachable`] / [`PlugwatchError::CommandTimeout`]
    ///   when the driver fails; the plug is then recorded as `unknown`
    pub async fn execute(&self, address: &PlugAddress, desired: DesiredState) -> Outcome {
        self.submit(address, Operation::Set(desired)).await
    }

    /// Query a plug and record what it reports.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), except that a refresh is never
    /// superseded.
    pub async fn refresh(&self, address: &PlugAddress) -> Outcome {
        self.submit(address, Operation::Refresh).await
    }

    /// The job currently running on the lane for `address`, if any.
    #[must_use]
    pub fn pending(&self, address: &PlugAddress) -> Option<PendingOperation> {
        self.inner
            .lock_lanes()
            .get(address)
            .map(|lane| lane.pending.clone())
    }

    async fn submit(&self, address: &PlugAddress, operation: Operation) -> Outcome {
        if address.is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }
        if !self.inner.registry.contains(address) {
            return Err(UnknownDeviceError {
                address: address.clone(),
            }
            .into());
        }

        let (tx, rx) = oneshot::channel();
        let mut superseded = Vec::new();
        let start = {
            let mut lanes = self.inner.lock_lanes();
            if let Some(lane) = lanes.get_mut(address) {
                superseded = coalesce(lane, operation, tx);
                None
            } else {
                let job = Job::new(operation, tx);
                lanes.insert(
                    address.clone(),
                    Lane {
                        pending: PendingOperation {
                            address: address.clone(),
                            operation,
                            issued_at: job.issued_at,
                        },
                        queued: None,
                    },
                );
                Some(job)
            }
        };

        for (requested, waiter) in superseded {
            tracing::debug!(%address, %requested, "queued command superseded");
            let _ = waiter.send(Err(PlugwatchError::ConflictingOperation {
                address: address.clone(),
            }));
            self.inner
                .registry
                .publisher()
                .publish(Event::new(EventPayload::CommandSuperseded {
                    address: address.clone(),
                    requested,
                }))
                .await;
        }

        if let Some(job) = start {
            let inner = Arc::clone(&self.inner);
            let address = address.clone();
            tokio::spawn(inner.drive(address, job));
        }

        rx.await.unwrap_or_else(|_| {
            Err(PlugwatchError::DeviceUnreachable {
                address: address.clone(),
                source: DriverError::new("command lane stopped before answering"),
            })
        })
    }
}

/// Fold a new request into the lane's queued slot, returning the callers
/// whose commands were dropped.
fn coalesce(
    lane: &mut Lane,
    operation: Operation,
    tx: oneshot::Sender<Outcome>,
) -> Vec<(DesiredState, oneshot::Sender<Outcome>)> {
    let waiter = Waiter {
        wants: operation,
        tx,
    };
    let Some(queued) = lane.queued.as_mut() else {
        lane.queued = Some(Job {
            operation,
            issued_at: chrono::Utc::now(),
            waiters: vec![waiter],
        });
        return Vec::new();
    };

    let mut superseded = Vec::new();
    if let Operation::Set(_) = operation {
        if let Operation::Set(previous) = queued.operation {
            let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut queued.waiters)
                .into_iter()
                .partition(|w| matches!(w.wants, Operation::Set(_)));
            superseded = dropped.into_iter().map(|w| (previous, w.tx)).collect();
            queued.waiters = kept;
        }
        queued.operation = operation;
        queued.issued_at = chrono::Utc::now();
    }
    queued.waiters.push(waiter);
    superseded
}

impl<D, P> Inner<D, P>
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    fn lock_lanes(&self) -> MutexGuard<'_, HashMap<PlugAddress, Lane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run jobs for `address` until its queue is empty, then drop the lane.
    async fn drive(self: Arc<Self>, address: PlugAddress, first: Job) {
        let mut next = Some(first);
        while let Some(job) = next {
            let outcome = self.run(&address, job.operation).await;
            for waiter in job.waiters {
                let _ = waiter.tx.send(outcome.clone());
            }
            next = self.advance(&address);
        }
    }

    fn advance(&self, address: &PlugAddress) -> Option<Job> {
        let mut lanes = self.lock_lanes();
        let lane = lanes.get_mut(address)?;
        if let Some(job) = lane.queued.take() {
            lane.pending = PendingOperation {
                address: address.clone(),
                operation: job.operation,
                issued_at: job.issued_at,
            };
            return Some(job);
        }
        lanes.remove(address);
        None
    }

    async fn run(&self, address: &PlugAddress, operation: Operation) -> Outcome {
        let timeout = self.timeout();
        let reported = match operation {
            Operation::Set(desired) => {
                tracing::debug!(%address, %desired, "sending command");
                tokio::time::timeout(timeout, self.driver.set(address, desired))
                    .await
                    .map(|ack| ack.map(|()| PlugState::from(desired)))
            }
            Operation::Refresh => {
                tracing::debug!(%address, "querying state");
                tokio::time::timeout(timeout, self.driver.query(address)).await
            }
        };

        match reported {
            Ok(Ok(state)) => {
                self.registry.update_state(address, state).await?;
                if let Operation::Set(_) = operation {
                    self.registry
                        .publisher()
                        .publish(Event::new(EventPayload::CommandCompleted {
                            address: address.clone(),
                            state,
                        }))
                        .await;
                }
                Ok(state)
            }
            Ok(Err(source)) => {
                self.fail(PlugwatchError::DeviceUnreachable {
                    address: address.clone(),
                    source,
                })
                .await
            }
            Err(_elapsed) => {
                self.fail(PlugwatchError::CommandTimeout {
                    address: address.clone(),
                    timeout,
                })
                .await
            }
        }
    }

    async fn fail(&self, err: PlugwatchError) -> Outcome {
        let address = match &err {
            PlugwatchError::DeviceUnreachable { address, .. }
            | PlugwatchError::CommandTimeout { address, .. } => address.clone(),
            _ => return Err(err),
        };
        tracing::warn!(%address, error = %err, "plug command failed");

        let label = match self.registry.get(&address) {
            Ok(plug) => plug.label,
            Err(_) => address.to_string(),
        };
        if let Err(unregistered) = self.registry.update_state(&address, PlugState::Unknown).await {
            tracing::debug!(%address, error = %unregistered, "plug left the registry mid-command");
        }
        self.registry
            .publisher()
            .publish(Event::new(EventPayload::CommandFailed {
                address,
                label,
                category: err.category(),
                message: err.to_string(),
            }))
            .await;
        Err(err)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
