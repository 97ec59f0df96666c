//! Shutdown countdown controller.
//!
//! A single slot holds the active [`CountdownSession`]. Every arm issues a
//! fresh [`Generation`]; ticks and cancellations carry the generation they
//! were issued for and are dropped with
//! [`PlugwatchError::StaleGeneration`] when it no longer matches the slot.
//! Cancellation is therefore cooperative: a superseded ticker notices on its
//! next tick and exits, and off-commands already dispatched are not recalled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use plugwatch_domain::countdown::{
    CancelReason, CountdownPhase, CountdownSession, CountdownStatus, Generation,
};
use plugwatch_domain::error::PlugwatchError;
use plugwatch_domain::event::{Event, EventPayload};
use plugwatch_domain::plug::{DesiredState, PlugAddress};

use crate::lanes::CommandSerializer;
use crate::ports::{EventPublisher, PlugDriver};

/// Default interval between two ticks.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Slot {
    enabled: bool,
    ticks: u64,
    generation: Generation,
    phase: CountdownPhase,
    session: Option<CountdownSession>,
}

/// Generation-tagged automatic power off of the plugs flagged
/// `automatic_shutdown`.
pub struct ShutdownCountdown<D, P> {
    inner: Arc<Inner<D, P>>,
}

impl<D, P> Clone for ShutdownCountdown<D, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<D, P> {
    serializer: CommandSerializer<D, P>,
    slot: Mutex<Slot>,
    tick_period: Duration,
}

impl<D, P> ShutdownCountdown<D, P>
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Create a disabled controller counting `ticks` ticks of one second.
    pub fn new(serializer: CommandSerializer<D, P>, ticks: u64) -> Self {
        Self::with_tick_period(serializer, ticks, DEFAULT_TICK_PERIOD)
    }

    pub fn with_tick_period(
        serializer: CommandSerializer<D, P>,
        ticks: u64,
        tick_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                serializer,
                slot: Mutex::new(Slot {
                    ticks,
                    ..Slot::default()
                }),
                tick_period,
            }),
        }
    }

    /// Change the length of future sessions; an armed session keeps its own.
    pub fn set_ticks(&self, ticks: u64) {
        self.inner.lock_slot().ticks = ticks;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.lock_slot().enabled
    }

    /// Allow the countdown to be armed.
    pub async fn enable(&self) {
        let changed = {
            let mut slot = self.inner.lock_slot();
            !std::mem::replace(&mut slot.enabled, true)
        };
        if changed {
            tracing::info!("automatic shutdown enabled");
            self.inner
                .publish(EventPayload::AutomaticShutdownChanged { enabled: true })
                .await;
        }
    }

    /// Forbid arming and cancel the active session, if any.
    pub async fn disable(&self) {
        let changed = {
            let mut slot = self.inner.lock_slot();
            std::mem::replace(&mut slot.enabled, false)
        };
        if let Some(generation) = self.active_generation() {
            let _ = self.cancel(generation, CancelReason::Disabled).await;
        }
        if changed {
            tracing::info!("automatic shutdown disabled");
            self.inner
                .publish(EventPayload::AutomaticShutdownChanged { enabled: false })
                .await;
        }
    }

    /// Start a new session, superseding the active one.
    ///
    /// Returns `None` when automatic shutdown is disabled. The targets are
    /// the plugs flagged `automatic_shutdown` at the time of arming.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when the configured length is zero.
    pub async fn arm(&self) -> Result<Option<Generation>, PlugwatchError> {
        self.arm_if(|| true).await
    }

    /// Like [`arm`](Self::arm), but only when `condition` still holds.
    ///
    /// `condition` is evaluated while the session slot is locked, so a
    /// caller cancelling after it turned false always sees the new session.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when the configured length is zero.
    #[tracing::instrument(skip_all)]
    pub async fn arm_if(
        &self,
        condition: impl FnOnce() -> bool,
    ) -> Result<Option<Generation>, PlugwatchError> {
        let targets: Vec<PlugAddress> = self
            .inner
            .serializer
            .registry()
            .list()
            .into_iter()
            .filter(|plug| plug.policy.automatic_shutdown)
            .map(|plug| plug.address)
            .collect();

        let (session, superseded) = {
            let mut slot = self.inner.lock_slot();
            if !slot.enabled {
                tracing::debug!("automatic shutdown disabled, not arming");
                return Ok(None);
            }
            if !condition() {
                tracing::debug!("arming condition no longer holds");
                return Ok(None);
            }
            let generation = slot.generation.next();
            let session = CountdownSession::new(generation, slot.ticks, targets)?;
            slot.generation = generation;
            slot.phase = CountdownPhase::Armed;
            let superseded = slot.session.replace(session.clone());
            (session, superseded)
        };

        if let Some(previous) = superseded {
            self.inner
                .publish(EventPayload::CountdownCancelled {
                    generation: previous.generation,
                    reason: CancelReason::Superseded,
                })
                .await;
        }
        tracing::info!(
            generation = %session.generation,
            ticks = session.total,
            targets = session.targets.len(),
            "shutdown countdown armed"
        );
        self.inner
            .publish(EventPayload::CountdownStarted {
                generation: session.generation,
                total: session.total,
                targets: session.targets.clone(),
            })
            .await;

        let inner = Arc::clone(&self.inner);
        let generation = session.generation;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.tick_period).await;
                match inner.tick(generation).await {
                    Ok(remaining) if remaining > 0 => {}
                    _ => break,
                }
            }
        });
        Ok(Some(generation))
    }

    /// Consume one tick of session `generation` and return what remains.
    ///
    /// Reaching zero expires the session and dispatches the off-commands.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::StaleGeneration`] when `generation` is not
    /// the active session.
    pub async fn tick(&self, generation: Generation) -> Result<u64, PlugwatchError> {
        self.inner.tick(generation).await
    }

    /// Cancel session `generation`.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::StaleGeneration`] when `generation` is not
    /// the active session.
    pub async fn cancel(
        &self,
        generation: Generation,
        reason: CancelReason,
    ) -> Result<(), PlugwatchError> {
        {
            let mut slot = self.inner.lock_slot();
            if slot.session.as_ref().map(|s| s.generation) != Some(generation) {
                return Err(PlugwatchError::StaleGeneration(generation));
            }
            slot.session = None;
            slot.phase = CountdownPhase::Cancelled;
        }
        tracing::info!(%generation, ?reason, "shutdown countdown cancelled");
        self.inner
            .publish(EventPayload::CountdownCancelled { generation, reason })
            .await;
        Ok(())
    }

    /// Cancel whatever session is active; returns its generation.
    pub async fn abort(&self) -> Option<Generation> {
        let generation = self.active_generation()?;
        self.cancel(generation, CancelReason::Aborted).await.ok()?;
        Some(generation)
    }

    pub(crate) async fn publish(&self, payload: EventPayload) {
        self.inner.publish(payload).await;
    }

    #[must_use]
    pub fn active_generation(&self) -> Option<Generation> {
        self.inner
            .lock_slot()
            .session
            .as_ref()
            .map(|s| s.generation)
    }

    #[must_use]
    pub fn status(&self) -> CountdownStatus {
        let slot = self.inner.lock_slot();
        CountdownStatus {
            enabled: slot.enabled,
            phase: slot.phase,
            generation: slot.generation,
            remaining: slot.session.as_ref().map_or(0, |s| s.remaining),
            total: slot.session.as_ref().map_or(slot.ticks, |s| s.total),
        }
    }
}

impl<D, P> Inner<D, P>
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish(&self, payload: EventPayload) {
        self.serializer
            .registry()
            .publisher()
            .publish(Event::new(payload))
            .await;
    }

    async fn tick(&self, generation: Generation) -> Result<u64, PlugwatchError> {
        let (remaining, total, expired) = {
            let mut slot = self.lock_slot();
            let session = slot
                .session
                .as_mut()
                .filter(|s| s.generation == generation)
                .ok_or(PlugwatchError::StaleGeneration(generation))?;
            let remaining = session.tick();
            let total = session.total;
            let expired = if session.is_expired() {
                slot.phase = CountdownPhase::Expired;
                slot.session.take()
            } else {
                None
            };
            (remaining, total, expired)
        };

        self.publish(EventPayload::CountdownTick {
            generation,
            remaining,
            total,
        })
        .await;

        if let Some(session) = expired {
            self.expire(session).await;
        }
        Ok(remaining)
    }

    async fn expire(&self, session: CountdownSession) {
        tracing::info!(
            generation = %session.generation,
            targets = session.targets.len(),
            "shutdown countdown expired, powering off"
        );
        for address in &session.targets {
            let serializer = self.serializer.clone();
            let address = address.clone();
            tokio::spawn(async move {
                if let Err(err) = serializer.execute(&address, DesiredState::Off).await {
                    tracing::warn!(%address, error = %err, "automatic power off failed");
                }
            });
        }
        self.publish(EventPayload::CountdownExpired {
            generation: session.generation,
            remaining: 0,
            targets: session.targets,
        })
        .await;
    }
}
