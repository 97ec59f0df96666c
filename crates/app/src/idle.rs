//! Idle monitor — turns machine busy/idle signals into countdown triggers.
//!
//! The machine is idle while it holds no [`BusyReason`]. While automatic
//! shutdown is enabled and the machine is idle, an idle timer runs; when it
//! elapses and every extruder has cooled to the wait temperature, the
//! shutdown countdown is armed. Machine activity restarts the timer, and
//! becoming busy stops it and cancels an armed countdown.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use plugwatch_domain::countdown::CancelReason;
use plugwatch_domain::event::EventPayload;
use plugwatch_domain::machine::{BusyReason, HeaterKind, TemperatureReading};
use plugwatch_domain::settings::ShutdownSettings;

use crate::countdown::ShutdownCountdown;
use crate::ports::{EventPublisher, PlugDriver};

/// How often extruder temperatures are re-checked while cooling down.
pub const COOLDOWN_POLL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct IdleState {
    busy: BTreeSet<BusyReason>,
    timeout: Duration,
    wait_temp: f64,
    ignored: HashSet<String>,
    /// Last actual temperature of each extruder.
    extruders: BTreeMap<String, f64>,
    timer: Option<JoinHandle<()>>,
}

impl IdleState {
    fn hot_extruders(&self) -> Vec<(String, f64)> {
        self.extruders
            .iter()
            .filter(|(_, actual)| **actual > self.wait_temp)
            .map(|(heater, actual)| (heater.clone(), *actual))
            .collect()
    }
}

pub struct IdleMonitor<D, P> {
    countdown: ShutdownCountdown<D, P>,
    state: Arc<Mutex<IdleState>>,
}

impl<D, P> IdleMonitor<D, P>
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Create a monitor arming `countdown` after the configured idle timeout.
    pub fn new(countdown: ShutdownCountdown<D, P>, settings: &ShutdownSettings) -> Self {
        let monitor = Self {
            countdown,
            state: Arc::new(Mutex::new(IdleState::default())),
        };
        monitor.configure(settings);
        monitor
    }

    /// Replace the idle timeout, wait temperature and ignore list; a running
    /// timer keeps its deadline.
    pub fn configure(&self, settings: &ShutdownSettings) {
        let mut state = self.lock_state();
        state.timeout = settings.idle_timeout();
        state.wait_temp = settings.idle_timeout_wait_temp;
        state.ignored = settings
            .idle_ignore_commands
            .iter()
            .map(|word| word.trim().to_ascii_uppercase())
            .collect();
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock_state().busy.is_empty()
    }

    #[must_use]
    pub fn is_printing(&self) -> bool {
        self.lock_state().busy.contains(&BusyReason::Printing)
    }

    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.lock_state()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Remember the extruder temperatures the cooldown wait is gated on.
    pub fn record_temperatures(&self, readings: &[TemperatureReading]) {
        let mut state = self.lock_state();
        for reading in readings {
            if reading.kind() == Some(HeaterKind::Extruder) {
                state.extruders.insert(reading.heater.clone(), reading.actual);
            }
        }
    }

    /// The machine started `reason`; cancels any armed countdown.
    #[tracing::instrument(skip(self))]
    pub async fn machine_busy(&self, reason: BusyReason) {
        {
            let mut state = self.lock_state();
            state.busy.insert(reason);
            stop(&mut state);
        }
        if let Some(generation) = self.countdown.active_generation() {
            let _ = self
                .countdown
                .cancel(generation, CancelReason::MachineBusy)
                .await;
        }
    }

    /// The machine finished `reason`; starts the idle timer once nothing is left.
    #[tracing::instrument(skip(self))]
    pub fn machine_idle(&self, reason: BusyReason) {
        let idle = {
            let mut state = self.lock_state();
            state.busy.remove(&reason);
            state.busy.is_empty()
        };
        if idle {
            self.restart_timer();
        }
    }

    /// Record a G-code command sent to the machine.
    ///
    /// Counted activity (re)starts the idle timer. Returns whether it counted.
    pub fn activity(&self, word: &str) -> bool {
        let counts = !self.lock_state().ignored.contains(&word.to_ascii_uppercase());
        if counts {
            self.restart_timer();
        }
        counts
    }

    /// Restart the idle timer if shutdown is enabled and the machine is idle.
    pub fn restart_timer(&self) {
        if !self.countdown.is_enabled() {
            self.stop_timer();
            return;
        }
        let mut state = self.lock_state();
        if !state.busy.is_empty() {
            return;
        }
        stop(&mut state);

        let countdown = self.countdown.clone();
        let shared = Arc::clone(&self.state);
        let timeout = state.timeout;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !cooled_down(&shared, &countdown).await {
                return;
            }
            tracing::info!(idle_secs = timeout.as_secs(), "machine idle, arming shutdown countdown");
            let armed = countdown.arm_if(|| lock(&shared).busy.is_empty()).await;
            if let Err(err) = armed {
                tracing::warn!(error = %err, "could not arm shutdown countdown");
            }
        }));
        tracing::debug!(timeout_secs = timeout.as_secs(), "idle timer started");
    }

    pub fn stop_timer(&self) {
        stop(&mut self.lock_state());
    }

    fn lock_state(&self) -> MutexGuard<'_, IdleState> {
        lock(&self.state)
    }
}

/// Wait until no extruder is above the wait temperature.
///
/// Returns `false` when the machine turned busy in the meantime.
async fn cooled_down<D, P>(shared: &Mutex<IdleState>, countdown: &ShutdownCountdown<D, P>) -> bool
where
    D: PlugDriver + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let mut announced = false;
    loop {
        let (hot, wait_temp) = {
            let state = lock(shared);
            if !state.busy.is_empty() {
                return false;
            }
            (state.hot_extruders(), state.wait_temp)
        };
        if hot.is_empty() {
            return true;
        }
        if !announced {
            announced = true;
            let highest = hot.iter().map(|(_, actual)| *actual).fold(f64::MIN, f64::max);
            tracing::info!(highest, wait_temp, "waiting for extruders to cool down");
            countdown
                .publish(EventPayload::HeatersCooling {
                    heaters: hot.into_iter().map(|(heater, _)| heater).collect(),
                    highest,
                    wait_temp,
                })
                .await;
        }
        tokio::time::sleep(COOLDOWN_POLL).await;
    }
}

fn lock(state: &Mutex<IdleState>) -> MutexGuard<'_, IdleState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stop(state: &mut IdleState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
}

impl<D, P> Drop for IdleMonitor<D, P> {
    fn drop(&mut self) {
        stop(&mut lock(&self.state));
    }
}
