//! Coordinator — the façade the presentation layer talks to.
//!
//! Owns the registry, the command lanes, the polling scheduler, the shutdown
//! countdown and the idle monitor, and keeps them in sync with the
//! [`FleetSettings`] snapshot it was last handed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use plugwatch_domain::countdown::CountdownStatus;
use plugwatch_domain::error::PlugwatchError;
use plugwatch_domain::event::{Event, EventPayload};
use plugwatch_domain::machine::{BusyReason, FileUpload, TemperatureReading};
use plugwatch_domain::plug::{DesiredState, Plug, PlugAddress, PlugState};
use plugwatch_domain::settings::FleetSettings;

use crate::countdown::ShutdownCountdown;
use crate::event_bus::InProcessEventBus;
use crate::gcode::{self, GcodeDirective};
use crate::idle::IdleMonitor;
use crate::lanes::CommandSerializer;
use crate::polling::PollingScheduler;
use crate::ports::{EventPublisher, PlugDriver};
use crate::registry::DeviceRegistry;
use crate::thermal::{ThermalLimits, ThermalTrip};

/// Event bus shared by every coordinator component.
pub type SharedEventBus = Arc<InProcessEventBus>;

/// Plug fleet coordinator.
pub struct Coordinator<D> {
    bus: SharedEventBus,
    registry: Arc<DeviceRegistry<SharedEventBus>>,
    serializer: CommandSerializer<D, SharedEventBus>,
    polling: PollingScheduler<D, SharedEventBus>,
    countdown: ShutdownCountdown<D, SharedEventBus>,
    idle: Arc<IdleMonitor<D, SharedEventBus>>,
    settings: RwLock<FleetSettings>,
    directives: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: PlugDriver + 'static> Coordinator<D> {
    /// Wire a coordinator around `driver`. Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when `settings` are invalid.
    pub fn new(
        driver: D,
        bus: SharedEventBus,
        settings: FleetSettings,
    ) -> Result<Self, PlugwatchError> {
        settings.validate()?;
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&bus)));
        let serializer =
            CommandSerializer::new(driver, Arc::clone(&registry), settings.command_timeout());
        let polling = PollingScheduler::new(serializer.clone());
        let countdown =
            ShutdownCountdown::new(serializer.clone(), settings.shutdown.abort_timeout_secs);
        let idle = Arc::new(IdleMonitor::new(countdown.clone(), &settings.shutdown));
        Ok(Self {
            bus,
            registry,
            serializer,
            polling,
            countdown,
            idle,
            settings: RwLock::new(settings),
            directives: Mutex::new(Vec::new()),
        })
    }

    /// Register the configured plugs, start polling and the idle timer,
    /// refresh every plug once and power on the startup plugs.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when the stored settings are invalid.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), PlugwatchError> {
        let settings = self.settings();
        self.apply_settings(settings.clone()).await?;
        let polled = self.polling.poll_now();
        tracing::info!(plugs = polled, "coordinator started");

        if settings.startup_power_on {
            for plug in self.registry.list() {
                if plug.policy.power_on_at_startup {
                    tracing::info!(address = %plug.address, "powering on at startup");
                    self.dispatch(plug.address, DesiredState::On);
                }
            }
        }
        Ok(())
    }

    /// Synchronize the runtime with a new settings snapshot.
    ///
    /// Plugs missing from `settings` are unregistered, known plugs keep their
    /// state and get their new attributes, new plugs are registered and
    /// refreshed. Polling, timeouts, countdown and idle parameters follow.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when `settings` are invalid; the
    /// runtime is left untouched in that case.
    #[tracing::instrument(skip_all, fields(plugs = settings.plugs.len()))]
    pub async fn apply_settings(&self, settings: FleetSettings) -> Result<(), PlugwatchError> {
        settings.validate()?;

        for plug in self.registry.list() {
            if !settings.plugs.iter().any(|p| p.address == plug.address) {
                self.registry.unregister(&plug.address).await?;
            }
        }
        for configured in &settings.plugs {
            let plug = configured.to_plug()?;
            if self.registry.contains(&plug.address) {
                self.registry
                    .update_settings(&plug.address, plug.label, plug.icon, plug.policy)?;
            } else {
                let address = plug.address.clone();
                self.registry.register(plug).await?;
                self.spawn_refresh(address);
            }
        }

        self.serializer.set_timeout(settings.command_timeout());
        self.polling
            .start(settings.polling_interval().unwrap_or(Duration::ZERO));
        self.countdown.set_ticks(settings.shutdown.abort_timeout_secs);
        self.idle.configure(&settings.shutdown);
        let was_enabled = self.countdown.is_enabled();
        if settings.shutdown.enabled && !was_enabled {
            self.enable_automatic_shutdown().await;
        } else if !settings.shutdown.enabled && was_enabled {
            self.disable_automatic_shutdown().await;
        }

        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        tracing::info!("settings applied");
        Ok(())
    }

    /// Stop every background activity. Commands already dispatched complete.
    pub fn shutdown(&self) {
        self.polling.stop();
        self.idle.stop_timer();
        for directive in self.lock_directives().drain(..) {
            directive.abort();
        }
        tracing::info!("coordinator stopped");
    }

    /// Snapshot of the settings currently applied.
    #[must_use]
    pub fn settings(&self) -> FleetSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // -- plug commands -------------------------------------------------------

    /// # Errors
    ///
    /// See [`CommandSerializer::execute`].
    #[tracing::instrument(skip(self))]
    pub async fn turn_on(&self, address: &PlugAddress) -> Result<PlugState, PlugwatchError> {
        self.serializer.execute(address, DesiredState::On).await
    }

    /// # Errors
    ///
    /// See [`CommandSerializer::execute`].
    #[tracing::instrument(skip(self))]
    pub async fn turn_off(&self, address: &PlugAddress) -> Result<PlugState, PlugwatchError> {
        self.serializer.execute(address, DesiredState::Off).await
    }

    /// Flip the plug from its last-known state; an `unknown` plug is refreshed instead.
    ///
    /// # Errors
    ///
    /// See [`CommandSerializer::execute`].
    #[tracing::instrument(skip(self))]
    pub async fn toggle(&self, address: &PlugAddress) -> Result<PlugState, PlugwatchError> {
        let plug = self.registry.get(address)?;
        match plug.state.toggled() {
            Some(desired) => self.serializer.execute(address, desired).await,
            None => self.serializer.refresh(address).await,
        }
    }

    /// Query the plug and report its state, even when unchanged.
    ///
    /// # Errors
    ///
    /// See [`CommandSerializer::refresh`].
    #[tracing::instrument(skip(self))]
    pub async fn check_status(&self, address: &PlugAddress) -> Result<PlugState, PlugwatchError> {
        let state = self.serializer.refresh(address).await?;
        self.bus
            .publish(Event::new(EventPayload::StatusReported {
                address: address.clone(),
                state,
            }))
            .await;
        Ok(state)
    }

    // -- automatic shutdown --------------------------------------------------

    pub async fn enable_automatic_shutdown(&self) -> CountdownStatus {
        self.countdown.enable().await;
        self.idle.restart_timer();
        self.countdown.status()
    }

    pub async fn disable_automatic_shutdown(&self) -> CountdownStatus {
        self.countdown.disable().await;
        self.idle.stop_timer();
        self.countdown.status()
    }

    /// Cancel the running countdown and start waiting for idleness again.
    pub async fn abort_automatic_shutdown(&self) -> CountdownStatus {
        if let Some(generation) = self.countdown.abort().await {
            tracing::info!(%generation, "automatic shutdown aborted");
        }
        self.idle.restart_timer();
        self.countdown.status()
    }

    #[must_use]
    pub fn countdown_status(&self) -> CountdownStatus {
        self.countdown.status()
    }

    // -- queries -------------------------------------------------------------

    #[must_use]
    pub fn list_plugs(&self) -> Vec<Plug> {
        self.registry.list()
    }

    /// # Errors
    ///
    /// Returns [`PlugwatchError::UnknownDevice`] when the address is not registered.
    pub fn plug(&self, address: &PlugAddress) -> Result<Plug, PlugwatchError> {
        self.registry.get(address)
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    // -- machine signals -----------------------------------------------------

    pub async fn machine_busy(&self, reason: BusyReason) {
        self.idle.machine_busy(reason).await;
    }

    pub fn machine_idle(&self, reason: BusyReason) {
        self.idle.machine_idle(reason);
    }

    /// Feed one G-code line sent to the machine.
    ///
    /// Returns the power directive scheduled for it, if any.
    pub fn handle_gcode(&self, line: &str) -> Option<GcodeDirective> {
        if let Some(word) = gcode::gcode_word(line) {
            self.idle.activity(&word);
        }
        let directive = gcode::parse_directive(line)?;
        let plug = match self.registry.get(&directive.address) {
            Ok(plug) => plug,
            Err(err) => {
                tracing::debug!(address = %directive.address, error = %err, "ignoring G-code directive");
                return None;
            }
        };
        if !plug.policy.gcode_enabled {
            tracing::debug!(address = %plug.address, "G-code control disabled for plug");
            return None;
        }

        let delay = Duration::from_secs(match directive.desired {
            DesiredState::On => plug.policy.gcode_on_delay_secs,
            DesiredState::Off => plug.policy.gcode_off_delay_secs,
        });
        let guard_printing = directive.desired == DesiredState::Off && plug.policy.warn_printing;
        let serializer = self.serializer.clone();
        let idle = Arc::clone(&self.idle);
        let scheduled = directive.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if guard_printing && idle.is_printing() {
                tracing::info!(address = %scheduled.address, "not powering off while printing");
                return;
            }
            if let Err(err) = serializer.execute(&scheduled.address, scheduled.desired).await {
                tracing::warn!(address = %scheduled.address, error = %err, "G-code directive failed");
            }
        });

        let mut directives = self.lock_directives();
        directives.retain(|pending| !pending.is_finished());
        directives.push(handle);
        tracing::debug!(address = %directive.address, desired = %directive.desired, delay_secs = delay.as_secs(), "G-code directive scheduled");
        Some(directive)
    }

    /// Check heater readings and power off the protected plugs on a runaway.
    ///
    /// Extruder readings also feed the cooldown wait before automatic shutdown.
    pub async fn report_temperatures(&self, readings: &[TemperatureReading]) -> Option<ThermalTrip> {
        self.idle.record_temperatures(readings);
        let thermal = self.settings().thermal;
        if !thermal.enabled {
            return None;
        }
        let trip = ThermalLimits::from(&thermal).first_trip(readings)?;
        tracing::warn!(
            heater = %trip.heater,
            actual = trip.actual,
            limit = trip.limit,
            "thermal runaway detected, powering off protected plugs"
        );
        self.bus
            .publish(Event::new(EventPayload::ThermalRunaway {
                heater: trip.heater.clone(),
                actual: trip.actual,
                limit: trip.limit,
            }))
            .await;
        for plug in self.registry.list() {
            if plug.policy.thermal_runaway {
                self.dispatch(plug.address, DesiredState::Off);
            }
        }
        Some(trip)
    }

    /// Power on the plugs flagged `power_on_at_upload` when `upload` is a
    /// print job the machine is not ready to start.
    ///
    /// Returns the plugs switched on.
    #[tracing::instrument(skip_all, fields(file = %upload.name))]
    pub fn file_uploaded(&self, upload: &FileUpload) -> Vec<PlugAddress> {
        if !self.settings().upload_power_on || !upload.wants_power() {
            return Vec::new();
        }
        let targets: Vec<PlugAddress> = self
            .registry
            .list()
            .into_iter()
            .filter(|plug| plug.policy.power_on_at_upload)
            .map(|plug| plug.address)
            .collect();
        for address in &targets {
            tracing::info!(%address, "powering on for uploaded job");
            self.dispatch(address.clone(), DesiredState::On);
        }
        targets
    }

    fn dispatch(&self, address: PlugAddress, desired: DesiredState) {
        let serializer = self.serializer.clone();
        tokio::spawn(async move {
            if let Err(err) = serializer.execute(&address, desired).await {
                tracing::warn!(%address, error = %err, "background command failed");
            }
        });
    }

    fn spawn_refresh(&self, address: PlugAddress) {
        let serializer = self.serializer.clone();
        tokio::spawn(async move {
            if let Err(err) = serializer.refresh(&address).await {
                tracing::debug!(%address, error = %err, "initial refresh failed");
            }
        });
    }

    fn lock_directives(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.directives.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, drain, settle};
    use plugwatch_domain::countdown::CountdownPhase;
    use plugwatch_domain::plug::PlugPolicy;
    use plugwatch_domain::settings::PlugSettings;

    const A: &str = "10.0.0.5";
    const B: &str = "10.0.0.6";

    fn plug_settings(address: &str, policy: PlugPolicy) -> PlugSettings {
        PlugSettings {
            address: PlugAddress::new(address),
            label: String::new(),
            icon: String::new(),
            policy,
        }
    }

    fn settings(plugs: Vec<PlugSettings>) -> FleetSettings {
        FleetSettings {
            plugs,
            ..FleetSettings::default()
        }
    }

    async fn started(
        driver: FakeDriver,
        settings: FleetSettings,
    ) -> (Coordinator<Arc<FakeDriver>>, Arc<FakeDriver>) {
        let driver = Arc::new(driver);
        let coordinator = Coordinator::new(
            Arc::clone(&driver),
            Arc::new(InProcessEventBus::new(256)),
            settings,
        )
        .unwrap();
        coordinator.start().await.unwrap();
        settle().await;
        (coordinator, driver)
    }

    fn addr(address: &str) -> PlugAddress {
        PlugAddress::new(address)
    }

    #[tokio::test]
    async fn should_refresh_every_plug_when_started() {
        let driver = FakeDriver::default()
            .with_state(A, PlugState::On)
            .with_state(B, PlugState::Off);
        let (coordinator, _driver) = started(
            driver,
            settings(vec![
                plug_settings(A, PlugPolicy::default()),
                plug_settings(B, PlugPolicy::default()),
            ]),
        )
        .await;

        let states: Vec<_> = coordinator.list_plugs().into_iter().map(|p| p.state).collect();
        assert_eq!(states, vec![PlugState::On, PlugState::Off]);
    }

    #[tokio::test]
    async fn should_flip_known_state_when_toggled() {
        let (coordinator, driver) = started(
            FakeDriver::default().with_state(A, PlugState::On),
            settings(vec![plug_settings(A, PlugPolicy::default())]),
        )
        .await;

        assert_eq!(coordinator.toggle(&addr(A)).await.unwrap(), PlugState::Off);
        assert_eq!(coordinator.toggle(&addr(A)).await.unwrap(), PlugState::On);
        assert_eq!(driver.set_calls(A), vec![DesiredState::Off, DesiredState::On]);
    }

    #[tokio::test]
    async fn should_refresh_instead_of_switching_when_toggling_unknown_plug() {
        let (coordinator, driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy::default())]),
        )
        .await;
        driver.set_state(A, PlugState::Off);
        coordinator
            .registry
            .update_state(&addr(A), PlugState::Unknown)
            .await
            .unwrap();

        assert_eq!(coordinator.toggle(&addr(A)).await.unwrap(), PlugState::Off);
        assert!(driver.set_calls(A).is_empty());
    }

    #[tokio::test]
    async fn should_report_status_even_when_unchanged() {
        let (coordinator, _driver) = started(
            FakeDriver::default().with_state(A, PlugState::On),
            settings(vec![plug_settings(A, PlugPolicy::default())]),
        )
        .await;
        let mut rx = coordinator.subscribe();

        coordinator.check_status(&addr(A)).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].payload,
            EventPayload::StatusReported {
                address: addr(A),
                state: PlugState::On,
            }
        );
    }

    #[tokio::test]
    async fn should_report_unknown_device_when_commanding_missing_plug() {
        let (coordinator, _driver) = started(FakeDriver::default(), settings(vec![])).await;

        let result = coordinator.turn_on(&addr(A)).await;
        assert!(matches!(result, Err(PlugwatchError::UnknownDevice(_))));
    }

    #[tokio::test]
    async fn should_sync_registry_when_settings_change() {
        let (coordinator, _driver) = started(
            FakeDriver::default()
                .with_state(A, PlugState::On)
                .with_state(B, PlugState::Off),
            settings(vec![plug_settings(A, PlugPolicy::default())]),
        )
        .await;

        let mut updated = plug_settings(A, PlugPolicy {
            automatic_shutdown: true,
            ..PlugPolicy::default()
        });
        updated.label = "Printer".into();
        coordinator
            .apply_settings(settings(vec![updated, plug_settings(B, PlugPolicy::default())]))
            .await
            .unwrap();
        settle().await;

        let plugs = coordinator.list_plugs();
        assert_eq!(plugs.len(), 2);
        assert_eq!(plugs[0].label, "Printer");
        assert_eq!(plugs[0].state, PlugState::On);
        assert!(plugs[0].policy.automatic_shutdown);
        assert_eq!(plugs[1].state, PlugState::Off);

        coordinator
            .apply_settings(settings(vec![plug_settings(B, PlugPolicy::default())]))
            .await
            .unwrap();
        assert!(matches!(
            coordinator.plug(&addr(A)),
            Err(PlugwatchError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn should_keep_runtime_when_settings_are_invalid() {
        let (coordinator, _driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy::default())]),
        )
        .await;

        let result = coordinator
            .apply_settings(settings(vec![
                plug_settings(B, PlugPolicy::default()),
                plug_settings(B, PlugPolicy::default()),
            ]))
            .await;

        assert!(matches!(result, Err(PlugwatchError::Validation(_))));
        assert!(coordinator.plug(&addr(A)).is_ok());
    }

    #[tokio::test]
    async fn should_power_on_flagged_plugs_when_started() {
        let mut fleet = settings(vec![
            plug_settings(A, PlugPolicy {
                power_on_at_startup: true,
                ..PlugPolicy::default()
            }),
            plug_settings(B, PlugPolicy::default()),
        ]);
        fleet.startup_power_on = true;

        let (_coordinator, driver) = started(FakeDriver::default(), fleet).await;

        assert_eq!(driver.set_calls(A), vec![DesiredState::On]);
        assert!(driver.set_calls(B).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_power_off_after_idle_timeout_and_countdown() {
        let mut fleet = settings(vec![plug_settings(A, PlugPolicy {
            automatic_shutdown: true,
            ..PlugPolicy::default()
        })]);
        fleet.shutdown.enabled = true;
        fleet.shutdown.idle_timeout_minutes = 1;
        fleet.shutdown.abort_timeout_secs = 10;
        let (coordinator, driver) =
            started(FakeDriver::default().with_state(A, PlugState::On), fleet).await;

        coordinator.machine_busy(BusyReason::Printing).await;
        coordinator.machine_idle(BusyReason::Printing);
        tokio::time::sleep(Duration::from_secs(60 + 10 + 1)).await;
        settle().await;

        assert_eq!(driver.set_calls(A), vec![DesiredState::Off]);
        assert_eq!(coordinator.plug(&addr(A)).unwrap().state, PlugState::Off);
        assert_eq!(coordinator.countdown_status().phase, CountdownPhase::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn should_power_off_again_when_activity_follows_expired_countdown() {
        let mut fleet = settings(vec![plug_settings(A, PlugPolicy {
            automatic_shutdown: true,
            ..PlugPolicy::default()
        })]);
        fleet.shutdown.enabled = true;
        fleet.shutdown.idle_timeout_minutes = 1;
        fleet.shutdown.abort_timeout_secs = 10;
        let (coordinator, driver) =
            started(FakeDriver::default().with_state(A, PlugState::On), fleet).await;

        tokio::time::sleep(Duration::from_secs(60 + 10 + 1)).await;
        settle().await;
        assert_eq!(driver.set_calls(A), vec![DesiredState::Off]);

        coordinator.turn_on(&addr(A)).await.unwrap();
        assert!(coordinator.handle_gcode("G28").is_none());
        tokio::time::sleep(Duration::from_secs(60 + 10 + 1)).await;
        settle().await;

        assert_eq!(
            driver.set_calls(A),
            vec![DesiredState::Off, DesiredState::On, DesiredState::Off]
        );
        assert_eq!(coordinator.plug(&addr(A)).unwrap().state, PlugState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn should_hold_countdown_until_reported_extruders_cool_down() {
        let mut fleet = settings(vec![plug_settings(A, PlugPolicy {
            automatic_shutdown: true,
            ..PlugPolicy::default()
        })]);
        fleet.shutdown.enabled = true;
        fleet.shutdown.idle_timeout_minutes = 1;
        fleet.shutdown.abort_timeout_secs = 10;
        let (coordinator, _driver) = started(FakeDriver::default(), fleet).await;
        let mut rx = coordinator.subscribe();

        let hot = TemperatureReading {
            heater: "T0".into(),
            actual: 180.0,
            target: 0.0,
        };
        assert!(coordinator.report_temperatures(&[hot]).await.is_none());
        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(coordinator.countdown_status().phase, CountdownPhase::Idle);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e.payload, EventPayload::HeatersCooling { .. })));

        let cool = TemperatureReading {
            heater: "T0".into(),
            actual: 35.0,
            target: 0.0,
        };
        coordinator.report_temperatures(&[cool]).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(coordinator.countdown_status().phase, CountdownPhase::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_again_for_idleness_when_countdown_aborted() {
        let mut fleet = settings(vec![plug_settings(A, PlugPolicy {
            automatic_shutdown: true,
            ..PlugPolicy::default()
        })]);
        fleet.shutdown.enabled = true;
        fleet.shutdown.idle_timeout_minutes = 1;
        fleet.shutdown.abort_timeout_secs = 10;
        let (coordinator, driver) = started(FakeDriver::default(), fleet).await;

        tokio::time::sleep(Duration::from_secs(65)).await;
        settle().await;
        assert_eq!(coordinator.countdown_status().phase, CountdownPhase::Armed);

        let status = coordinator.abort_automatic_shutdown().await;
        assert_eq!(status.phase, CountdownPhase::Cancelled);
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert!(driver.set_calls(A).is_empty());

        tokio::time::sleep(Duration::from_secs(35)).await;
        settle().await;
        assert_eq!(coordinator.countdown_status().phase, CountdownPhase::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_gcode_directive_after_configured_delay() {
        let (coordinator, driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy {
                gcode_enabled: true,
                gcode_on_delay_secs: 5,
                ..PlugPolicy::default()
            })]),
        )
        .await;

        let directive = coordinator.handle_gcode("M80 10.0.0.5").unwrap();
        assert_eq!(directive.desired, DesiredState::On);

        tokio::time::sleep(Duration::from_secs(4)).await;
        settle().await;
        assert!(driver.set_calls(A).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(driver.set_calls(A), vec![DesiredState::On]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_gcode_power_off_while_printing() {
        let (coordinator, driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy {
                gcode_enabled: true,
                warn_printing: true,
                ..PlugPolicy::default()
            })]),
        )
        .await;
        coordinator.machine_busy(BusyReason::Printing).await;

        assert!(coordinator.handle_gcode("@PLUGOFF 10.0.0.5").is_some());
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;

        assert!(driver.set_calls(A).is_empty());
    }

    #[tokio::test]
    async fn should_ignore_gcode_directive_when_plug_disallows_it() {
        let (coordinator, _driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy::default())]),
        )
        .await;

        assert!(coordinator.handle_gcode("M81 10.0.0.5").is_none());
        assert!(coordinator.handle_gcode("M81 10.0.0.99").is_none());
        assert!(coordinator.handle_gcode("G28").is_none());
    }

    #[tokio::test]
    async fn should_power_off_protected_plugs_when_thermal_runaway_detected() {
        let mut fleet = settings(vec![
            plug_settings(A, PlugPolicy {
                thermal_runaway: true,
                ..PlugPolicy::default()
            }),
            plug_settings(B, PlugPolicy::default()),
        ]);
        fleet.thermal.enabled = true;
        let (coordinator, driver) = started(FakeDriver::default(), fleet).await;
        let mut rx = coordinator.subscribe();

        let trip = coordinator
            .report_temperatures(&[TemperatureReading {
                heater: "B".into(),
                actual: 130.0,
                target: 100.0,
            }])
            .await
            .unwrap();
        settle().await;

        assert_eq!(trip.heater, "B");
        assert_eq!(driver.set_calls(A), vec![DesiredState::Off]);
        assert!(driver.set_calls(B).is_empty());
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e.payload, EventPayload::ThermalRunaway { .. })));
    }

    #[tokio::test]
    async fn should_ignore_temperatures_when_monitoring_disabled() {
        let (coordinator, driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy {
                thermal_runaway: true,
                ..PlugPolicy::default()
            })]),
        )
        .await;

        let trip = coordinator
            .report_temperatures(&[TemperatureReading {
                heater: "T0".into(),
                actual: 400.0,
                target: 200.0,
            }])
            .await;
        settle().await;

        assert!(trip.is_none());
        assert!(driver.set_calls(A).is_empty());
    }

    fn upload(print: bool, printer_ready: bool) -> FileUpload {
        FileUpload {
            name: "benchy.gcode".into(),
            print,
            printer_ready,
        }
    }

    #[tokio::test]
    async fn should_power_on_flagged_plugs_when_print_job_uploaded() {
        let mut fleet = settings(vec![
            plug_settings(A, PlugPolicy {
                power_on_at_upload: true,
                ..PlugPolicy::default()
            }),
            plug_settings(B, PlugPolicy::default()),
        ]);
        fleet.upload_power_on = true;
        let (coordinator, driver) = started(FakeDriver::default(), fleet).await;

        let powered = coordinator.file_uploaded(&upload(true, false));
        settle().await;

        assert_eq!(powered, vec![addr(A)]);
        assert_eq!(driver.set_calls(A), vec![DesiredState::On]);
        assert!(driver.set_calls(B).is_empty());
    }

    #[tokio::test]
    async fn should_not_power_on_when_upload_does_not_need_it() {
        let mut fleet = settings(vec![plug_settings(A, PlugPolicy {
            power_on_at_upload: true,
            ..PlugPolicy::default()
        })]);
        fleet.upload_power_on = true;
        let (coordinator, driver) = started(FakeDriver::default(), fleet).await;

        assert!(coordinator.file_uploaded(&upload(false, false)).is_empty());
        assert!(coordinator.file_uploaded(&upload(true, true)).is_empty());
        settle().await;

        assert!(driver.set_calls(A).is_empty());
    }

    #[tokio::test]
    async fn should_not_power_on_when_upload_trigger_disabled() {
        let (coordinator, driver) = started(
            FakeDriver::default(),
            settings(vec![plug_settings(A, PlugPolicy {
                power_on_at_upload: true,
                ..PlugPolicy::default()
            })]),
        )
        .await;

        assert!(coordinator.file_uploaded(&upload(true, false)).is_empty());
        settle().await;

        assert!(driver.set_calls(A).is_empty());
    }

    #[tokio::test]
    async fn should_announce_automatic_shutdown_toggles() {
        let (coordinator, _driver) = started(FakeDriver::default(), settings(vec![])).await;
        let mut rx = coordinator.subscribe();

        assert!(coordinator.enable_automatic_shutdown().await.enabled);
        assert!(!coordinator.disable_automatic_shutdown().await.enabled);

        let toggles: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::AutomaticShutdownChanged { enabled } => Some(enabled),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
    }
}
