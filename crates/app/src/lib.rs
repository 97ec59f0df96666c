//! # plugwatch-app
//!
//! Application layer — the plug fleet coordinator and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `PlugDriver` — query / set the power state of one plug
//!   - `EventPublisher` — fan events out to observers
//! - Provide the coordination core:
//!   - `DeviceRegistry` — runtime catalog of plugs and their last-known state
//!   - `CommandSerializer` — one lane per plug, coalescing queued commands
//!   - `PollingScheduler` — fixed-cadence refresh fan-out
//!   - `ShutdownCountdown` — generation-tagged automatic power off
//!   - `IdleMonitor` — turns machine busy/idle signals into countdown triggers
//!   - `Coordinator` — the façade exposed to the presentation layer
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `plugwatch-domain` only (plus `tokio` for tasks, timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod coordinator;
pub mod countdown;
pub mod event_bus;
pub mod gcode;
pub mod idle;
pub mod lanes;
pub mod polling;
pub mod ports;
pub mod registry;
pub mod thermal;

#[cfg(test)]
pub(crate) mod testing;
